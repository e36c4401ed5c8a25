//! Error types for the site separation core.

use std::fmt;
use thiserror::Error;

/// Which field of a location record failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Hostname,
    Location,
}

impl fmt::Display for RecordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordField::Hostname => write!(f, "hostname"),
            RecordField::Location => write!(f, "location"),
        }
    }
}

/// A single offending location record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIssue {
    /// Position of the record in the caller's input
    pub index: usize,
    pub hostname: String,
    pub field: RecordField,
    pub reason: String,
}

impl fmt::Display for RecordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "record #{} ({:?}): {} {}",
            self.index, self.hostname, self.field, self.reason
        )
    }
}

#[derive(Debug, Error)]
pub enum SiteSepError {
    #[error("{} invalid location record(s): {}", .0.len(), format_issues(.0))]
    InvalidRecords(Vec<RecordIssue>),

    #[error("maximum group size must be at least 1")]
    InvalidGroupSize,

    #[error("failed to create site '{name}'")]
    SiteCreation {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pattern synthesis failed for hosts {first} to {last}")]
    PatternSynthesis {
        first: String,
        last: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("pattern {pattern:?} for site '{site}' is not a valid regex: {reason}")]
    MalformedPattern {
        pattern: String,
        site: String,
        reason: String,
    },

    #[error("site table has no trailing catch-all entry '{0}'")]
    MissingCatchAll(String),

    #[error("location '{0}' has no resolved site")]
    UnknownSite(String),
}

fn format_issues(issues: &[RecordIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, SiteSepError>;
