//! Case handling for compiled rules.

use crate::model::Transformation;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Whether hostnames keep their source casing or are matched case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePolicy {
    /// Keep the source casing exactly
    Exact,
    /// Upper-case everything and let the consumer upper-case hostnames too
    #[default]
    Uppercase,
}

impl CasePolicy {
    pub fn from_exact_flag(use_exact_case: bool) -> Self {
        if use_exact_case {
            CasePolicy::Exact
        } else {
            CasePolicy::Uppercase
        }
    }

    pub fn apply<'a>(&self, value: &'a str) -> Cow<'a, str> {
        match self {
            CasePolicy::Exact => Cow::Borrowed(value),
            CasePolicy::Uppercase => Cow::Owned(value.to_uppercase()),
        }
    }

    /// Transformation tag written on rules compiled under this policy.
    pub fn transformation(&self) -> Transformation {
        match self {
            CasePolicy::Exact => Transformation::None,
            CasePolicy::Uppercase => Transformation::Uppercase,
        }
    }
}

impl std::fmt::Display for CasePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CasePolicy::Exact => write!(f, "exact"),
            CasePolicy::Uppercase => write!(f, "uppercase"),
        }
    }
}
