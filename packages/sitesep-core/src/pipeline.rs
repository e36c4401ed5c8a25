//! End-to-end pipelines for the two site separation strategies.

use crate::error::Result;
use crate::merge::{locate, merge};
use crate::model::{validate_records, Assignment, InventoryDevice, LocationRecord, Site, CATCH_ALL_SITE};
use crate::sites::{SiteDirectory, SiteResolver, SiteTable};
use serde::{Deserialize, Serialize};

/// How devices end up in sites on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Explicit per-device site assignment
    Manual,
    /// Ordered hostname rules evaluated by the platform
    Rule,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Manual => write!(f, "manual"),
            Strategy::Rule => write!(f, "rule"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManualOptions {
    pub catch_all: String,
}

impl Default for ManualOptions {
    fn default() -> Self {
        Self {
            catch_all: CATCH_ALL_SITE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ManualOutcome {
    pub assignments: Vec<Assignment>,
    pub sites: SiteTable,
    /// Sites that did not exist in the snapshot and were created
    pub created: Vec<Site>,
}

/// Resolve sites for every location, then assign each inventory device.
///
/// Record validation happens before any site is created, so bad input never
/// leaves half-created sites behind.
pub async fn manual_assignments<D: SiteDirectory>(
    records: &[LocationRecord],
    inventory: &[InventoryDevice],
    directory: &D,
    known_sites: Vec<Site>,
    options: &ManualOptions,
) -> Result<ManualOutcome> {
    validate_records(records)?;

    let mut resolver = SiteResolver::new(directory, known_sites);
    let sites = resolver.resolve_all(records, &options.catch_all).await?;
    let located = locate(records, &sites)?;
    let assignments = merge(inventory, &located, &sites.catch_all().id);

    Ok(ManualOutcome {
        assignments,
        created: resolver.created().to_vec(),
        sites,
    })
}
