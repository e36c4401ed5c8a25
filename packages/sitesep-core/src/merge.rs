//! Device to location merge for manual site assignment.

use crate::error::{Result, SiteSepError};
use crate::model::{Assignment, InventoryDevice, LocationRecord};
use crate::sites::SiteTable;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A location record joined with the id of its resolved site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocatedSite {
    pub hostname: String,
    pub site_name: String,
    pub site_id: String,
}

impl LocatedSite {
    pub fn new(
        hostname: impl Into<String>,
        site_name: impl Into<String>,
        site_id: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            site_name: site_name.into(),
            site_id: site_id.into(),
        }
    }
}

/// Attach resolved site ids to location records, keeping record order.
pub fn locate(records: &[LocationRecord], table: &SiteTable) -> Result<Vec<LocatedSite>> {
    records
        .iter()
        .map(|record| {
            let site_id = table
                .id_of(&record.location)
                .ok_or_else(|| SiteSepError::UnknownSite(record.location.clone()))?;
            Ok(LocatedSite::new(&record.hostname, &record.location, site_id))
        })
        .collect()
}

/// Assign every inventory device to a site.
///
/// Hostnames on both sides are upper-cased before the join, so source casing
/// never sends a device to the catch-all. Devices with no located site get
/// `catch_all_site_id`. When several located entries normalize to the same
/// hostname the last one in `located` wins.
///
/// The output has exactly one assignment per inventory device, in inventory
/// order.
pub fn merge(
    inventory: &[InventoryDevice],
    located: &[LocatedSite],
    catch_all_site_id: &str,
) -> Vec<Assignment> {
    let mut by_hostname: HashMap<String, &LocatedSite> = HashMap::with_capacity(located.len());

    for entry in located {
        let key = join_key(&entry.hostname);
        if let Some(previous) = by_hostname.insert(key, entry) {
            if previous.site_id != entry.site_id {
                tracing::warn!(
                    "Hostname {} listed for both '{}' and '{}', keeping '{}'",
                    entry.hostname,
                    previous.site_name,
                    entry.site_name,
                    entry.site_name
                );
            }
        }
    }

    let mut fallback_count = 0;
    let assignments: Vec<Assignment> = inventory
        .iter()
        .map(|device| {
            let site_id = match by_hostname.get(&join_key(&device.hostname)) {
                Some(entry) => entry.site_id.clone(),
                None => {
                    fallback_count += 1;
                    catch_all_site_id.to_string()
                }
            };
            Assignment {
                serial_number: device.serial_number.clone(),
                site_id,
            }
        })
        .collect();

    tracing::info!(
        "Merged {} devices ({} matched, {} to catch-all)",
        assignments.len(),
        assignments.len() - fallback_count,
        fallback_count
    );

    assignments
}

fn join_key(hostname: &str) -> String {
    hostname.to_uppercase()
}
