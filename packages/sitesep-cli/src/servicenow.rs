//! ServiceNow CMDB as a location source.
//!
//! Network gear CIs carry a reference to a location record; the location
//! name becomes the site name.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use sitesep_core::{InventoryDevice, LocationRecord};
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const NETGEAR_TABLE: &str = "cmdb_ci_netgear";
const LOCATION_TABLE: &str = "cmn_location";

/// Rows requested per table page
const TABLE_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct ServiceNowClient {
    base_url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

/// A network gear CI. `location` is a reference, empty when unset.
#[derive(Debug, Clone, Deserialize)]
pub struct NetgearCi {
    pub name: String,
    #[serde(default, deserialize_with = "reference_value")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationCi {
    pub sys_id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct TableResponse<T> {
    result: Vec<T>,
}

/// ServiceNow returns references either as `{"value": ..., "link": ...}` or
/// as an empty string when the field is unset.
fn reference_value<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Reference {
        Link { value: String },
        Plain(String),
    }

    let value = Option::<Reference>::deserialize(deserializer)?;
    Ok(match value {
        Some(Reference::Link { value }) | Some(Reference::Plain(value)) if !value.is_empty() => {
            Some(value)
        }
        _ => None,
    })
}

impl ServiceNowClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            username: username.to_string(),
            password: password.to_string(),
            http,
        })
    }

    async fn fetch_table<T: serde::de::DeserializeOwned>(&self, table: &str, fields: &str) -> Result<Vec<T>> {
        let url = format!("{}/api/now/table/{}", self.base_url, table);
        let mut rows = Vec::new();
        let mut offset = 0;

        loop {
            tracing::debug!("Fetching ServiceNow table {} from row {}", table, offset);
            let resp = self
                .http
                .get(&url)
                .basic_auth(&self.username, Some(&self.password))
                .header("Accept", "application/json")
                .query(&[
                    ("sysparm_fields", fields.to_string()),
                    ("sysparm_limit", TABLE_PAGE_SIZE.to_string()),
                    ("sysparm_offset", offset.to_string()),
                ])
                .send()
                .await
                .with_context(|| format!("Failed to query ServiceNow table {}", table))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(anyhow!(
                    "ServiceNow table {} returned {} - {}",
                    table,
                    status,
                    body
                ));
            }

            let page: TableResponse<T> = resp
                .json()
                .await
                .with_context(|| format!("Failed to parse ServiceNow table {}", table))?;

            let count = page.result.len();
            rows.extend(page.result);
            if count < TABLE_PAGE_SIZE {
                break;
            }
            offset += count;
        }

        Ok(rows)
    }

    pub async fn fetch_netgear(&self) -> Result<Vec<NetgearCi>> {
        self.fetch_table(NETGEAR_TABLE, "name,sys_id,location").await
    }

    pub async fn fetch_locations(&self) -> Result<Vec<LocationCi>> {
        self.fetch_table(LOCATION_TABLE, "sys_id,name").await
    }

    /// Location records for the devices in the inventory.
    pub async fn location_records(&self, inventory: &[InventoryDevice]) -> Result<Vec<LocationRecord>> {
        let netgear = self.fetch_netgear().await?;
        let locations = self.fetch_locations().await?;
        tracing::info!(
            "Fetched {} network CIs and {} locations from ServiceNow",
            netgear.len(),
            locations.len()
        );
        Ok(join_locations(inventory, &netgear, &locations))
    }
}

/// Join inventory hostnames to CI names, then CI location references to
/// location names. Devices that cannot be placed are left out and will
/// land in the catch-all site.
pub fn join_locations(
    inventory: &[InventoryDevice],
    netgear: &[NetgearCi],
    locations: &[LocationCi],
) -> Vec<LocationRecord> {
    let location_names: HashMap<&str, &str> = locations
        .iter()
        .map(|l| (l.sys_id.as_str(), l.name.as_str()))
        .collect();
    let ci_locations: HashMap<&str, Option<&str>> = netgear
        .iter()
        .map(|ci| (ci.name.as_str(), ci.location.as_deref()))
        .collect();

    let mut records = Vec::new();
    let mut unplaced = 0;

    for device in inventory {
        let location = match ci_locations.get(device.hostname.as_str()) {
            None => {
                tracing::debug!("{} not found in {}", device.hostname, NETGEAR_TABLE);
                None
            }
            Some(None) => {
                tracing::debug!("{} has no location in ServiceNow", device.hostname);
                None
            }
            Some(Some(sys_id)) => {
                let name = location_names.get(sys_id).copied();
                if name.is_none() {
                    tracing::warn!(
                        "{} references unknown location {}",
                        device.hostname,
                        sys_id
                    );
                }
                name
            }
        };

        match location {
            Some(name) => records.push(LocationRecord::new(device.hostname.clone(), name)),
            None => unplaced += 1,
        }
    }

    if unplaced > 0 {
        tracing::warn!(
            "{} devices have no ServiceNow location and will fall through to the catch-all site",
            unplaced
        );
    }

    records
}
