//! HTTP client for the IP Fabric inventory platform.
//!
//! Covers what site separation needs: snapshots, sites, the device
//! inventory, manual site assignments and site separation rules.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use sitesep_core::{Assignment, InventoryDevice, Rule, RuleKind, Site, SiteDirectory};
use std::time::Duration;

/// The platform can be slow to apply site separation settings
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Rows requested per inventory page
const INVENTORY_PAGE_SIZE: usize = 1000;

/// Alias resolving to the latest loaded snapshot
pub const LAST_SNAPSHOT: &str = "$last";

/// Shape of the site separation settings on the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// `siteSeparation` is the rule list itself, rules typed `regex`
    #[default]
    Flat,
    /// `siteSeparation` is an object holding `rules`, rules typed `regexHostname`
    Nested,
}

impl PayloadFormat {
    pub fn rule_kind(&self) -> RuleKind {
        match self {
            PayloadFormat::Flat => RuleKind::Regex,
            PayloadFormat::Nested => RuleKind::RegexHostname,
        }
    }

    /// Wrap rules the way the platform expects them under `siteSeparation`.
    pub fn site_separation(&self, rules: &[Rule]) -> serde_json::Value {
        match self {
            PayloadFormat::Flat => serde_json::json!(rules),
            PayloadFormat::Nested => serde_json::json!({
                "manualEnabled": false,
                "neighborshipFallbackEnabled": true,
                "rules": rules,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IpFabricClient {
    base_url: String,
    http: reqwest::Client,
}

impl IpFabricClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let mut token_value = reqwest::header::HeaderValue::from_str(token)
            .context("IP Fabric token contains invalid characters")?;
        token_value.set_sensitive(true);
        headers.insert("X-API-Token", token_value);

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Turn `$last` into the id of the most recent loaded snapshot.
    pub async fn resolve_snapshot(&self, snapshot: &str) -> Result<String> {
        if snapshot != LAST_SNAPSHOT {
            return Ok(snapshot.to_string());
        }

        let resp = self
            .http
            .get(self.url("snapshots"))
            .send()
            .await
            .context("Failed to list snapshots")?;
        let snapshots: Vec<SnapshotEntry> = check_status(resp, "list snapshots")
            .await?
            .json()
            .await
            .context("Failed to parse snapshot list")?;

        let latest = snapshots
            .into_iter()
            .filter(|s| s.state.as_deref() == Some("loaded"))
            .max_by_key(|s| s.ts_end.unwrap_or(0))
            .ok_or_else(|| anyhow!("No loaded snapshot available"))?;

        tracing::info!("Using latest loaded snapshot {}", latest.id);
        Ok(latest.id)
    }

    /// All sites known to the platform.
    pub async fn fetch_sites(&self) -> Result<Vec<Site>> {
        let resp = self
            .http
            .get(self.url("sites"))
            .send()
            .await
            .context("Failed to fetch sites")?;
        let sites: Vec<SiteEntry> = check_status(resp, "fetch sites")
            .await?
            .json()
            .await
            .context("Failed to parse site list")?;

        tracing::debug!("{} sites known to the platform", sites.len());
        Ok(sites
            .into_iter()
            .map(|s| Site::new(s.site_name, s.id))
            .collect())
    }

    /// Create a site and return its id.
    pub async fn add_site(&self, name: &str) -> Result<String> {
        let resp = self
            .http
            .put(self.url("sites"))
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await
            .with_context(|| format!("Failed to create site '{}'", name))?;
        let created: CreatedSite = check_status(resp, "create site")
            .await?
            .json()
            .await
            .context("Failed to parse created site")?;
        Ok(created.id)
    }

    /// Device inventory of a snapshot. Devices without a serial number cannot
    /// be assigned and are left out.
    pub async fn fetch_inventory(&self, snapshot: &str) -> Result<Vec<InventoryDevice>> {
        let mut devices = Vec::new();
        let mut start = 0;

        loop {
            let body = serde_json::json!({
                "columns": ["hostname", "sn", "siteName"],
                "snapshot": snapshot,
                "pagination": { "limit": INVENTORY_PAGE_SIZE, "start": start },
            });
            let resp = self
                .http
                .post(self.url("tables/inventory/devices"))
                .json(&body)
                .send()
                .await
                .context("Failed to fetch device inventory")?;
            let page: TablePage<DeviceRow> = check_status(resp, "fetch inventory")
                .await?
                .json()
                .await
                .context("Failed to parse device inventory")?;

            let count = page.data.len();
            for row in page.data {
                match row.sn {
                    Some(sn) if !sn.is_empty() => {
                        devices.push(InventoryDevice::new(row.hostname.unwrap_or_default(), sn))
                    }
                    _ => tracing::warn!(
                        "Skipping device {} without serial number",
                        row.hostname.as_deref().unwrap_or("-")
                    ),
                }
            }

            if count < INVENTORY_PAGE_SIZE {
                break;
            }
            start += count;
        }

        tracing::info!("{} devices in snapshot {}", devices.len(), snapshot);
        Ok(devices)
    }

    /// Push manual site assignments, then switch the platform to manual mode.
    pub async fn push_assignments(&self, snapshot: &str, assignments: &[Assignment]) -> Result<()> {
        let payload = ManualSeparation {
            sites: assignments
                .iter()
                .map(|a| ManualEntry {
                    sn: a.serial_number.clone(),
                    id: a.site_id.clone(),
                })
                .collect(),
            snapshot: snapshot.to_string(),
        };

        tracing::info!("Pushing manual site separation for {} devices", assignments.len());

        let resp = self
            .http
            .post(self.url("sites/manual-separation"))
            .json(&payload)
            .send()
            .await
            .context("Failed to push manual site separation")?;
        let resp = check_status(resp, "push manual site separation").await?;
        // Success is a bare 204, anything else means nothing was stored
        if resp.status() != reqwest::StatusCode::NO_CONTENT {
            return Err(anyhow!(
                "Manual site separation not updated: server returned {}",
                resp.status()
            ));
        }

        self.set_site_type_calc("manual").await
    }

    /// Site separation rules currently stored for a snapshot.
    pub async fn fetch_rules(&self, snapshot: &str) -> Result<Vec<Rule>> {
        let resp = self
            .http
            .get(self.url(&format!("snapshots/{}/settings", snapshot)))
            .send()
            .await
            .context("Failed to fetch snapshot settings")?;
        let settings: serde_json::Value = check_status(resp, "fetch snapshot settings")
            .await?
            .json()
            .await
            .context("Failed to parse snapshot settings")?;

        parse_existing_rules(&settings)
    }

    /// Store rules on the snapshot and globally, then switch to rule mode.
    pub async fn push_rules(&self, snapshot: &str, rules: &[Rule], format: PayloadFormat) -> Result<()> {
        let site_separation = format.site_separation(rules);

        let mut snapshot_settings = serde_json::json!({ "siteSeparation": site_separation });
        if format == PayloadFormat::Flat {
            snapshot_settings["siteTypeCalc"] = serde_json::json!("rules");
        }

        let resp = self
            .http
            .patch(self.url(&format!("snapshots/{}/settings", snapshot)))
            .json(&snapshot_settings)
            .send()
            .await
            .context("Failed to patch snapshot settings")?;
        check_status(resp, "patch snapshot settings").await?;
        tracing::info!("Patched site separation rules for snapshot '{}'", snapshot);

        let resp = self
            .http
            .put(self.url("settings/site-separation"))
            .json(&site_separation)
            .send()
            .await
            .context("Failed to update global site separation")?;
        check_status(resp, "update global site separation").await?;
        tracing::info!("Patched global site separation rules");

        self.set_site_type_calc("rules").await
    }

    async fn set_site_type_calc(&self, mode: &str) -> Result<()> {
        tracing::info!("Switching site separation to '{}'", mode);
        let resp = self
            .http
            .patch(self.url("settings"))
            .json(&serde_json::json!({ "siteTypeCalc": mode }))
            .send()
            .await
            .context("Failed to update site separation settings")?;
        check_status(resp, "update site separation settings").await?;
        Ok(())
    }
}

impl SiteDirectory for IpFabricClient {
    async fn create_site(&self, name: &str) -> Result<String> {
        self.add_site(name).await
    }
}

/// Rules under `siteSeparation`, whichever payload format the platform uses.
fn parse_existing_rules(settings: &serde_json::Value) -> Result<Vec<Rule>> {
    let section = &settings["siteSeparation"];
    let rules = match section {
        serde_json::Value::Null => return Ok(Vec::new()),
        serde_json::Value::Array(_) => section.clone(),
        serde_json::Value::Object(obj) => obj
            .get("rules")
            .cloned()
            .unwrap_or_else(|| serde_json::json!([])),
        other => return Err(anyhow!("Unexpected siteSeparation value: {}", other)),
    };
    serde_json::from_value(rules).context("Failed to parse existing site separation rules")
}

async fn check_status(resp: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    tracing::error!("Failed to {}: {} - {}", action, status, body);
    Err(anyhow!("Failed to {}: server returned {} - {}", action, status, body))
}

#[derive(Debug, Deserialize)]
struct SnapshotEntry {
    id: String,
    state: Option<String>,
    #[serde(rename = "tsEnd")]
    ts_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SiteEntry {
    #[serde(rename = "siteName")]
    site_name: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct CreatedSite {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TablePage<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct DeviceRow {
    hostname: Option<String>,
    sn: Option<String>,
}

#[derive(Debug, Serialize)]
struct ManualSeparation {
    sites: Vec<ManualEntry>,
    snapshot: String,
}

#[derive(Debug, Serialize)]
struct ManualEntry {
    sn: String,
    id: String,
}
