//! Site registry resolution.
//!
//! Maps site names to platform ids, creating missing sites through a
//! [`SiteDirectory`] and remembering every creation for the rest of the run.

use crate::error::{Result, SiteSepError};
use crate::model::{LocationRecord, Site};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;

/// Platform side of site resolution.
pub trait SiteDirectory {
    /// Create a site and return its freshly allocated id.
    fn create_site(&self, name: &str) -> impl Future<Output = anyhow::Result<String>>;
}

/// Per-invocation resolver over a snapshot of the platform's known sites.
///
/// Never share one resolver between invocations working on different
/// snapshots; its cache belongs to the snapshot it was built from.
pub struct SiteResolver<'d, D: SiteDirectory> {
    directory: &'d D,
    known: HashMap<String, String>,
    created: Vec<Site>,
}

impl<'d, D: SiteDirectory> SiteResolver<'d, D> {
    pub fn new(directory: &'d D, known_sites: Vec<Site>) -> Self {
        let mut known = HashMap::with_capacity(known_sites.len());
        for site in known_sites {
            // First entry wins, like a linear scan of the snapshot would
            known.entry(site.name).or_insert(site.id);
        }
        Self {
            directory,
            known,
            created: Vec::new(),
        }
    }

    /// Return the id of `name`, creating the site if the snapshot lacks it.
    ///
    /// Names are compared exactly (case-sensitive). A creation failure aborts
    /// the invocation; nothing is retried here.
    pub async fn resolve(&mut self, name: &str) -> Result<String> {
        if let Some(id) = self.known.get(name) {
            return Ok(id.clone());
        }

        let id = self
            .directory
            .create_site(name)
            .await
            .map_err(|source| SiteSepError::SiteCreation {
                name: name.to_string(),
                source,
            })?;

        tracing::info!("New site created: {} (id: {})", name, id);
        self.known.insert(name.to_string(), id.clone());
        self.created.push(Site::new(name, id.clone()));
        Ok(id)
    }

    /// Resolve every distinct location of `records`, then the catch-all.
    ///
    /// Locations are resolved in sorted order so creations happen in the same
    /// order on every run. The catch-all is always the last table entry.
    pub async fn resolve_all(
        &mut self,
        records: &[LocationRecord],
        catch_all: &str,
    ) -> Result<SiteTable> {
        let names: BTreeSet<&str> = records
            .iter()
            .map(|r| r.location.as_str())
            .filter(|name| *name != catch_all)
            .collect();

        let mut sites = Vec::with_capacity(names.len() + 1);
        for name in names {
            let id = self.resolve(name).await?;
            sites.push(Site::new(name, id));
        }

        let catch_all_id = self.resolve(catch_all).await?;
        sites.push(Site::new(catch_all, catch_all_id));

        tracing::info!(
            "{} sites resolved ({} created)",
            sites.len(),
            self.created.len()
        );

        SiteTable::new(sites, catch_all)
    }

    /// Sites created during this invocation, in creation order.
    pub fn created(&self) -> &[Site] {
        &self.created
    }
}

/// Resolved sites for one invocation, catch-all last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteTable {
    sites: Vec<Site>,
}

impl SiteTable {
    /// Build a table, checking that the last entry is the catch-all site.
    pub fn new(sites: Vec<Site>, catch_all: &str) -> Result<Self> {
        match sites.last() {
            Some(last) if last.name == catch_all => Ok(Self { sites }),
            _ => Err(SiteSepError::MissingCatchAll(catch_all.to_string())),
        }
    }

    pub fn catch_all(&self) -> &Site {
        // SiteTable::new guarantees a last entry
        &self.sites[self.sites.len() - 1]
    }

    pub fn id_of(&self, name: &str) -> Option<&str> {
        self.sites
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.id.as_str())
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.sites.iter().any(|s| s.id == id)
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }
}
