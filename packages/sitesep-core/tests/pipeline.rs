use std::cell::RefCell;

use sitesep_core::{
    manual_assignments, Assignment, InventoryDevice, LocationRecord, ManualOptions,
    Site, SiteDirectory, SiteSepError, CATCH_ALL_SITE,
};

/// In-memory platform: allocates ids as `site-N` and remembers creations
struct MemoryPlatform {
    next_id: RefCell<usize>,
    created: RefCell<Vec<String>>,
    reachable: bool,
}

impl MemoryPlatform {
    fn new(first_id: usize) -> Self {
        Self {
            next_id: RefCell::new(first_id),
            created: RefCell::new(Vec::new()),
            reachable: true,
        }
    }
}

impl SiteDirectory for MemoryPlatform {
    async fn create_site(&self, name: &str) -> anyhow::Result<String> {
        if !self.reachable {
            anyhow::bail!("connection refused");
        }
        let mut next = self.next_id.borrow_mut();
        let id = format!("site-{}", *next);
        *next += 1;
        self.created.borrow_mut().push(name.to_string());
        Ok(id)
    }
}

fn assignment(sn: &str, site: &str) -> Assignment {
    Assignment {
        serial_number: sn.to_string(),
        site_id: site.to_string(),
    }
}

#[tokio::test]
async fn manual_mode_scenario() {
    let platform = MemoryPlatform::new(10);
    let known = vec![Site::new("web-site", "site-1"), Site::new(CATCH_ALL_SITE, "site-0")];
    let records = vec![LocationRecord::new("web01", "web-site")];
    let inventory = vec![
        InventoryDevice::new("web01", "A1"),
        InventoryDevice::new("unknown99", "A2"),
    ];

    let outcome = manual_assignments(&records, &inventory, &platform, known, &ManualOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.assignments, vec![assignment("A1", "site-1"), assignment("A2", "site-0")]);
    assert!(outcome.created.is_empty());
    assert_eq!(outcome.sites.catch_all().name, CATCH_ALL_SITE);
}

#[tokio::test]
async fn manual_mode_creates_each_missing_site_once() {
    let platform = MemoryPlatform::new(1);
    let records = vec![
        LocationRecord::new("web01", "NYC"),
        LocationRecord::new("web02", "NYC"),
        LocationRecord::new("db01", "LAX"),
    ];
    let inventory = vec![
        InventoryDevice::new("WEB01", "S1"),
        InventoryDevice::new("web02", "S2"),
        InventoryDevice::new("db01", "S3"),
        InventoryDevice::new("fw01", "S4"),
    ];

    let outcome = manual_assignments(&records, &inventory, &platform, Vec::new(), &ManualOptions::default())
        .await
        .unwrap();

    // Sorted creation order, catch-all last
    assert_eq!(platform.created.borrow().as_slice(), ["LAX", "NYC", CATCH_ALL_SITE]);
    assert_eq!(
        outcome.assignments,
        vec![
            assignment("S1", "site-2"),
            assignment("S2", "site-2"),
            assignment("S3", "site-1"),
            assignment("S4", "site-3"),
        ]
    );
    assert_eq!(outcome.created.len(), 3);
}

#[tokio::test]
async fn manual_mode_joins_regardless_of_source_case() {
    let platform = MemoryPlatform::new(1);
    let records = vec![LocationRecord::new("web01", "NYC")];
    let inventory = vec![InventoryDevice::new("WEB01", "S1")];

    let outcome = manual_assignments(&records, &inventory, &platform, Vec::new(), &ManualOptions::default())
        .await
        .unwrap();

    let nyc = outcome.sites.id_of("NYC").unwrap();
    assert_eq!(outcome.assignments, vec![assignment("S1", nyc)]);
}

#[tokio::test]
async fn manual_mode_rejects_bad_records_before_creating_sites() {
    let platform = MemoryPlatform::new(1);
    let records = vec![
        LocationRecord::new("web01", "NYC"),
        LocationRecord::new("db01", ""),
    ];

    let err = manual_assignments(&records, &[], &platform, Vec::new(), &ManualOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SiteSepError::InvalidRecords(_)));
    assert!(platform.created.borrow().is_empty());
}

#[tokio::test]
async fn manual_mode_surfaces_creation_failure() {
    let platform = MemoryPlatform {
        reachable: false,
        ..MemoryPlatform::new(1)
    };
    let records = vec![LocationRecord::new("web01", "NYC")];

    let err = manual_assignments(&records, &[], &platform, Vec::new(), &ManualOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, SiteSepError::SiteCreation { ref name, .. } if name == "NYC"));
}
