//! Site Separation Core Library
//!
//! Reconciles a hostname -> location mapping against a device inventory and
//! produces site separation settings for the inventory platform:
//! - Site resolution (find or create a site per location, catch-all last)
//! - Manual assignment (one site id per device serial number)
//! - Rule compilation (ordered, size-bounded hostname rules with a catch-all)
//!
//! The crate does no network or file I/O. Platform access comes in through
//! the [`sites::SiteDirectory`] and [`rules::PatternSynthesizer`] traits.
//!
//! # Example
//!
//! ```
//! use sitesep_core::{compile, CompileOptions, LocationRecord};
//!
//! let records = vec![
//!     LocationRecord::new("web01", "NYC"),
//!     LocationRecord::new("db01", "LAX"),
//! ];
//! let rules = compile(&records, &CompileOptions::default(), None).unwrap();
//!
//! assert_eq!(rules.len(), 3);
//! assert_eq!(rules[0].pattern, "DB01");
//! assert!(rules[2].is_catch_all());
//! ```

pub mod case;
pub mod error;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod rules;
pub mod sites;

// Re-export commonly used types
pub use case::CasePolicy;
pub use error::{RecordField, RecordIssue, SiteSepError};
pub use merge::{locate, merge, LocatedSite};
pub use model::{
    validate_records, Assignment, InventoryDevice, LocationRecord, Rule, RuleKind, Site,
    Transformation, CATCH_ALL_SITE,
};
pub use pipeline::{manual_assignments, ManualOptions, ManualOutcome, Strategy};
pub use rules::{compile, compile_buckets, prepend_to_existing, CompileOptions, PatternSynthesizer, RuleMatcher};
pub use sites::{SiteDirectory, SiteResolver, SiteTable};
