//! Records exchanged between the core and its collaborators.

use crate::error::{RecordField, RecordIssue, Result, SiteSepError};
use serde::{Deserialize, Serialize};

/// Reserved name of the site that receives every unmatched device
pub const CATCH_ALL_SITE: &str = "_catch_all_";

/// Pattern of the trailing catch-all rule
pub const CATCH_ALL_PATTERN: &str = ".*";

/// Note attached to the trailing catch-all rule
pub const CATCH_ALL_NOTE: &str = "Catch ALL";

/// One (hostname -> location) pair from the location source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub hostname: String,
    pub location: String,
}

impl LocationRecord {
    pub fn new(hostname: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            location: location.into(),
        }
    }
}

/// A device as seen by the inventory platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryDevice {
    pub hostname: String,
    pub serial_number: String,
}

impl InventoryDevice {
    pub fn new(hostname: impl Into<String>, serial_number: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            serial_number: serial_number.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    pub id: String,
}

impl Site {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// Manual-mode output: one device placed in one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub serial_number: String,
    pub site_id: String,
}

/// Case transformation the consuming system applies to a hostname before
/// matching it against a rule's pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transformation {
    #[default]
    None,
    Uppercase,
    Lowercase,
}

/// Rule type tag expected by the consuming system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleKind {
    #[default]
    Regex,
    RegexHostname,
}

/// A hostname classification rule. Rules are evaluated first-match-wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(default)]
    pub note: String,
    #[serde(rename = "regex")]
    pub pattern: String,
    pub site_name: String,
    #[serde(default)]
    pub transformation: Transformation,
    #[serde(rename = "type", default)]
    pub kind: RuleKind,
    /// Fields the platform attaches (rule `id` and the like), written back
    /// unchanged when existing rules are kept
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Rule {
    /// The rule that closes every rule list.
    pub fn catch_all(kind: RuleKind) -> Self {
        Self::catch_all_to(CATCH_ALL_SITE, kind)
    }

    /// Catch-all rule sending unmatched hostnames to `site`.
    pub fn catch_all_to(site: &str, kind: RuleKind) -> Self {
        Self {
            note: CATCH_ALL_NOTE.to_string(),
            pattern: CATCH_ALL_PATTERN.to_string(),
            site_name: site.to_string(),
            transformation: Transformation::Uppercase,
            kind,
            extra: serde_json::Map::new(),
        }
    }

    /// A rule whose pattern matches every hostname; nothing after it can fire.
    pub fn is_catch_all(&self) -> bool {
        self.pattern == CATCH_ALL_PATTERN
    }
}

/// Reject records with a blank hostname or location.
///
/// Every offending record is reported, not only the first one.
pub fn validate_records(records: &[LocationRecord]) -> Result<()> {
    let mut issues = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if record.hostname.trim().is_empty() {
            issues.push(RecordIssue {
                index,
                hostname: record.hostname.clone(),
                field: RecordField::Hostname,
                reason: "is empty".to_string(),
            });
        }
        if record.location.trim().is_empty() {
            issues.push(RecordIssue {
                index,
                hostname: record.hostname.clone(),
                field: RecordField::Location,
                reason: "is empty".to_string(),
            });
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(SiteSepError::InvalidRecords(issues))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_reports_every_bad_record() {
        let records = vec![
            LocationRecord::new("web01", "NYC"),
            LocationRecord::new("", "NYC"),
            LocationRecord::new("db01", "  "),
            LocationRecord::new(" ", ""),
        ];

        let err = validate_records(&records).unwrap_err();
        match err {
            SiteSepError::InvalidRecords(issues) => {
                assert_eq!(issues.len(), 4);
                assert_eq!(issues[0].index, 1);
                assert_eq!(issues[0].field, RecordField::Hostname);
                assert_eq!(issues[1].index, 2);
                assert_eq!(issues[1].field, RecordField::Location);
                assert_eq!(issues[2].index, 3);
                assert_eq!(issues[3].index, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_accepts_clean_records() {
        let records = vec![LocationRecord::new("web01", "NYC")];
        assert!(validate_records(&records).is_ok());
        assert!(validate_records(&[]).is_ok());
    }

    #[test]
    fn test_rule_wire_shape() {
        let rule = Rule::catch_all(RuleKind::Regex);
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "note": "Catch ALL",
                "regex": ".*",
                "siteName": "_catch_all_",
                "transformation": "uppercase",
                "type": "regex",
            })
        );
    }

    #[test]
    fn test_rule_parses_platform_rule_with_extra_fields() {
        let rule: Rule = serde_json::from_value(serde_json::json!({
            "id": "468eca77-d66b-428d-b1db-6d96d112b45f",
            "note": "^L33R[79]$ >> L33",
            "regex": "^L33R[79]$",
            "siteName": "L33",
            "transformation": "none",
            "type": "regexHostname"
        }))
        .unwrap();
        assert_eq!(rule.pattern, "^L33R[79]$");
        assert_eq!(rule.kind, RuleKind::RegexHostname);
        assert!(!rule.is_catch_all());
        assert_eq!(rule.extra["id"], "468eca77-d66b-428d-b1db-6d96d112b45f");
    }

    #[test]
    fn test_platform_rule_written_back_unchanged() {
        let fetched = serde_json::json!({
            "id": "468eca77",
            "note": "",
            "regex": "^L33",
            "siteName": "L33",
            "transformation": "none",
            "type": "regex",
            "priority": 3
        });

        let rule: Rule = serde_json::from_value(fetched.clone()).unwrap();

        assert_eq!(serde_json::to_value(&rule).unwrap(), fetched);
    }

    #[test]
    fn test_new_rules_carry_no_extra_fields() {
        let value = serde_json::to_value(Rule::catch_all_to("UNSORTED", RuleKind::Regex)).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "note": "Catch ALL",
                "regex": ".*",
                "siteName": "UNSORTED",
                "transformation": "uppercase",
                "type": "regex"
            })
        );
    }
}
