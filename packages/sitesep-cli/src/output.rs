//! Timestamped JSON files for generated rules and locations.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const RULES_PREFIX: &str = "regex_rules";
pub const LOCATIONS_PREFIX: &str = "snow_location";

/// `<dir>/<prefix>-YYYYMMDD-HHMM.json`
pub fn timestamped_path(dir: &Path, prefix: &str, now: DateTime<Local>) -> PathBuf {
    dir.join(format!("{}-{}.json", prefix, now.format("%Y%m%d-%H%M")))
}

/// Pretty-print `value` into a new timestamped file and return its path.
pub fn write_json<T: Serialize + ?Sized>(dir: &Path, prefix: &str, value: &T) -> Result<PathBuf> {
    let path = timestamped_path(dir, prefix, Local::now());
    let content = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    std::fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Wrote {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sitesep_core::LocationRecord;

    #[test]
    fn test_timestamped_path() {
        let now = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 0).unwrap();

        let path = timestamped_path(Path::new("/tmp/out"), RULES_PREFIX, now);

        assert_eq!(path, PathBuf::from("/tmp/out/regex_rules-20240307-0905.json"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![LocationRecord::new("rtr01", "Brno")];

        let path = write_json(dir.path(), LOCATIONS_PREFIX, &records).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("snow_location-"));
        assert!(name.ends_with(".json"));
        let back: Vec<LocationRecord> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, records);
    }

    #[test]
    fn test_write_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();

        let err = write_json(&dir.path().join("nope"), RULES_PREFIX, &Vec::<u8>::new()).unwrap_err();

        assert!(err.to_string().contains("Failed to write"));
    }
}
