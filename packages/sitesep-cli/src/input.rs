//! Hostname to location mappings from local files.

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto};
use serde::Deserialize;
use sitesep_core::LocationRecord;
use std::path::Path;

/// Delimiters tried when sniffing a CSV header, in order of preference
const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

#[derive(Debug, Deserialize)]
struct JsonRecord {
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    location: String,
}

/// Read location records from a `.csv`, `.xls`, `.xlsx` or `.json` file.
pub fn read_records(path: &Path) -> Result<Vec<LocationRecord>> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let records = match extension.as_deref() {
        Some("csv") => read_csv(path)?,
        Some("xls") | Some("xlsx") => read_spreadsheet(path)?,
        Some("json") => read_json(path)?,
        _ => bail!(
            "Unsupported input file {}: expected a .csv, .xls, .xlsx or .json file",
            path.display()
        ),
    };

    tracing::info!("Read {} location records from {}", records.len(), path.display());
    Ok(records)
}

fn read_csv(path: &Path) -> Result<Vec<LocationRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let delimiter = sniff_delimiter(&content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (line, row) in reader.records().enumerate() {
        // Header is line 1
        let row = row.with_context(|| format!("{}: malformed row {}", path.display(), line + 2))?;
        let hostname = row.get(0).unwrap_or_default();
        let location = row.get(1).unwrap_or_default();
        if let Some(record) = sanitize(hostname, location) {
            records.push(record);
        }
    }
    Ok(records)
}

/// First worksheet only; the first row is the header.
fn read_spreadsheet(path: &Path) -> Result<Vec<LocationRecord>> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| anyhow!("{} contains no worksheets", path.display()))?
        .with_context(|| format!("Failed to read first worksheet of {}", path.display()))?;

    Ok(range
        .rows()
        .skip(1)
        .filter_map(|row| {
            let hostname = row.first().map(cell_text).unwrap_or_default();
            let location = row.get(1).map(cell_text).unwrap_or_default();
            sanitize(&hostname, &location)
        })
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn read_json(path: &Path) -> Result<Vec<LocationRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let rows: Vec<JsonRecord> = serde_json::from_str(&content).map_err(|e| {
        anyhow!(
            "{}: expected an array of {{\"hostname\", \"location\"}} objects: {}",
            path.display(),
            e
        )
    })?;

    Ok(rows
        .iter()
        .filter_map(|row| sanitize(&row.hostname, &row.location))
        .collect())
}

/// Pick the candidate delimiter that splits the header into the most fields.
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    DELIMITERS
        .iter()
        .copied()
        .max_by_key(|d| {
            // Earlier candidates win ties
            let count = header.bytes().filter(|b| b == d).count();
            (count, std::cmp::Reverse(DELIMITERS.iter().position(|c| c == d)))
        })
        .filter(|d| header.as_bytes().contains(d))
        .unwrap_or(b',')
}

/// Clean up a raw row. Returns `None` for rows with both fields blank; a row
/// with one blank field is kept so validation can report it.
fn sanitize(hostname: &str, location: &str) -> Option<LocationRecord> {
    let hostname = clean(hostname);
    let location = clean(location);
    if hostname.is_empty() && location.is_empty() {
        return None;
    }
    Some(LocationRecord::new(hostname, location))
}

fn clean(value: &str) -> String {
    value.replace(['(', ')', ','], "-").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_csv_with_comma() {
        let file = file_with(".csv", "hostname,location,owner\nweb01,NYC,ops\n db01 , LAX ,dba\n");

        let records = read_records(file.path()).unwrap();

        assert_eq!(
            records,
            vec![LocationRecord::new("web01", "NYC"), LocationRecord::new("db01", "LAX")]
        );
    }

    #[test]
    fn test_csv_with_semicolon_and_quotes() {
        let file = file_with(".csv", "hostname;location\nweb01;\"New York (HQ), 5th\"\n");

        let records = read_records(file.path()).unwrap();

        assert_eq!(records, vec![LocationRecord::new("web01", "New York -HQ-- 5th")]);
    }

    #[test]
    fn test_csv_blank_rows_dropped_partial_rows_kept() {
        let file = file_with(".csv", "hostname\tlocation\nweb01\tNYC\n\t\ndb01\t\n");

        let records = read_records(file.path()).unwrap();

        assert_eq!(
            records,
            vec![LocationRecord::new("web01", "NYC"), LocationRecord::new("db01", "")]
        );
    }

    #[test]
    fn test_json_records() {
        let file = file_with(
            ".json",
            r#"[{"hostname": "web01", "location": "NYC"}, {"hostname": "", "location": ""}, {"hostname": "db01"}]"#,
        );

        let records = read_records(file.path()).unwrap();

        assert_eq!(
            records,
            vec![LocationRecord::new("web01", "NYC"), LocationRecord::new("db01", "")]
        );
    }

    #[test]
    fn test_json_wrong_shape() {
        let file = file_with(".json", r#"{"hostname": "web01"}"#);

        let err = read_records(file.path()).unwrap_err();

        assert!(err.to_string().contains("expected an array"));
    }

    #[test]
    fn test_xlsx_first_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locations.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "hostname").unwrap();
        sheet.write_string(0, 1, "location").unwrap();
        sheet.write_string(1, 0, "web01").unwrap();
        sheet.write_string(1, 1, "New York (HQ)").unwrap();
        sheet.write_string(3, 0, " db01 ").unwrap();
        sheet.write_number(3, 1, 42).unwrap();
        workbook.save(&path).unwrap();

        let records = read_records(&path).unwrap();

        assert_eq!(
            records,
            vec![LocationRecord::new("web01", "New York -HQ-"), LocationRecord::new("db01", "42")]
        );
    }

    #[test]
    fn test_corrupt_workbook() {
        let file = file_with(".xlsx", "not a zip archive");

        let err = read_records(file.path()).unwrap_err();

        assert!(err.to_string().contains("Failed to open workbook"));
    }

    #[test]
    fn test_unsupported_extension() {
        let file = file_with(".ods", "");

        let err = read_records(file.path()).unwrap_err();

        assert!(err.to_string().contains("Unsupported input file"));
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("a,b,c\n"), b',');
        assert_eq!(sniff_delimiter("a;b;c\n1,2;3"), b';');
        assert_eq!(sniff_delimiter("a|b\n"), b'|');
        assert_eq!(sniff_delimiter("single\n"), b',');
    }
}
