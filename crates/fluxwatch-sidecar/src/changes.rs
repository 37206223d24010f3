use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::path::Path;

/// Read the watcher's tabular changes file into JSON records, one map per
/// row keyed by the header line. Empty cells become null and
/// numeric-looking fields are rendered as numbers.
pub fn read_changes(path: &Path) -> Result<Vec<Map<String, Value>>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result?;
        let mut row = Map::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            row.insert(header.to_string(), cell_value(field));
        }
        records.push(row);
    }
    Ok(records)
}

fn cell_value(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(n) = field.parse::<i64>() {
        return Value::from(n);
    }
    if let Ok(f) = field.parse::<f64>() {
        if f.is_finite() {
            return Value::from(f);
        }
    }
    Value::from(field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_read_changes_records() {
        let file = write_csv("symbol,change,note\nABC,1.5,up\nXYZ,-2,down\n");
        let records = read_changes(file.path()).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["symbol"], Value::from("ABC"));
        assert_eq!(records[0]["change"], Value::from(1.5));
        assert_eq!(records[1]["change"], Value::from(-2));
    }

    #[test]
    fn test_empty_cells_become_null() {
        let file = write_csv("symbol,change\nABC,\n");
        let records = read_changes(file.path()).unwrap();

        assert_eq!(records[0]["change"], Value::Null);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(read_changes(Path::new("/nonexistent/changes.csv")).is_err());
    }
}
