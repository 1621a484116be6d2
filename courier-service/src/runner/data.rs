//! Tabular data files driving iterations
//!
//! CSV (header row defines column names) or JSON (array of objects). Row
//! selection wraps: iteration `i` uses row `i mod row_count`.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Parsed data file rows, each a column → value map
#[derive(Debug, Clone, Default)]
pub struct DataSet {
    rows: Vec<HashMap<String, String>>,
}

impl DataSet {
    /// Parse data content, choosing the format from the filename extension
    /// when given, otherwise by sniffing the first non-whitespace character
    pub fn parse(filename: Option<&str>, content: &str) -> Result<Self> {
        let looks_json = match filename {
            Some(name) if name.to_ascii_lowercase().ends_with(".json") => true,
            Some(name) if name.to_ascii_lowercase().ends_with(".csv") => false,
            _ => matches!(
                content.trim_start().chars().next(),
                Some('[') | Some('{')
            ),
        };
        if looks_json {
            Self::parse_json(content)
        } else {
            Self::parse_csv(content)
        }
    }

    fn parse_csv(content: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| Error::Validation(format!("invalid CSV data file: {e}")))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record =
                record.map_err(|e| Error::Validation(format!("invalid CSV data file: {e}")))?;
            let row: HashMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.clone(), v.to_string()))
                .collect();
            rows.push(row);
        }
        Ok(Self { rows })
    }

    fn parse_json(content: &str) -> Result<Self> {
        let values: Vec<serde_json::Map<String, serde_json::Value>> =
            serde_json::from_str(content)
                .map_err(|e| Error::Validation(format!("invalid JSON data file: {e}")))?;

        let rows = values
            .into_iter()
            .map(|object| {
                object
                    .into_iter()
                    .map(|(key, value)| (key, stringify(value)))
                    .collect()
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Row for a 0-based iteration index, wrapping over the available rows
    pub fn row(&self, iteration_index: u32) -> Option<&HashMap<String, String>> {
        if self.rows.is_empty() {
            return None;
        }
        self.rows.get(iteration_index as usize % self.rows.len())
    }
}

/// Scalars keep their natural text form; structures stay JSON
fn stringify(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_with_header_row() {
        let data = DataSet::parse(
            Some("users.csv"),
            "name,age\nalice,30\nbob,41\n",
        )
        .unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.row(0).unwrap()["name"], "alice");
        assert_eq!(data.row(1).unwrap()["age"], "41");
    }

    #[test]
    fn test_parse_json_array_of_objects() {
        let data = DataSet::parse(
            Some("users.json"),
            r#"[{"name": "alice", "age": 30, "tags": ["a"]}, {"name": "bob", "age": null}]"#,
        )
        .unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.row(0).unwrap()["age"], "30");
        assert_eq!(data.row(0).unwrap()["tags"], "[\"a\"]");
        assert_eq!(data.row(1).unwrap()["age"], "");
    }

    #[test]
    fn test_row_selection_wraps() {
        let data = DataSet::parse(None, "k\n1\n2\n3\n").unwrap();
        assert_eq!(data.row(0).unwrap()["k"], "1");
        assert_eq!(data.row(3).unwrap()["k"], "1");
        assert_eq!(data.row(4).unwrap()["k"], "2");
    }

    #[test]
    fn test_format_sniffing_without_filename() {
        let json = DataSet::parse(None, "  [{\"k\": \"v\"}]").unwrap();
        assert_eq!(json.row(0).unwrap()["k"], "v");

        let csv = DataSet::parse(None, "k\nv\n").unwrap();
        assert_eq!(csv.row(0).unwrap()["k"], "v");
    }

    #[test]
    fn test_malformed_content_is_a_validation_error() {
        let err = DataSet::parse(Some("data.json"), "{not json").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_empty_dataset_has_no_rows() {
        let data = DataSet::parse(Some("empty.csv"), "a,b\n").unwrap();
        assert!(data.is_empty());
        assert!(data.row(0).is_none());
    }
}
