use crate::error::Result;
use crate::error::WorkflowError;
use crate::record::FlatRecord;
use crate::store::write_atomically;
use indexmap::IndexSet;
use serde::Deserialize;
use serde::Serialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Which keys become report columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPolicy {
    /// Every key of every record, in first-seen order.
    #[default]
    Union,
    /// Only the first record's keys; keys introduced later are dropped.
    FirstRecord,
}

impl FromStr for HeaderPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "union" => Ok(HeaderPolicy::Union),
            "first_record" => Ok(HeaderPolicy::FirstRecord),
            other => Err(format!(
                "unknown header policy {other:?} (expected union or first-record)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Report {
    pub fn from_records(records: &[FlatRecord], policy: HeaderPolicy) -> Result<Self> {
        let Some(first) = records.first() else {
            return Err(WorkflowError::NoData);
        };
        let header: Vec<String> = match policy {
            HeaderPolicy::FirstRecord => first.keys().cloned().collect(),
            HeaderPolicy::Union => records
                .iter()
                .flat_map(|record| record.keys().cloned())
                .collect::<IndexSet<String>>()
                .into_iter()
                .collect(),
        };
        let rows = records
            .iter()
            .map(|record| {
                header
                    .iter()
                    .map(|key| record.get(key).map(ToString::to_string).unwrap_or_default())
                    .collect()
            })
            .collect();
        Ok(Self { header, rows })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_csv(&self) -> std::io::Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.into_inner().map_err(|err| err.into_error())
    }

    /// Writes the CSV next to `path` and renames it into place.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| WorkflowError::storage(parent, err))?;
        }
        let data = self
            .to_csv()
            .map_err(|err| WorkflowError::storage(path, err))?;
        write_atomically(path, &data)?;
        tracing::info!(path = %path.display(), rows = self.rows.len(), "wrote report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AnswerValue;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn flat(pairs: &[(&str, AnswerValue)]) -> FlatRecord {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), value.clone()))
            .collect()
    }

    fn records() -> Vec<FlatRecord> {
        vec![
            flat(&[
                ("device_sn", "SN-001".into()),
                ("Setup2 - Marker", AnswerValue::Null),
                ("Setup4 - Step", AnswerValue::Bool(false)),
            ]),
            flat(&[
                ("device_sn", "SN-002".into()),
                ("Setup2 - Marker", "Yes".into()),
                ("Setup4 - Step", AnswerValue::Bool(true)),
                ("Setup9 - New", "late".into()),
            ]),
        ]
    }

    #[test]
    fn empty_store_has_no_report() {
        assert_matches!(
            Report::from_records(&[], HeaderPolicy::Union),
            Err(WorkflowError::NoData)
        );
    }

    #[test]
    fn union_header_keeps_late_keys() {
        let report = Report::from_records(&records(), HeaderPolicy::Union).expect("report");
        assert_eq!(
            report.header(),
            ["device_sn", "Setup2 - Marker", "Setup4 - Step", "Setup9 - New"]
        );
        assert_eq!(report.rows()[0], vec!["SN-001", "", "false", ""]);
        assert_eq!(report.rows()[1], vec!["SN-002", "Yes", "true", "late"]);
    }

    #[test]
    fn first_record_header_drops_late_keys() {
        let report = Report::from_records(&records(), HeaderPolicy::FirstRecord).expect("report");
        assert_eq!(report.header(), ["device_sn", "Setup2 - Marker", "Setup4 - Step"]);
        assert_eq!(report.rows()[1], vec!["SN-002", "Yes", "true"]);
    }

    #[test]
    fn csv_quotes_awkward_values() {
        let records = vec![flat(&[("note", "a, \"b\"".into())])];
        let report = Report::from_records(&records, HeaderPolicy::Union).expect("report");
        let csv = String::from_utf8(report.to_csv().expect("csv")).expect("utf8");
        assert_eq!(csv.lines().collect::<Vec<_>>(), vec!["note", "\"a, \"\"b\"\"\""]);
    }

    #[test]
    fn write_to_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out").join("report.csv");
        let report = Report::from_records(&records(), HeaderPolicy::Union).expect("report");
        report.write_to(&path).expect("write");
        let written = fs::read_to_string(&path).expect("read");
        assert_eq!(
            written.lines().next(),
            Some("device_sn,Setup2 - Marker,Setup4 - Step,Setup9 - New")
        );
        assert_eq!(written.lines().count(), 3);
    }

    #[test]
    fn header_policy_parses_cli_spellings() {
        assert_eq!("first-record".parse::<HeaderPolicy>(), Ok(HeaderPolicy::FirstRecord));
        assert_eq!("Union".parse::<HeaderPolicy>(), Ok(HeaderPolicy::Union));
        assert!("columns".parse::<HeaderPolicy>().is_err());
    }
}
