use crate::error::Result;
use crate::error::WorkflowError;
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;

pub const DEVICE_SN_KEY: &str = "device_sn";
pub const OPERATOR_KEY: &str = "operator";
pub const DATE_KEY: &str = "date";
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ordered answer-key to value mapping. Used both for the accumulated answers
/// of a record and for the delta a runner hands back.
pub type Answers = IndexMap<String, AnswerValue>;

/// Persisted and exported shape of a session: intake fields first, then
/// answer-keys in first-written order.
pub type FlatRecord = IndexMap<String, AnswerValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Null,
    Bool(bool),
    /// Never produced by the engine; kept so hand-edited stores still load.
    Number(serde_json::Number),
    Text(String),
}

impl AnswerValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Null => Ok(()),
            AnswerValue::Bool(value) => write!(f, "{value}"),
            AnswerValue::Number(value) => write!(f, "{value}"),
            AnswerValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Text(value)
    }
}

impl From<bool> for AnswerValue {
    fn from(value: bool) -> Self {
        AnswerValue::Bool(value)
    }
}

impl<T: Into<AnswerValue>> From<Option<T>> for AnswerValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AnswerValue::Null, Into::into)
    }
}

/// Identifying fields collected once per session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intake {
    pub device_sn: String,
    pub operator: String,
    pub date: NaiveDate,
}

impl Intake {
    pub fn new(device_sn: &str, operator: &str, date: NaiveDate) -> Result<Self> {
        let device_sn = device_sn.trim();
        let operator = operator.trim();
        let mut missing = Vec::new();
        if device_sn.is_empty() {
            missing.push("device SN");
        }
        if operator.is_empty() {
            missing.push("operator");
        }
        if !missing.is_empty() {
            return Err(WorkflowError::validation(format!(
                "missing intake field(s): {}",
                missing.join(", ")
            )));
        }
        Ok(Self {
            device_sn: device_sn.to_string(),
            operator: operator.to_string(),
            date,
        })
    }

    /// Builds an intake from raw operator text, parsing the date as `YYYY-MM-DD`.
    pub fn parse(device_sn: &str, operator: &str, date: &str) -> Result<Self> {
        let date = date.trim();
        if date.is_empty() {
            return Err(WorkflowError::validation("missing intake field(s): date"));
        }
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|err| {
            WorkflowError::validation(format!("invalid date {date:?} (expected YYYY-MM-DD): {err}"))
        })?;
        Self::new(device_sn, operator, date)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub intake: Intake,
    pub answers: Answers,
}

impl SessionRecord {
    pub fn new(intake: Intake, placeholders: Answers) -> Self {
        Self {
            intake,
            answers: placeholders,
        }
    }

    /// Overwrites existing keys in place and appends new ones.
    pub fn merge(&mut self, delta: &Answers) {
        for (key, value) in delta {
            self.answers.insert(key.clone(), value.clone());
        }
    }

    pub fn answer(&self, key: &str) -> Option<&AnswerValue> {
        self.answers.get(key)
    }

    pub fn to_flat(&self) -> FlatRecord {
        let mut flat = FlatRecord::with_capacity(self.answers.len() + 3);
        flat.insert(DEVICE_SN_KEY.to_string(), self.intake.device_sn.as_str().into());
        flat.insert(OPERATOR_KEY.to_string(), self.intake.operator.as_str().into());
        flat.insert(
            DATE_KEY.to_string(),
            self.intake.date.format(DATE_FORMAT).to_string().into(),
        );
        for (key, value) in &self.answers {
            flat.insert(key.clone(), value.clone());
        }
        flat
    }

    pub fn from_flat(flat: &FlatRecord) -> Result<Self> {
        let text = |key: &str| {
            flat.get(key)
                .and_then(AnswerValue::as_text)
                .ok_or_else(|| WorkflowError::validation(format!("stored record has no {key}")))
        };
        let intake = Intake::parse(text(DEVICE_SN_KEY)?, text(OPERATOR_KEY)?, text(DATE_KEY)?)?;
        let answers = flat
            .iter()
            .filter(|(key, _)| ![DEVICE_SN_KEY, OPERATOR_KEY, DATE_KEY].contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Self { intake, answers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn intake_rejects_blank_fields() {
        let err = Intake::new("  ", "", date(2024, 1, 1)).unwrap_err();
        assert_matches!(err, WorkflowError::Validation(message) if message.contains("device SN") && message.contains("operator"));
    }

    #[test]
    fn intake_parse_rejects_impossible_dates() {
        assert_matches!(
            Intake::parse("SN-001", "Alice", "2024-02-30"),
            Err(WorkflowError::Validation(_))
        );
        assert_matches!(
            Intake::parse("SN-001", "Alice", ""),
            Err(WorkflowError::Validation(message)) if message.contains("date")
        );
    }

    #[test]
    fn flat_form_puts_intake_first() {
        let intake = Intake::parse(" SN-001 ", "Alice", "2024-01-01").expect("intake");
        let mut placeholders = Answers::new();
        placeholders.insert("Setup2 - Unit Reach Marker".into(), AnswerValue::Null);
        placeholders.insert("Setup4 - Step".into(), AnswerValue::Bool(false));
        let record = SessionRecord::new(intake, placeholders);

        let flat = record.to_flat();
        let keys: Vec<&str> = flat.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["device_sn", "operator", "date", "Setup2 - Unit Reach Marker", "Setup4 - Step"]
        );
        assert_eq!(flat["device_sn"], AnswerValue::from("SN-001"));
        assert_eq!(flat["date"], AnswerValue::from("2024-01-01"));
        assert_eq!(SessionRecord::from_flat(&flat).expect("parse"), record);
    }

    #[test]
    fn merge_keeps_key_positions() {
        let intake = Intake::parse("SN", "Bob", "2024-03-04").expect("intake");
        let mut placeholders = Answers::new();
        placeholders.insert("a".into(), AnswerValue::Null);
        placeholders.insert("b".into(), AnswerValue::Null);
        let mut record = SessionRecord::new(intake, placeholders);

        let mut delta = Answers::new();
        delta.insert("c".into(), "new".into());
        delta.insert("a".into(), "first".into());
        record.merge(&delta);

        let keys: Vec<&str> = record.answers.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(record.answer("a"), Some(&AnswerValue::from("first")));
    }

    #[test]
    fn answer_values_render_as_cells() {
        assert_eq!(AnswerValue::Null.to_string(), "");
        assert_eq!(AnswerValue::Bool(true).to_string(), "true");
        assert_eq!(AnswerValue::from(None::<String>), AnswerValue::Null);
        assert_eq!(AnswerValue::from("12.5").to_string(), "12.5");
    }

    #[test]
    fn numbers_load_and_render_as_written() {
        let flat: FlatRecord =
            serde_json::from_str(r#"{"Setup2 - Measured Max Height": 12.5, "count": 3}"#)
                .expect("parse");
        assert_eq!(flat["Setup2 - Measured Max Height"].to_string(), "12.5");
        assert_eq!(flat["count"].to_string(), "3");
        assert_eq!(
            serde_json::to_string(&flat).expect("serialize"),
            r#"{"Setup2 - Measured Max Height":12.5,"count":3}"#
        );
    }
}
