//! Domain data shapes shared by the reconciliation pipeline.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which of the two source batches a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Provenance {
    /// Live entry system; authoritative.
    CurrentSystem,
    /// Legacy export; only fills gaps.
    HistoricalImport,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::CurrentSystem => "CURRENT_SYSTEM",
            Provenance::HistoricalImport => "HISTORICAL_IMPORT",
        }
    }

    /// Parse a provenance tag as it may appear in a source cell.
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "CURRENT_SYSTEM" => Some(Provenance::CurrentSystem),
            "HISTORICAL_IMPORT" => Some(Provenance::HistoricalImport),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A columnar batch as handed over by an acquisition collaborator.
///
/// `columns` is the batch header. A field whose column is not in the header
/// is treated as absent from the whole batch, even if individual rows happen
/// to carry the key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

impl RawBatch {
    pub fn new(columns: Vec<String>, rows: Vec<Map<String, Value>>) -> Self {
        Self { columns, rows }
    }

    /// Build a batch whose header is the ordered union of the row keys.
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One evaluator's assessment of one learner on one category at one time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub learner_name: Option<String>,
    pub category_raw: Option<String>,
    /// Canonical category; equals the raw label when no mapping exists
    pub category_canonical: Option<String>,
    pub evaluation_date: Option<NaiveDate>,
    /// Date cell text kept when it could not be parsed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_date_raw: Option<String>,
    pub subject_id: Option<String>,
    pub subject_name: Option<String>,
    pub reliability_label: Option<String>,
    /// None when the label is absent or unmapped
    pub reliability_score: Option<u8>,
    /// Unset until the merger stamps it, unless the source supplied one
    pub provenance: Option<Provenance>,
    /// Opaque audit reference back to the source row
    pub source_row: String,
}

impl EvaluationRecord {
    /// A record with every optional field empty.
    pub fn empty(source_row: impl Into<String>) -> Self {
        Self {
            learner_name: None,
            category_raw: None,
            category_canonical: None,
            evaluation_date: None,
            evaluation_date_raw: None,
            subject_id: None,
            subject_name: None,
            reliability_label: None,
            reliability_score: None,
            provenance: None,
            source_row: source_row.into(),
        }
    }
}

/// Record fields that may participate in the identity key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    LearnerName,
    CategoryRaw,
    CategoryCanonical,
    EvaluationDate,
    SubjectId,
    SubjectName,
    ReliabilityLabel,
}

impl IdentityField {
    /// The field set that jointly identifies one evaluation event across both sources.
    pub fn default_fields() -> Vec<IdentityField> {
        vec![
            IdentityField::LearnerName,
            IdentityField::CategoryCanonical,
            IdentityField::EvaluationDate,
            IdentityField::SubjectId,
            IdentityField::SubjectName,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityField::LearnerName => "learner_name",
            IdentityField::CategoryRaw => "category_raw",
            IdentityField::CategoryCanonical => "category_canonical",
            IdentityField::EvaluationDate => "evaluation_date",
            IdentityField::SubjectId => "subject_id",
            IdentityField::SubjectName => "subject_name",
            IdentityField::ReliabilityLabel => "reliability_label",
        }
    }

    /// String form of this field on a record; absent fields yield None.
    /// An unreadable date contributes its literal text.
    pub fn value_of(&self, record: &EvaluationRecord) -> Option<String> {
        match self {
            IdentityField::LearnerName => record.learner_name.clone(),
            IdentityField::CategoryRaw => record.category_raw.clone(),
            IdentityField::CategoryCanonical => record.category_canonical.clone(),
            IdentityField::EvaluationDate => record
                .evaluation_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .or_else(|| record.evaluation_date_raw.clone()),
            IdentityField::SubjectId => record.subject_id.clone(),
            IdentityField::SubjectName => record.subject_name.clone(),
            IdentityField::ReliabilityLabel => record.reliability_label.clone(),
        }
    }
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provenance_parse_label() {
        assert_eq!(Provenance::parse_label("current_system"), Some(Provenance::CurrentSystem));
        assert_eq!(Provenance::parse_label(" HISTORICAL_IMPORT "), Some(Provenance::HistoricalImport));
        assert_eq!(Provenance::parse_label("legacy"), None);
    }

    #[test]
    fn test_from_rows_infers_ordered_header() {
        let rows = vec![
            json!({"learner": "A", "epa": "01"}).as_object().unwrap().clone(),
            json!({"learner": "B", "date": "2025-01-01"}).as_object().unwrap().clone(),
        ];
        let batch = RawBatch::from_rows(rows);

        assert_eq!(batch.len(), 2);
        assert!(batch.has_column("date"));
        assert!(batch.has_column("epa"));
        assert!(!batch.has_column("subject_id"));
        // serde_json::Map is sorted by key without the preserve_order feature
        assert_eq!(batch.columns.len(), 3);
    }

    #[test]
    fn test_identity_field_value_of_date_is_iso() {
        let mut record = EvaluationRecord::empty("current#0");
        record.evaluation_date = NaiveDate::from_ymd_opt(2025, 1, 15);

        assert_eq!(
            IdentityField::EvaluationDate.value_of(&record),
            Some("2025-01-15".to_string())
        );
        assert_eq!(IdentityField::SubjectId.value_of(&record), None);
    }

    #[test]
    fn test_identity_field_value_of_unreadable_date_is_literal() {
        let mut record = EvaluationRecord::empty("historical#0");
        record.evaluation_date_raw = Some("Spring 2019".to_string());
        assert_eq!(
            IdentityField::EvaluationDate.value_of(&record),
            Some("Spring 2019".to_string())
        );

        // A parsed date always wins over leftover text
        record.evaluation_date = NaiveDate::from_ymd_opt(2019, 4, 1);
        assert_eq!(
            IdentityField::EvaluationDate.value_of(&record),
            Some("2019-04-01".to_string())
        );
    }

    #[test]
    fn test_identity_field_serde_names() {
        let fields: Vec<IdentityField> =
            serde_json::from_value(json!(["learner_name", "subject_id"])).unwrap();
        assert_eq!(fields, vec![IdentityField::LearnerName, IdentityField::SubjectId]);

        let bad: std::result::Result<Vec<IdentityField>, _> =
            serde_json::from_value(json!(["evaluator"]));
        assert!(bad.is_err());
    }
}
