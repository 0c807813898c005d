//! Up-front schema step: turns a raw columnar batch into evaluation records
//! with every expected field present, possibly empty.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::ColumnAliases;
use crate::constants::*;
use crate::domain::{EvaluationRecord, Provenance, RawBatch};

/// What the schema step had to recover from in one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSchemaSummary {
    pub batch: String,
    pub rows: usize,
    /// Required fields absent from the header, synthesized as null
    pub missing_columns: Vec<String>,
    pub unparseable_dates: usize,
}

#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub records: Vec<EvaluationRecord>,
    pub summary: BatchSchemaSummary,
}

/// Column header resolved for each logical field of one batch.
#[derive(Debug, Default)]
struct ResolvedColumns {
    learner_name: Option<String>,
    category: Option<String>,
    evaluation_date: Option<String>,
    subject_id: Option<String>,
    subject_name: Option<String>,
    reliability_label: Option<String>,
    provenance: Option<String>,
    source_row: Option<String>,
}

pub struct SchemaNormalizer {
    aliases: ColumnAliases,
}

impl SchemaNormalizer {
    pub fn new(aliases: ColumnAliases) -> Self {
        Self { aliases }
    }

    fn resolve(&self, batch: &RawBatch, field: &str) -> Option<String> {
        self.aliases
            .for_field(field)
            .iter()
            .find(|alias| batch.has_column(alias))
            .cloned()
    }

    fn resolve_all(&self, batch: &RawBatch) -> ResolvedColumns {
        ResolvedColumns {
            learner_name: self.resolve(batch, FIELD_LEARNER_NAME),
            category: self.resolve(batch, FIELD_CATEGORY),
            evaluation_date: self.resolve(batch, FIELD_EVALUATION_DATE),
            subject_id: self.resolve(batch, FIELD_SUBJECT_ID),
            subject_name: self.resolve(batch, FIELD_SUBJECT_NAME),
            reliability_label: self.resolve(batch, FIELD_RELIABILITY_LABEL),
            provenance: self.resolve(batch, FIELD_PROVENANCE),
            source_row: self.resolve(batch, FIELD_SOURCE_ROW),
        }
    }

    /// Normalize a batch. `label` names the batch in source_row references
    /// and in the summary.
    pub fn normalize(&self, label: &str, batch: &RawBatch) -> NormalizedBatch {
        let columns = self.resolve_all(batch);

        let missing_columns: Vec<String> = REQUIRED_FIELDS
            .iter()
            .filter(|field| self.resolve(batch, field).is_none())
            .map(|field| field.to_string())
            .collect();
        for field in &missing_columns {
            warn!(
                "Batch '{}' has no column for required field '{}'; using null for every row",
                label, field
            );
        }

        let mut unparseable_dates = 0;
        let mut records = Vec::with_capacity(batch.len());

        for (index, row) in batch.rows.iter().enumerate() {
            let mut record = EvaluationRecord::empty(
                cell(row, columns.source_row.as_deref())
                    .unwrap_or_else(|| format!("{}#{}", label, index)),
            );

            record.learner_name = cell(row, columns.learner_name.as_deref());
            record.category_raw = cell(row, columns.category.as_deref());
            record.subject_id = cell(row, columns.subject_id.as_deref());
            record.subject_name = cell(row, columns.subject_name.as_deref());
            record.reliability_label = cell(row, columns.reliability_label.as_deref());

            if let Some(raw_date) = columns.evaluation_date.as_deref().and_then(|c| row.get(c)) {
                match date_cell(raw_date) {
                    DateCell::Parsed(date) => record.evaluation_date = Some(date),
                    DateCell::Empty => {}
                    DateCell::Unparseable(text) => {
                        debug!("Unparseable date {:?} in {}", text, record.source_row);
                        unparseable_dates += 1;
                        record.evaluation_date_raw = Some(text);
                    }
                }
            }

            if let Some(tag) = cell(row, columns.provenance.as_deref()) {
                record.provenance = Provenance::parse_label(&tag);
                if record.provenance.is_none() {
                    debug!("Ignoring unknown provenance tag {:?} in {}", tag, record.source_row);
                }
            }

            records.push(record);
        }

        if unparseable_dates > 0 {
            warn!("Batch '{}' had {} unparseable date cells", label, unparseable_dates);
        }

        NormalizedBatch {
            summary: BatchSchemaSummary {
                batch: label.to_string(),
                rows: records.len(),
                missing_columns,
                unparseable_dates,
            },
            records,
        }
    }
}

fn cell(row: &Map<String, Value>, column: Option<&str>) -> Option<String> {
    column.and_then(|c| row.get(c)).and_then(stringify_cell)
}

/// String form of a cell. Empty text and null are both absent.
pub fn stringify_cell(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64().map(|f| {
                    // Spreadsheet exports turn integer ids into floats
                    if f.fract() == 0.0 && f.abs() < 1e15 {
                        format!("{}", f as i64)
                    } else {
                        f.to_string()
                    }
                })
            }
        }
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

enum DateCell {
    Parsed(NaiveDate),
    Empty,
    Unparseable(String),
}

// Largest serial a spreadsheet date can take (9999-12-31)
const MAX_SPREADSHEET_SERIAL: i64 = 2_958_465;

fn date_cell(value: &Value) -> DateCell {
    if let Some(serial) = value.as_f64().filter(|f| f.fract() == 0.0) {
        return match spreadsheet_serial_date(serial as i64) {
            Some(date) => DateCell::Parsed(date),
            None => DateCell::Unparseable(value.to_string()),
        };
    }
    match stringify_cell(value) {
        None => DateCell::Empty,
        Some(text) => match parse_date(&text) {
            Some(date) => DateCell::Parsed(date),
            None => DateCell::Unparseable(text),
        },
    }
}

/// Day count from the 1899-12-30 spreadsheet epoch.
fn spreadsheet_serial_date(serial: i64) -> Option<NaiveDate> {
    if !(1..=MAX_SPREADSHEET_SERIAL).contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?.checked_add_signed(Duration::days(serial))
}

/// Parse a date from the layouts seen in form exports.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(text).ok().map(|dt| dt.date_naive()))
}
