/// Joins identity field values. Unit separator; not expected inside form text.
pub const KEY_SEPARATOR: char = '\u{1f}';

/// How many removed identity keys the deduplicator keeps for spot checks
pub const DEFAULT_REMOVED_SAMPLE_SIZE: usize = 5;

pub const DEFAULT_SCORE_MIN: u8 = 1;
pub const DEFAULT_SCORE_MAX: u8 = 5;

// Batch labels used to build default source_row references
pub const BASELINE_BATCH_LABEL: &str = "current";
pub const INCOMING_BATCH_LABEL: &str = "historical";

// Logical field names, also the first accepted column header for each
pub const FIELD_LEARNER_NAME: &str = "learner_name";
pub const FIELD_CATEGORY: &str = "category";
pub const FIELD_EVALUATION_DATE: &str = "evaluation_date";
pub const FIELD_SUBJECT_ID: &str = "subject_id";
pub const FIELD_SUBJECT_NAME: &str = "subject_name";
pub const FIELD_RELIABILITY_LABEL: &str = "reliability_label";
pub const FIELD_PROVENANCE: &str = "provenance";
pub const FIELD_SOURCE_ROW: &str = "source_row";

/// Fields every batch must expose; absent ones are synthesized as null.
pub const REQUIRED_FIELDS: [&str; 6] = [
    FIELD_LEARNER_NAME,
    FIELD_CATEGORY,
    FIELD_EVALUATION_DATE,
    FIELD_SUBJECT_ID,
    FIELD_SUBJECT_NAME,
    FIELD_RELIABILITY_LABEL,
];

/// Date layouts seen in form exports and spreadsheets, tried in order
pub const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%Y/%m/%d"];
pub const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"];
