use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::domain::IdentityField;
use crate::error::{ReconcileError, Result};

/// Static reconciliation configuration, fixed at engine construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Raw category label variant -> canonical category name
    pub category_map: BTreeMap<String, String>,
    /// Raw reliability label variant -> numeric score
    pub score_map: BTreeMap<String, u8>,
    /// Ordered fields that make up the identity key
    pub identity_fields: Vec<IdentityField>,
    pub score_scale: ScoreScale,
    pub removed_sample_size: usize,
    pub columns: ColumnAliases,
}

/// Inclusive bounds of the reliability scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreScale {
    pub min: u8,
    pub max: u8,
}

impl ScoreScale {
    pub fn contains(&self, score: u8) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

impl Default for ScoreScale {
    fn default() -> Self {
        Self {
            min: DEFAULT_SCORE_MIN,
            max: DEFAULT_SCORE_MAX,
        }
    }
}

/// Accepted column headers per logical field, first match wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnAliases {
    pub learner_name: Vec<String>,
    pub category: Vec<String>,
    pub evaluation_date: Vec<String>,
    pub subject_id: Vec<String>,
    pub subject_name: Vec<String>,
    pub reliability_label: Vec<String>,
    pub provenance: Vec<String>,
    pub source_row: Vec<String>,
}

impl ColumnAliases {
    /// Aliases for a logical field name from `constants`.
    pub fn for_field(&self, field: &str) -> &[String] {
        match field {
            FIELD_LEARNER_NAME => &self.learner_name,
            FIELD_CATEGORY => &self.category,
            FIELD_EVALUATION_DATE => &self.evaluation_date,
            FIELD_SUBJECT_ID => &self.subject_id,
            FIELD_SUBJECT_NAME => &self.subject_name,
            FIELD_RELIABILITY_LABEL => &self.reliability_label,
            FIELD_PROVENANCE => &self.provenance,
            FIELD_SOURCE_ROW => &self.source_row,
            _ => &[],
        }
    }
}

fn aliases(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnAliases {
    fn default() -> Self {
        Self {
            learner_name: aliases(&[FIELD_LEARNER_NAME, "learner", "resident", "student"]),
            category: aliases(&[FIELD_CATEGORY, "category_raw", "epa"]),
            evaluation_date: aliases(&[FIELD_EVALUATION_DATE, "date", "eval_date"]),
            subject_id: aliases(&[FIELD_SUBJECT_ID, "patient_id", "case_id"]),
            subject_name: aliases(&[FIELD_SUBJECT_NAME, "patient_name", "case_name"]),
            reliability_label: aliases(&[FIELD_RELIABILITY_LABEL, "reliability", "entrustment"]),
            provenance: aliases(&[FIELD_PROVENANCE, "source"]),
            source_row: aliases(&[FIELD_SOURCE_ROW]),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            category_map: BTreeMap::new(),
            score_map: BTreeMap::new(),
            identity_fields: IdentityField::default_fields(),
            score_scale: ScoreScale::default(),
            removed_sample_size: DEFAULT_REMOVED_SAMPLE_SIZE,
            columns: ColumnAliases::default(),
        }
    }
}

impl ReconcileConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReconcileConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.identity_fields.is_empty() {
            return Err(ReconcileError::Config(
                "identity_fields must name at least one field".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.identity_fields {
            if !seen.insert(*field) {
                return Err(ReconcileError::Config(format!(
                    "identity field '{}' is listed more than once",
                    field
                )));
            }
        }

        if self.score_scale.min > self.score_scale.max {
            return Err(ReconcileError::Config(format!(
                "score_scale.min ({}) exceeds score_scale.max ({})",
                self.score_scale.min, self.score_scale.max
            )));
        }

        for (label, score) in &self.score_map {
            if !self.score_scale.contains(*score) {
                return Err(ReconcileError::Config(format!(
                    "score_map entry {:?} = {} is outside the scale {}..={}",
                    label, score, self.score_scale.min, self.score_scale.max
                )));
            }
        }

        Ok(())
    }

    /// The fixed vocabulary: every canonical name the category map can produce.
    pub fn canonical_vocabulary(&self) -> BTreeSet<String> {
        self.category_map.values().cloned().collect()
    }
}
