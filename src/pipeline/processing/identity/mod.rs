use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::constants::KEY_SEPARATOR;
use crate::domain::{EvaluationRecord, IdentityField};

/// Composite natural key of an evaluation event.
///
/// Two records with equal keys describe the same real-world evaluation,
/// whichever batch they came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key parts, in configured field order.
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split(KEY_SEPARATOR)
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Render the separator visibly for logs and review lists
        let parts: Vec<&str> = self.parts().collect();
        f.write_str(&parts.join(" | "))
    }
}

/// Builds identity keys from a fixed, ordered field list.
#[derive(Debug, Clone)]
pub struct IdentityExtractor {
    fields: Vec<IdentityField>,
}

impl IdentityExtractor {
    pub fn new(fields: Vec<IdentityField>) -> Self {
        Self { fields }
    }

    /// Key for one record. Values are trimmed and otherwise compared
    /// literally; a missing field contributes an empty part.
    pub fn key_for(&self, record: &EvaluationRecord) -> IdentityKey {
        let mut key = String::new();
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            if let Some(value) = field.value_of(record) {
                key.push_str(value.trim());
            }
        }
        IdentityKey(key)
    }

    /// Keys for a batch, positionally aligned with the input.
    pub fn keys_for(&self, records: &[EvaluationRecord]) -> Vec<IdentityKey> {
        records.par_iter().map(|record| self.key_for(record)).collect()
    }
}
