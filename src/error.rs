use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::domain::Provenance;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Merge integrity violated for {} identity key(s): {}", .0.len(), summarize(.0))]
    IntegrityViolation(Vec<IntegrityViolation>),
}

/// One identity key group that holds both a current-system record and a
/// record from another provenance after merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityViolation {
    pub identity_key: String,
    pub record_count: usize,
    pub provenances: Vec<Provenance>,
}

impl fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let provenances: Vec<&str> = self.provenances.iter().map(|p| p.as_str()).collect();
        write!(
            f,
            "{:?} ({} records, provenances [{}])",
            self.identity_key,
            self.record_count,
            provenances.join(", ")
        )
    }
}

fn summarize(violations: &[IntegrityViolation]) -> String {
    const SHOWN: usize = 3;
    let mut parts: Vec<String> = violations.iter().take(SHOWN).map(|v| v.to_string()).collect();
    if violations.len() > SHOWN {
        parts.push(format!("... and {} more", violations.len() - SHOWN));
    }
    parts.join("; ")
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
