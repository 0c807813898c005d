use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::domain::{EvaluationRecord, Provenance};
use crate::error::{IntegrityViolation, ReconcileError, Result};
use crate::pipeline::processing::identity::{IdentityExtractor, IdentityKey};

/// Baseline records followed by surviving incoming records, every one
/// stamped with its provenance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedDataset {
    records: Vec<EvaluationRecord>,
}

impl MergedDataset {
    pub fn records(&self) -> &[EvaluationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EvaluationRecord> {
        self.records.iter()
    }
}

pub struct Merger {
    extractor: IdentityExtractor,
}

impl Merger {
    pub fn new(extractor: IdentityExtractor) -> Self {
        Self { extractor }
    }

    /// Concatenate baseline then survivors, preserving each side's order, and
    /// verify that no current-system key also carries data from elsewhere.
    pub fn merge(
        &self,
        baseline: Vec<EvaluationRecord>,
        survivors: Vec<EvaluationRecord>,
    ) -> Result<MergedDataset> {
        let mut records = Vec::with_capacity(baseline.len() + survivors.len());
        records.extend(stamp(baseline, Provenance::CurrentSystem));
        records.extend(stamp(survivors, Provenance::HistoricalImport));

        let dataset = MergedDataset { records };
        let violations = self.check_integrity(&dataset);
        if !violations.is_empty() {
            for v in &violations {
                error!("Integrity violation: {}", v);
            }
            return Err(ReconcileError::IntegrityViolation(violations));
        }

        info!("Merged dataset holds {} records", dataset.len());
        Ok(dataset)
    }

    /// Key groups that mix a current-system record with any other provenance,
    /// sorted by key.
    pub fn check_integrity(&self, dataset: &MergedDataset) -> Vec<IntegrityViolation> {
        let mut groups: BTreeMap<IdentityKey, (usize, BTreeSet<Provenance>)> = BTreeMap::new();
        for record in dataset.iter() {
            let entry = groups
                .entry(self.extractor.key_for(record))
                .or_insert_with(|| (0, BTreeSet::new()));
            entry.0 += 1;
            if let Some(provenance) = record.provenance {
                entry.1.insert(provenance);
            }
        }

        groups
            .into_iter()
            .filter(|(_, (count, provenances))| {
                *count > 1
                    && provenances.len() > 1
                    && provenances.contains(&Provenance::CurrentSystem)
            })
            .map(|(key, (record_count, provenances))| IntegrityViolation {
                identity_key: key.to_string(),
                record_count,
                provenances: provenances.into_iter().collect(),
            })
            .collect()
    }
}

fn stamp(records: Vec<EvaluationRecord>, default: Provenance) -> impl Iterator<Item = EvaluationRecord> {
    records.into_iter().map(move |mut r| {
        if r.provenance.is_none() {
            r.provenance = Some(default);
        }
        r
    })
}
