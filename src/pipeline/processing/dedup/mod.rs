use std::collections::HashSet;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{EvaluationRecord, Provenance};
use crate::pipeline::processing::identity::{IdentityExtractor, IdentityKey};

/// Observable result of a dedup pass, kept for the operator review step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupSummary {
    pub incoming_count: usize,
    pub removed_count: usize,
    pub surviving_count: usize,
    /// First removed keys in incoming order, without repeats
    pub removed_sample: Vec<IdentityKey>,
}

#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub survivors: Vec<EvaluationRecord>,
    pub summary: DedupSummary,
}

/// Drops incoming records whose identity already exists in the baseline.
///
/// The baseline is authoritative and never filtered. The key set is built
/// fresh on every call, so one deduplicator can serve concurrent runs.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    extractor: IdentityExtractor,
    sample_size: usize,
}

impl Deduplicator {
    pub fn new(extractor: IdentityExtractor, sample_size: usize) -> Self {
        Self {
            extractor,
            sample_size,
        }
    }

    /// Identity keys of baseline records that count as current-system data.
    /// A baseline row explicitly tagged as historical does not shadow anything.
    pub fn baseline_keys(&self, baseline: &[EvaluationRecord]) -> HashSet<IdentityKey> {
        baseline
            .par_iter()
            .filter(|r| r.provenance != Some(Provenance::HistoricalImport))
            .map(|r| self.extractor.key_for(r))
            .collect()
    }

    pub fn filter_incoming(
        &self,
        baseline: &[EvaluationRecord],
        incoming: Vec<EvaluationRecord>,
    ) -> DedupOutcome {
        let known = self.baseline_keys(baseline);
        let incoming_count = incoming.len();

        // Membership is decided in parallel; the partition below stays sequential
        // so survivors keep their original relative order.
        let verdicts: Vec<(IdentityKey, bool)> = self
            .extractor
            .keys_for(&incoming)
            .into_par_iter()
            .map(|key| {
                let duplicate = known.contains(&key);
                (key, duplicate)
            })
            .collect();

        let mut survivors = Vec::with_capacity(incoming_count);
        let mut removed_count = 0;
        let mut removed_sample: Vec<IdentityKey> = Vec::new();

        for (record, (key, duplicate)) in incoming.into_iter().zip(verdicts) {
            if duplicate {
                removed_count += 1;
                if removed_sample.len() < self.sample_size && !removed_sample.contains(&key) {
                    removed_sample.push(key);
                }
            } else {
                survivors.push(record);
            }
        }

        info!(
            "Dedup removed {} of {} incoming records ({} baseline keys)",
            removed_count,
            incoming_count,
            known.len()
        );
        for key in &removed_sample {
            debug!("Removed duplicate key: {}", key);
        }

        let summary = DedupSummary {
            incoming_count,
            removed_count,
            surviving_count: survivors.len(),
            removed_sample,
        };

        DedupOutcome { survivors, summary }
    }
}
