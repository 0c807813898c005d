use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ScoreScale;
use crate::domain::Provenance;
use crate::pipeline::processing::canonicalize::Canonicalizer;
use crate::pipeline::processing::dedup::DedupSummary;
use crate::pipeline::processing::identity::IdentityExtractor;
use crate::pipeline::processing::merge::MergedDataset;

/// Summary statistics over a merged dataset, for operator review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub total_records: usize,
    /// Incoming records dropped because the baseline already held their key
    pub removed_duplicates: usize,
    pub records_by_provenance: BTreeMap<Provenance, usize>,
    pub distinct_learners: usize,
    /// Keyed by canonical category, unmapped labels included as they appear
    pub categories: BTreeMap<String, CategoryCount>,
    /// Records with no category at all
    pub uncategorized: usize,
    pub unmapped_categories: BTreeMap<String, usize>,
    pub unmapped_reliability_labels: BTreeMap<String, usize>,
    pub scores: ScoreStats,
    pub earliest_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    /// Keys repeated within one provenance; allowed but worth a look
    pub duplicate_key_groups: usize,
    /// SHA-256 over the ordered identity keys and provenances
    pub dataset_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub count: usize,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreStats {
    pub scored: usize,
    pub unscored: usize,
    pub mean: Option<f64>,
    pub median: Option<f64>,
    /// One bucket per point of the scale, zero-filled
    pub histogram: BTreeMap<u8, usize>,
}

pub struct Reporter {
    canonicalizer: Canonicalizer,
    extractor: IdentityExtractor,
    scale: ScoreScale,
}

impl Reporter {
    pub fn new(canonicalizer: Canonicalizer, extractor: IdentityExtractor, scale: ScoreScale) -> Self {
        Self {
            canonicalizer,
            extractor,
            scale,
        }
    }

    pub fn summarize(&self, dataset: &MergedDataset, dedup: &DedupSummary) -> ReconcileReport {
        let total = dataset.len();

        let mut records_by_provenance: BTreeMap<Provenance, usize> = BTreeMap::new();
        records_by_provenance.insert(Provenance::CurrentSystem, 0);
        records_by_provenance.insert(Provenance::HistoricalImport, 0);

        let mut learners: HashSet<&str> = HashSet::new();
        let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut uncategorized = 0;
        let mut unmapped_categories: BTreeMap<String, usize> = BTreeMap::new();
        let mut unmapped_reliability_labels: BTreeMap<String, usize> = BTreeMap::new();
        let mut scores: Vec<u8> = Vec::new();
        let mut earliest_date: Option<NaiveDate> = None;
        let mut latest_date: Option<NaiveDate> = None;

        for record in dataset.iter() {
            if let Some(provenance) = record.provenance {
                *records_by_provenance.entry(provenance).or_insert(0) += 1;
            }

            if let Some(learner) = record.learner_name.as_deref() {
                learners.insert(learner);
            }

            match record.category_canonical.as_deref() {
                Some(category) => {
                    *category_counts.entry(category.to_string()).or_insert(0) += 1;
                    if !self.canonicalizer.is_canonical(category) {
                        *unmapped_categories.entry(category.to_string()).or_insert(0) += 1;
                    }
                }
                None => uncategorized += 1,
            }

            match record.reliability_score {
                Some(score) => scores.push(score),
                None => {
                    if let Some(label) = record.reliability_label.as_deref() {
                        *unmapped_reliability_labels.entry(label.to_string()).or_insert(0) += 1;
                    }
                }
            }

            if let Some(date) = record.evaluation_date {
                earliest_date = Some(earliest_date.map_or(date, |d| d.min(date)));
                latest_date = Some(latest_date.map_or(date, |d| d.max(date)));
            }
        }

        let categories = category_counts
            .into_iter()
            .map(|(name, count)| {
                let percentage = count as f64 * 100.0 / total as f64;
                (name, CategoryCount { count, percentage })
            })
            .collect();

        ReconcileReport {
            total_records: total,
            removed_duplicates: dedup.removed_count,
            records_by_provenance,
            distinct_learners: learners.len(),
            categories,
            uncategorized,
            unmapped_categories,
            unmapped_reliability_labels,
            scores: self.score_stats(scores, total),
            earliest_date,
            latest_date,
            duplicate_key_groups: self.duplicate_key_groups(dataset),
            dataset_fingerprint: self.fingerprint(dataset),
        }
    }

    fn score_stats(&self, mut scores: Vec<u8>, total: usize) -> ScoreStats {
        let mut histogram: BTreeMap<u8, usize> =
            (self.scale.min..=self.scale.max).map(|s| (s, 0)).collect();
        for score in &scores {
            *histogram.entry(*score).or_insert(0) += 1;
        }

        scores.sort_unstable();
        let scored = scores.len();
        let mean = if scored == 0 {
            None
        } else {
            Some(scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scored as f64)
        };
        let median = match scored {
            0 => None,
            n if n % 2 == 1 => Some(f64::from(scores[n / 2])),
            n => Some((f64::from(scores[n / 2 - 1]) + f64::from(scores[n / 2])) / 2.0),
        };

        ScoreStats {
            scored,
            unscored: total - scored,
            mean,
            median,
            histogram,
        }
    }

    fn duplicate_key_groups(&self, dataset: &MergedDataset) -> usize {
        let keys = self.extractor.keys_for(dataset.records());
        let mut counts: HashMap<_, usize> = HashMap::new();
        for (key, record) in keys.into_iter().zip(dataset.iter()) {
            *counts.entry((key, record.provenance)).or_insert(0) += 1;
        }
        counts.values().filter(|c| **c > 1).count()
    }

    fn fingerprint(&self, dataset: &MergedDataset) -> String {
        let mut hasher = Sha256::new();
        for record in dataset.iter() {
            hasher.update(self.extractor.key_for(record).as_str().as_bytes());
            hasher.update([0x1e_u8]);
            hasher.update(record.provenance.map_or("", |p| p.as_str()).as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}
