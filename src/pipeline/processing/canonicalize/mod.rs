use std::collections::{HashMap, HashSet};

use rayon::prelude::*;

use crate::config::ReconcileConfig;
use crate::domain::EvaluationRecord;

/// Collapses free-text category and reliability labels onto the configured
/// vocabulary and numeric scale.
///
/// Lookups are exact after trimming surrounding whitespace. No case folding
/// or punctuation stripping happens here: two labels that differ only in case
/// are distinct until someone adds a mapping entry for them.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    category_map: HashMap<String, String>,
    score_map: HashMap<String, u8>,
    vocabulary: HashSet<String>,
}

impl Canonicalizer {
    pub fn new(config: &ReconcileConfig) -> Self {
        Self {
            category_map: config
                .category_map
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            score_map: config
                .score_map
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            vocabulary: config.canonical_vocabulary().into_iter().collect(),
        }
    }

    /// Canonical name for a raw category label; the raw label itself on a miss.
    pub fn canonical_category(&self, raw: &str) -> String {
        match self.category_map.get(raw.trim()) {
            Some(canonical) => canonical.clone(),
            None => raw.to_string(),
        }
    }

    /// Numeric score for a reliability label, None when the label is unmapped.
    pub fn reliability_score(&self, label: &str) -> Option<u8> {
        self.score_map.get(label.trim()).copied()
    }

    /// Whether a category name belongs to the fixed vocabulary.
    pub fn is_canonical(&self, category: &str) -> bool {
        self.vocabulary.contains(category)
    }

    /// Fill in the canonical category and score of a record.
    pub fn canonicalize_record(&self, mut record: EvaluationRecord) -> EvaluationRecord {
        record.category_canonical = record
            .category_raw
            .as_deref()
            .map(|raw| self.canonical_category(raw));
        record.reliability_score = record
            .reliability_label
            .as_deref()
            .and_then(|label| self.reliability_score(label));
        record
    }

    /// Canonicalize a whole batch. Output order matches input order.
    pub fn canonicalize_batch(&self, records: Vec<EvaluationRecord>) -> Vec<EvaluationRecord> {
        records
            .into_par_iter()
            .map(|record| self.canonicalize_record(record))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonicalizer() -> Canonicalizer {
        let mut config = ReconcileConfig::default();
        config
            .category_map
            .insert("EPA03.Immunization".to_string(), "03 Immunization".to_string());
        config
            .category_map
            .insert("EPA 3 - Immunization".to_string(), "03 Immunization".to_string());
        config
            .score_map
            .insert("Trust with indirect supervision".to_string(), 3);
        Canonicalizer::new(&config)
    }

    fn record(category: &str, reliability: Option<&str>) -> EvaluationRecord {
        let mut record = EvaluationRecord::empty("current#0");
        record.category_raw = Some(category.to_string());
        record.reliability_label = reliability.map(|s| s.to_string());
        record
    }

    #[test]
    fn test_mapped_category_yields_canonical_name() {
        let c = canonicalizer();
        assert_eq!(c.canonical_category("EPA03.Immunization"), "03 Immunization");
        assert_eq!(c.canonical_category("EPA 3 - Immunization"), "03 Immunization");
        assert_eq!(c.canonical_category("  EPA03.Immunization "), "03 Immunization");
    }

    #[test]
    fn test_unmapped_category_passes_through_unchanged() {
        let c = canonicalizer();
        assert_eq!(c.canonical_category("epa03.immunization"), "epa03.immunization");
        assert_eq!(c.canonical_category(" Something new "), " Something new ");
    }

    #[test]
    fn test_unmapped_reliability_label_has_no_score() {
        let c = canonicalizer();
        assert_eq!(c.reliability_score("Trust with indirect supervision"), Some(3));
        assert_eq!(c.reliability_score("trust with indirect supervision"), None);
        assert_eq!(c.reliability_score(""), None);
    }

    #[test]
    fn test_vocabulary_membership() {
        let c = canonicalizer();
        assert!(c.is_canonical("03 Immunization"));
        assert!(!c.is_canonical("EPA03.Immunization"));
    }

    #[test]
    fn test_canonicalize_record_fills_derived_fields() {
        let c = canonicalizer();
        let out = c.canonicalize_record(record("EPA03.Immunization", Some("Trust with indirect supervision")));
        assert_eq!(out.category_canonical.as_deref(), Some("03 Immunization"));
        assert_eq!(out.reliability_score, Some(3));

        let mut missing = EvaluationRecord::empty("historical#4");
        missing.reliability_label = Some("Unknown".to_string());
        let out = c.canonicalize_record(missing);
        assert_eq!(out.category_canonical, None);
        assert_eq!(out.reliability_score, None);
    }

    #[test]
    fn test_canonicalize_batch_preserves_order() {
        let c = canonicalizer();
        let records: Vec<EvaluationRecord> = (0..500)
            .map(|i| {
                let mut r = record("EPA03.Immunization", None);
                r.source_row = format!("current#{}", i);
                r
            })
            .collect();

        let out = c.canonicalize_batch(records);
        assert_eq!(out.len(), 500);
        for (i, r) in out.iter().enumerate() {
            assert_eq!(r.source_row, format!("current#{}", i));
        }
    }
}
