use std::time::Instant;

use serde::Serialize;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::ReconcileConfig;
use crate::constants::{BASELINE_BATCH_LABEL, INCOMING_BATCH_LABEL};
use crate::domain::{EvaluationRecord, RawBatch};
use crate::error::Result;
use crate::pipeline::processing::canonicalize::Canonicalizer;
use crate::pipeline::processing::dedup::{DedupSummary, Deduplicator};
use crate::pipeline::processing::identity::IdentityExtractor;
use crate::pipeline::processing::merge::{MergedDataset, Merger};
use crate::pipeline::processing::report::{ReconcileReport, Reporter};
use crate::pipeline::processing::schema::{BatchSchemaSummary, SchemaNormalizer};

/// Everything one run produces for the review step and downstream consumers.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileOutcome {
    pub dataset: MergedDataset,
    pub report: ReconcileReport,
    pub dedup: DedupSummary,
    /// Baseline summary first, then incoming
    pub schema: Vec<BatchSchemaSummary>,
}

/// Reconciliation engine: schema step, canonicalization, identity, dedup,
/// merge, report.
///
/// Holds only immutable configuration. Every run builds its own baseline key
/// set, so one engine can be shared across threads and concurrent runs.
pub struct Reconciler {
    schema: SchemaNormalizer,
    canonicalizer: Canonicalizer,
    deduplicator: Deduplicator,
    merger: Merger,
    reporter: Reporter,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Result<Self> {
        config.validate()?;

        let canonicalizer = Canonicalizer::new(&config);
        let extractor = IdentityExtractor::new(config.identity_fields.clone());

        info!(
            "Reconciler configured: {} category variants, {} reliability labels, identity fields [{}]",
            config.category_map.len(),
            config.score_map.len(),
            config
                .identity_fields
                .iter()
                .map(|f| f.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        Ok(Self {
            schema: SchemaNormalizer::new(config.columns.clone()),
            deduplicator: Deduplicator::new(extractor.clone(), config.removed_sample_size),
            merger: Merger::new(extractor.clone()),
            reporter: Reporter::new(canonicalizer.clone(), extractor, config.score_scale),
            canonicalizer,
        })
    }

    /// Full run over two raw batches.
    pub fn run(&self, baseline: &RawBatch, incoming: &RawBatch) -> Result<ReconcileOutcome> {
        let span = info_span!("reconcile", run_id = %Uuid::new_v4());
        let _enter = span.enter();
        let start = Instant::now();

        info!(
            "Starting reconciliation: {} baseline rows, {} incoming rows",
            baseline.len(),
            incoming.len()
        );

        let baseline = self.schema.normalize(BASELINE_BATCH_LABEL, baseline);
        let incoming = self.schema.normalize(INCOMING_BATCH_LABEL, incoming);

        let (dataset, dedup) = self.reconcile_records(baseline.records, incoming.records)?;
        let report = self.reporter.summarize(&dataset, &dedup);

        if !report.unmapped_categories.is_empty() || !report.unmapped_reliability_labels.is_empty() {
            warn!(
                "{} unmapped category label(s), {} unmapped reliability label(s) need review",
                report.unmapped_categories.len(),
                report.unmapped_reliability_labels.len()
            );
        }

        info!(
            "Reconciliation finished in {:.2}ms: {} records, {} duplicates removed",
            start.elapsed().as_secs_f64() * 1000.0,
            dataset.len(),
            dedup.removed_count
        );

        Ok(ReconcileOutcome {
            dataset,
            report,
            dedup,
            schema: vec![baseline.summary, incoming.summary],
        })
    }

    /// Canonicalize, dedup and merge records that already went through the
    /// schema step.
    pub fn reconcile_records(
        &self,
        baseline: Vec<EvaluationRecord>,
        incoming: Vec<EvaluationRecord>,
    ) -> Result<(MergedDataset, DedupSummary)> {
        let baseline = self.canonicalizer.canonicalize_batch(baseline);
        let incoming = self.canonicalizer.canonicalize_batch(incoming);

        let dedup = self.deduplicator.filter_incoming(&baseline, incoming);
        let dataset = self.merger.merge(baseline, dedup.survivors)?;
        Ok((dataset, dedup.summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Provenance;
    use crate::error::ReconcileError;
    use serde_json::{json, Map, Value};

    fn batch(values: Value) -> RawBatch {
        RawBatch::from_rows(
            values
                .as_array()
                .unwrap()
                .iter()
                .map(|v| v.as_object().unwrap().clone())
                .collect::<Vec<Map<String, Value>>>(),
        )
    }

    fn reconciler() -> Reconciler {
        let mut config = ReconcileConfig::default();
        config
            .category_map
            .insert("EPA03.Immunization".to_string(), "03 Immunization".to_string());
        config
            .category_map
            .insert("EPA05.Checkup".to_string(), "05 Checkup".to_string());
        Reconciler::new(config).unwrap()
    }

    #[test]
    fn test_run_merges_and_reports() {
        let baseline = batch(json!([
            {"learner_name": "A", "category": "03 Immunization", "evaluation_date": "2025-01-15", "subject_id": "P1"}
        ]));
        let incoming = batch(json!([
            {"learner_name": "A", "category": "EPA03.Immunization", "evaluation_date": "2025-01-15", "subject_id": "P1"},
            {"learner_name": "B", "category": "EPA05.Checkup", "evaluation_date": "2025-02-01", "subject_id": "P2"}
        ]));

        let outcome = reconciler().run(&baseline, &incoming).unwrap();
        assert_eq!(outcome.dataset.len(), 2);
        assert_eq!(outcome.dedup.removed_count, 1);
        assert_eq!(outcome.report.removed_duplicates, 1);
        assert_eq!(outcome.report.records_by_provenance[&Provenance::HistoricalImport], 1);
        assert_eq!(outcome.schema.len(), 2);
        assert_eq!(outcome.schema[0].batch, "current");
        assert!(outcome.schema[1].missing_columns.contains(&"subject_name".to_string()));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = ReconcileConfig::default();
        config.identity_fields.clear();
        assert!(matches!(Reconciler::new(config), Err(ReconcileError::Config(_))));
    }

    #[test]
    fn test_integrity_violation_surfaces_as_error() {
        // A baseline row tagged historical collides with a current one
        let baseline = batch(json!([
            {"learner_name": "A", "subject_id": "P1"},
            {"learner_name": "A", "subject_id": "P1", "provenance": "HISTORICAL_IMPORT"}
        ]));
        let result = reconciler().run(&baseline, &RawBatch::default());
        assert!(matches!(result, Err(ReconcileError::IntegrityViolation(_))));
    }
}
