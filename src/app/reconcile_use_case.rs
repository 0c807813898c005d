use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::app::ports::{BatchSourcePort, ReconcileOutputPort};
use crate::error::ReconcileError;
use crate::observability::metrics;
use crate::pipeline::{ReconcileOutcome, Reconciler};

/// Loads both batches, reconciles them and hands the result to the output port.
pub struct ReconcileUseCase {
    reconciler: Arc<Reconciler>,
    baseline: Box<dyn BatchSourcePort>,
    incoming: Box<dyn BatchSourcePort>,
    output: Arc<dyn ReconcileOutputPort>,
}

impl ReconcileUseCase {
    pub fn new(
        reconciler: Arc<Reconciler>,
        baseline: Box<dyn BatchSourcePort>,
        incoming: Box<dyn BatchSourcePort>,
        output: Arc<dyn ReconcileOutputPort>,
    ) -> Self {
        Self {
            reconciler,
            baseline,
            incoming,
            output,
        }
    }

    pub async fn execute(&self) -> Result<ReconcileOutcome> {
        let start_time = Instant::now();

        let (baseline, incoming) = tokio::try_join!(
            async {
                self.baseline
                    .load_batch()
                    .await
                    .with_context(|| format!("Failed to load baseline batch from {}", self.baseline.describe()))
            },
            async {
                self.incoming
                    .load_batch()
                    .await
                    .with_context(|| format!("Failed to load incoming batch from {}", self.incoming.describe()))
            },
        )?;

        info!(
            "Loaded baseline ({} rows) from {} and incoming ({} rows) from {}",
            baseline.len(),
            self.baseline.describe(),
            incoming.len(),
            self.incoming.describe()
        );

        // Rayon does the per-record work; keep it off the async workers
        let reconciler = Arc::clone(&self.reconciler);
        let (result, run_duration) = tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let result = reconciler.run(&baseline, &incoming);
            (result, started.elapsed())
        })
        .await
        .context("Reconciliation task panicked")?;
        metrics::merge::run_duration(run_duration.as_secs_f64());

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(ReconcileError::IntegrityViolation(violations)) => {
                error!(
                    "Merge rejected: {} identity key(s) mix current-system and other records",
                    violations.len()
                );
                metrics::merge::integrity_violations(violations.len());
                return Err(ReconcileError::IntegrityViolation(violations).into());
            }
            Err(e) => return Err(e.into()),
        };

        self.emit_outcome_metrics(&outcome);

        self.output
            .write_dataset(&outcome.dataset)
            .await
            .context("Failed to write merged dataset")?;
        self.output
            .write_report(&outcome)
            .await
            .context("Failed to write reconciliation report")?;

        info!(
            "Reconcile use case completed in {:.2}ms (engine {:.2}ms)",
            start_time.elapsed().as_secs_f64() * 1000.0,
            run_duration.as_secs_f64() * 1000.0
        );

        Ok(outcome)
    }

    fn emit_outcome_metrics(&self, outcome: &ReconcileOutcome) {
        for (summary, label) in outcome.schema.iter().zip(["baseline", "incoming"]) {
            metrics::schema::rows_normalized(label, summary.rows);
            metrics::schema::missing_columns(label, summary.missing_columns.len());
            metrics::schema::unparseable_dates(label, summary.unparseable_dates);
        }

        let report = &outcome.report;
        metrics::canonicalize::unmapped_categories(report.unmapped_categories.values().sum());
        metrics::canonicalize::unmapped_scores(report.unmapped_reliability_labels.values().sum());

        metrics::dedup::incoming_records(outcome.dedup.incoming_count);
        metrics::dedup::records_removed(outcome.dedup.removed_count);
        metrics::dedup::records_surviving(outcome.dedup.surviving_count);

        metrics::merge::records_output(outcome.dataset.len());

        metrics::report::unscored_records(report.scores.unscored);
        if let Some(mean) = report.scores.mean {
            metrics::report::mean_score(mean);
        }

        if report.duplicate_key_groups > 0 {
            warn!(
                "{} identity key(s) repeat within a single source",
                report.duplicate_key_groups
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconcileConfig;
    use crate::domain::RawBatch;
    use crate::pipeline::processing::merge::MergedDataset;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct StaticSource(RawBatch);

    #[async_trait]
    impl BatchSourcePort for StaticSource {
        fn describe(&self) -> String {
            "static".to_string()
        }

        async fn load_batch(&self) -> Result<RawBatch> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl BatchSourcePort for FailingSource {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        async fn load_batch(&self) -> Result<RawBatch> {
            anyhow::bail!("sheet not found")
        }
    }

    #[derive(Default)]
    struct RecordingOutput {
        datasets: Mutex<Vec<usize>>,
        reports: Mutex<usize>,
    }

    #[async_trait]
    impl ReconcileOutputPort for RecordingOutput {
        async fn write_dataset(&self, dataset: &MergedDataset) -> Result<()> {
            self.datasets.lock().unwrap().push(dataset.len());
            Ok(())
        }

        async fn write_report(&self, _outcome: &ReconcileOutcome) -> Result<()> {
            *self.reports.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn source(value: serde_json::Value) -> Box<dyn BatchSourcePort> {
        let rows = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        Box::new(StaticSource(RawBatch::from_rows(rows)))
    }

    fn reconciler() -> Arc<Reconciler> {
        Arc::new(Reconciler::new(ReconcileConfig::default()).unwrap())
    }

    #[tokio::test]
    async fn test_execute_writes_outputs() {
        let output = Arc::new(RecordingOutput::default());
        let use_case = ReconcileUseCase::new(
            reconciler(),
            source(json!([{"learner_name": "A", "subject_id": "P1"}])),
            source(json!([{"learner_name": "A", "subject_id": "P1"}, {"learner_name": "B", "subject_id": "P2"}])),
            output.clone(),
        );

        let outcome = use_case.execute().await.unwrap();
        assert_eq!(outcome.dataset.len(), 2);
        assert_eq!(*output.datasets.lock().unwrap(), vec![2]);
        assert_eq!(*output.reports.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_source_failure_is_reported_with_context() {
        let output = Arc::new(RecordingOutput::default());
        let use_case = ReconcileUseCase::new(
            reconciler(),
            source(json!([])),
            Box::new(FailingSource),
            output.clone(),
        );

        let err = use_case.execute().await.unwrap_err();
        assert!(format!("{:#}", err).contains("incoming batch from failing"));
        assert!(output.datasets.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_integrity_violation_blocks_output() {
        let output = Arc::new(RecordingOutput::default());
        let use_case = ReconcileUseCase::new(
            reconciler(),
            source(json!([
                {"learner_name": "A", "subject_id": "P1", "provenance": "CURRENT_SYSTEM"},
                {"learner_name": "A", "subject_id": "P1", "provenance": "HISTORICAL_IMPORT"}
            ])),
            source(json!([])),
            output.clone(),
        );

        let err = use_case.execute().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReconcileError>(),
            Some(ReconcileError::IntegrityViolation(_))
        ));
        assert!(output.datasets.lock().unwrap().is_empty());
        assert_eq!(*output.reports.lock().unwrap(), 0);
    }
}
