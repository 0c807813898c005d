//! Metrics for the reconciliation pipeline.
//!
//! Every metric name lives in [`MetricName`] so that no stage records through
//! a magic string. Recording goes through the `metrics` facade; without an
//! installed recorder all calls are no-ops, which is what library users and
//! tests get by default.

use std::fmt;
use std::sync::OnceLock;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Schema metrics
    SchemaRowsNormalized,
    SchemaMissingColumns,
    SchemaUnparseableDates,

    // Canonicalize metrics
    CanonicalizeUnmappedCategories,
    CanonicalizeUnmappedScores,

    // Dedup metrics
    DedupIncomingRecords,
    DedupRecordsRemoved,
    DedupRecordsSurviving,

    // Merge metrics
    MergeRecordsOutput,
    MergeIntegrityViolations,
    ReconcileRunDuration,

    // Report metrics
    ReportUnscoredRecords,
    ReportMeanScore,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::SchemaRowsNormalized => "epa_schema_rows_normalized_total",
            MetricName::SchemaMissingColumns => "epa_schema_missing_columns_total",
            MetricName::SchemaUnparseableDates => "epa_schema_unparseable_dates_total",

            MetricName::CanonicalizeUnmappedCategories => "epa_canonicalize_unmapped_categories_total",
            MetricName::CanonicalizeUnmappedScores => "epa_canonicalize_unmapped_scores_total",

            MetricName::DedupIncomingRecords => "epa_dedup_incoming_records_total",
            MetricName::DedupRecordsRemoved => "epa_dedup_records_removed_total",
            MetricName::DedupRecordsSurviving => "epa_dedup_records_surviving_total",

            MetricName::MergeRecordsOutput => "epa_merge_records_output_total",
            MetricName::MergeIntegrityViolations => "epa_merge_integrity_violations_total",
            MetricName::ReconcileRunDuration => "epa_reconcile_run_duration_seconds",

            MetricName::ReportUnscoredRecords => "epa_report_unscored_records",
            MetricName::ReportMeanScore => "epa_report_mean_score",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            SchemaRowsNormalized,
            SchemaMissingColumns,
            SchemaUnparseableDates,
            CanonicalizeUnmappedCategories,
            CanonicalizeUnmappedScores,
            DedupIncomingRecords,
            DedupRecordsRemoved,
            DedupRecordsSurviving,
            MergeRecordsOutput,
            MergeIntegrityViolations,
            ReconcileRunDuration,
            ReportUnscoredRecords,
            ReportMeanScore,
        ]
        .into_iter()
    }

    /// Returns (phase, description, unit)
    pub fn metadata(&self) -> (&'static str, &'static str, Option<&'static str>) {
        match self {
            MetricName::SchemaRowsNormalized => ("schema", "Rows converted into evaluation records", None),
            MetricName::SchemaMissingColumns => ("schema", "Required columns synthesized as null", None),
            MetricName::SchemaUnparseableDates => ("schema", "Date cells that could not be parsed", None),

            MetricName::CanonicalizeUnmappedCategories => ("canonicalize", "Category labels with no mapping", None),
            MetricName::CanonicalizeUnmappedScores => ("canonicalize", "Reliability labels with no mapping", None),

            MetricName::DedupIncomingRecords => ("dedup", "Incoming records checked against baseline", None),
            MetricName::DedupRecordsRemoved => ("dedup", "Incoming records dropped as duplicates", None),
            MetricName::DedupRecordsSurviving => ("dedup", "Incoming records kept", None),

            MetricName::MergeRecordsOutput => ("merge", "Records in the merged dataset", None),
            MetricName::MergeIntegrityViolations => ("merge", "Identity keys failing the provenance invariant", None),
            MetricName::ReconcileRunDuration => ("merge", "Engine run time over both batches, batch I/O excluded", Some("s")),

            MetricName::ReportUnscoredRecords => ("report", "Merged records without a score", None),
            MetricName::ReportMeanScore => ("report", "Mean reliability score", None),
        }
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE.set(handle).ok();
    info!("Metrics system initialized");
    Ok(())
}

/// Render the current metrics in Prometheus exposition format.
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Schema Metrics
// ============================================================================

pub mod schema {
    use super::MetricName;

    pub fn rows_normalized(batch: &'static str, count: usize) {
        ::metrics::counter!(MetricName::SchemaRowsNormalized.as_str(), "batch" => batch)
            .increment(count as u64);
    }

    pub fn missing_columns(batch: &'static str, count: usize) {
        ::metrics::counter!(MetricName::SchemaMissingColumns.as_str(), "batch" => batch)
            .increment(count as u64);
    }

    pub fn unparseable_dates(batch: &'static str, count: usize) {
        ::metrics::counter!(MetricName::SchemaUnparseableDates.as_str(), "batch" => batch)
            .increment(count as u64);
    }
}

// ============================================================================
// Canonicalize Metrics
// ============================================================================

pub mod canonicalize {
    use super::MetricName;

    pub fn unmapped_categories(count: usize) {
        ::metrics::counter!(MetricName::CanonicalizeUnmappedCategories.as_str()).increment(count as u64);
    }

    pub fn unmapped_scores(count: usize) {
        ::metrics::counter!(MetricName::CanonicalizeUnmappedScores.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Dedup Metrics
// ============================================================================

pub mod dedup {
    use super::MetricName;

    pub fn incoming_records(count: usize) {
        ::metrics::counter!(MetricName::DedupIncomingRecords.as_str()).increment(count as u64);
    }

    pub fn records_removed(count: usize) {
        ::metrics::counter!(MetricName::DedupRecordsRemoved.as_str()).increment(count as u64);
    }

    pub fn records_surviving(count: usize) {
        ::metrics::counter!(MetricName::DedupRecordsSurviving.as_str()).increment(count as u64);
    }
}

// ============================================================================
// Merge Metrics
// ============================================================================

pub mod merge {
    use super::MetricName;

    pub fn records_output(count: usize) {
        ::metrics::counter!(MetricName::MergeRecordsOutput.as_str()).increment(count as u64);
    }

    pub fn integrity_violations(count: usize) {
        ::metrics::counter!(MetricName::MergeIntegrityViolations.as_str()).increment(count as u64);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::ReconcileRunDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Report Metrics
// ============================================================================

pub mod report {
    use super::MetricName;

    pub fn unscored_records(count: usize) {
        ::metrics::gauge!(MetricName::ReportUnscoredRecords.as_str()).set(count as f64);
    }

    pub fn mean_score(mean: f64) {
        ::metrics::gauge!(MetricName::ReportMeanScore.as_str()).set(mean);
    }
}
