use async_trait::async_trait;

use crate::domain::RawBatch;
use crate::pipeline::processing::merge::MergedDataset;
use crate::pipeline::ReconcileOutcome;

/// Supplies one raw batch. Acquisition (files, workbooks, remote fetch) lives
/// behind this port.
#[async_trait]
pub trait BatchSourcePort: Send + Sync {
    /// Human-readable name of where the batch comes from
    fn describe(&self) -> String;

    async fn load_batch(&self) -> anyhow::Result<RawBatch>;
}

/// Receives the canonical output of a run.
#[async_trait]
pub trait ReconcileOutputPort: Send + Sync {
    async fn write_dataset(&self, dataset: &MergedDataset) -> anyhow::Result<()>;

    async fn write_report(&self, outcome: &ReconcileOutcome) -> anyhow::Result<()>;
}
