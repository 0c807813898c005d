use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::app::ports::ReconcileOutputPort;
use crate::pipeline::processing::dedup::DedupSummary;
use crate::pipeline::processing::merge::MergedDataset;
use crate::pipeline::processing::report::ReconcileReport;
use crate::pipeline::processing::schema::BatchSchemaSummary;
use crate::pipeline::ReconcileOutcome;

pub const DATASET_FILE_NAME: &str = "merged.ndjson";
pub const REPORT_FILE_NAME: &str = "report.json";

/// Review summary; the dataset goes to its own file.
#[derive(Serialize)]
struct ReportFile<'a> {
    report: &'a ReconcileReport,
    dedup: &'a DedupSummary,
    schema: &'a [BatchSchemaSummary],
}

/// Writes the merged dataset as NDJSON and the run summary as pretty JSON
/// into one output directory. Each run replaces the previous files.
pub struct NdjsonOutputAdapter {
    pub output_dir: PathBuf,
}

impl NdjsonOutputAdapter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.output_dir.join(DATASET_FILE_NAME)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(REPORT_FILE_NAME)
    }

    async fn ensure_output_directory(&self) -> anyhow::Result<()> {
        if !self.output_dir.exists() {
            tokio::fs::create_dir_all(&self.output_dir)
                .await
                .with_context(|| format!("Failed to create output directory {:?}", self.output_dir))?;
            debug!("Created output directory: {:?}", self.output_dir);
        }
        Ok(())
    }

    async fn write_file(path: &Path, content: &[u8]) -> anyhow::Result<()> {
        let mut file = File::create(path)
            .await
            .with_context(|| format!("Failed to open output file {:?}", path))?;
        file.write_all(content)
            .await
            .with_context(|| format!("Failed to write to output file {:?}", path))?;
        file.flush()
            .await
            .with_context(|| format!("Failed to flush output file {:?}", path))?;
        Ok(())
    }
}

#[async_trait]
impl ReconcileOutputPort for NdjsonOutputAdapter {
    async fn write_dataset(&self, dataset: &MergedDataset) -> anyhow::Result<()> {
        self.ensure_output_directory().await?;

        let mut buffer = Vec::new();
        for record in dataset.iter() {
            serde_json::to_writer(&mut buffer, record).context("Failed to serialize merged record")?;
            buffer.push(b'\n');
        }

        let path = self.dataset_path();
        Self::write_file(&path, &buffer).await?;
        debug!("Wrote {} merged records to {:?}", dataset.len(), path);
        Ok(())
    }

    async fn write_report(&self, outcome: &ReconcileOutcome) -> anyhow::Result<()> {
        self.ensure_output_directory().await?;

        let summary = ReportFile {
            report: &outcome.report,
            dedup: &outcome.dedup,
            schema: &outcome.schema,
        };
        let content = serde_json::to_vec_pretty(&summary).context("Failed to serialize report")?;

        let path = self.report_path();
        Self::write_file(&path, &content).await?;
        debug!("Wrote reconciliation report to {:?}", path);
        Ok(())
    }
}
