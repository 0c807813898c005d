use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::app::ports::BatchSourcePort;
use crate::domain::RawBatch;

/// The two JSON layouts a batch file may use.
#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    /// Explicit header plus rows
    Columnar(RawBatch),
    /// Bare array of row objects; header inferred from the rows
    Rows(Vec<Map<String, Value>>),
}

/// Reads a batch from a JSON file on disk.
pub struct JsonBatchFileAdapter {
    pub path: PathBuf,
}

impl JsonBatchFileAdapter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse a batch from JSON text.
    pub fn parse(content: &str) -> anyhow::Result<RawBatch> {
        let batch = match serde_json::from_str::<BatchFile>(content)
            .context("Batch file must be an array of row objects or {\"columns\", \"rows\"}")?
        {
            BatchFile::Columnar(batch) => batch,
            BatchFile::Rows(rows) => RawBatch::from_rows(rows),
        };
        Ok(batch)
    }
}

#[async_trait]
impl BatchSourcePort for JsonBatchFileAdapter {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn load_batch(&self) -> anyhow::Result<RawBatch> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read batch file {:?}", self.path))?;
        let batch = Self::parse(&content).with_context(|| format!("Invalid batch file {:?}", self.path))?;
        debug!(
            "Read {} rows and {} columns from {:?}",
            batch.len(),
            batch.columns.len(),
            self.path
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_row_array() {
        let batch = JsonBatchFileAdapter::parse(r#"[{"learner": "A"}, {"learner": "B", "epa": "01"}]"#).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.has_column("epa"));
    }

    #[test]
    fn test_parse_columnar_keeps_declared_header() {
        let batch = JsonBatchFileAdapter::parse(
            r#"{"columns": ["learner", "date"], "rows": [{"learner": "A"}]}"#,
        )
        .unwrap();
        assert_eq!(batch.columns, vec!["learner".to_string(), "date".to_string()]);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        assert!(JsonBatchFileAdapter::parse(r#""just a string""#).is_err());
        assert!(JsonBatchFileAdapter::parse(r#"[1, 2, 3]"#).is_err());
    }

    #[tokio::test]
    async fn test_load_batch_from_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("current.json");
        std::fs::write(&path, r#"[{"learner_name": "A"}]"#).unwrap();

        let adapter = JsonBatchFileAdapter::new(&path);
        let batch = adapter.load_batch().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(adapter.describe(), path.display().to_string());
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let adapter = JsonBatchFileAdapter::new("/nonexistent/batch.json");
        assert!(adapter.load_batch().await.is_err());
    }
}
