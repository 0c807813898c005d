use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use epa_reconcile::app::reconcile_use_case::ReconcileUseCase;
use epa_reconcile::infra::batch_file_adapter::JsonBatchFileAdapter;
use epa_reconcile::infra::reconcile_output_adapter::NdjsonOutputAdapter;
use epa_reconcile::{EvaluationRecord, Provenance, ReconcileConfig, Reconciler};
use serde_json::Value;
use tempfile::tempdir;

fn sample_config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/reconcile.toml")
}

#[test]
fn test_sample_config_is_valid() {
    let config = ReconcileConfig::load(sample_config_path()).unwrap();
    assert_eq!(config.identity_fields.len(), 5);
    assert_eq!(
        config.category_map.get("EPA03.Immunization").map(String::as_str),
        Some("03 Immunization")
    );
    assert!(config.canonical_vocabulary().contains("05 Checkup"));
    assert_eq!(config.columns.evaluation_date.last().map(String::as_str), Some("Date of Evaluation"));
}

#[tokio::test]
async fn test_reconcile_files_end_to_end() -> Result<()> {
    let dir = tempdir()?;
    let baseline_path = dir.path().join("current.json");
    let incoming_path = dir.path().join("historical.json");
    let output_dir = dir.path().join("out");

    std::fs::write(
        &baseline_path,
        r#"[
            {"learner_name": "A", "category": "03 Immunization", "evaluation_date": "2025-01-15",
             "subject_id": "P1", "subject_name": null, "reliability_label": "Trust with direct supervision"}
        ]"#,
    )?;
    // Legacy export: columnar layout, different headers, no subject_name column
    std::fs::write(
        &incoming_path,
        r#"{
            "columns": ["Resident Name", "EPA", "Date of Evaluation", "patient_id", "entrustment"],
            "rows": [
                {"Resident Name": "A", "EPA": "EPA03.Immunization", "Date of Evaluation": 45672,
                 "patient_id": "P1", "entrustment": "Trust to perform independently"},
                {"Resident Name": "B", "EPA": "EPA05.Checkup", "Date of Evaluation": "02/01/2025",
                 "patient_id": "P2", "entrustment": "Somewhat trusted"}
            ]
        }"#,
    )?;

    let config = ReconcileConfig::load(sample_config_path())?;
    let reconciler = Arc::new(Reconciler::new(config)?);
    let output = Arc::new(NdjsonOutputAdapter::new(&output_dir));

    let use_case = ReconcileUseCase::new(
        reconciler,
        Box::new(JsonBatchFileAdapter::new(&baseline_path)),
        Box::new(JsonBatchFileAdapter::new(&incoming_path)),
        output.clone(),
    );
    let outcome = use_case.execute().await?;

    assert_eq!(outcome.dataset.len(), 2);
    assert_eq!(outcome.dedup.removed_count, 1);
    assert_eq!(outcome.schema[1].missing_columns, vec!["subject_name".to_string()]);

    // Merged records, one per line, in merge order
    let ndjson = std::fs::read_to_string(output.dataset_path())?;
    let records: Vec<EvaluationRecord> = ndjson
        .lines()
        .map(serde_json::from_str::<EvaluationRecord>)
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].provenance, Some(Provenance::CurrentSystem));
    assert_eq!(records[1].provenance, Some(Provenance::HistoricalImport));
    assert_eq!(records[1].category_canonical.as_deref(), Some("05 Checkup"));
    assert_eq!(records[1].reliability_score, None);

    let report: Value = serde_json::from_str(&std::fs::read_to_string(output.report_path())?)?;
    assert_eq!(report["report"]["total_records"], 2);
    assert_eq!(report["report"]["removed_duplicates"], 1);
    assert_eq!(report["report"]["records_by_provenance"]["HISTORICAL_IMPORT"], 1);
    assert_eq!(report["report"]["unmapped_reliability_labels"]["Somewhat trusted"], 1);
    assert_eq!(report["report"]["scores"]["unscored"], 1);
    assert_eq!(report["dedup"]["removed_count"], 1);
    assert_eq!(report["schema"][1]["batch"], "historical");

    Ok(())
}

#[tokio::test]
async fn test_rerun_overwrites_previous_output() -> Result<()> {
    let dir = tempdir()?;
    let baseline_path = dir.path().join("current.json");
    let incoming_path = dir.path().join("historical.json");
    std::fs::write(&baseline_path, r#"[{"learner_name": "A", "subject_id": "P1"}]"#)?;
    std::fs::write(&incoming_path, r#"[{"learner_name": "B", "subject_id": "P2"}]"#)?;

    let reconciler = Arc::new(Reconciler::new(ReconcileConfig::default())?);
    let output = Arc::new(NdjsonOutputAdapter::new(dir.path().join("out")));

    for _ in 0..2 {
        ReconcileUseCase::new(
            Arc::clone(&reconciler),
            Box::new(JsonBatchFileAdapter::new(&baseline_path)),
            Box::new(JsonBatchFileAdapter::new(&incoming_path)),
            output.clone(),
        )
        .execute()
        .await?;
    }

    let ndjson = std::fs::read_to_string(output.dataset_path())?;
    assert_eq!(ndjson.lines().count(), 2);
    Ok(())
}
