use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::error;

use epa_reconcile::app::reconcile_use_case::ReconcileUseCase;
use epa_reconcile::infra::batch_file_adapter::JsonBatchFileAdapter;
use epa_reconcile::infra::reconcile_output_adapter::NdjsonOutputAdapter;
use epa_reconcile::observability;
use epa_reconcile::{ReconcileConfig, ReconcileError, ReconcileOutcome, Reconciler};

#[derive(Parser)]
#[command(name = "epa_reconcile")]
#[command(about = "Merge current-system and historical evaluation records into one canonical dataset")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a baseline batch with an incoming batch
    Run {
        /// JSON batch from the live entry system (authoritative)
        #[arg(long)]
        baseline: PathBuf,
        /// JSON batch from the legacy export
        #[arg(long)]
        incoming: PathBuf,
        /// TOML mapping and identity configuration
        #[arg(long)]
        config: Option<PathBuf>,
        /// Directory for merged.ndjson and report.json
        #[arg(long, default_value = "output")]
        output: PathBuf,
        /// Print Prometheus metrics after the run
        #[arg(long)]
        metrics: bool,
    },
    /// Validate a configuration file without running
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<ReconcileConfig> {
    match path {
        Some(path) => ReconcileConfig::load(path)
            .with_context(|| format!("Invalid configuration {}", path.display())),
        None => Ok(ReconcileConfig::default()),
    }
}

fn print_review(outcome: &ReconcileOutcome) {
    let report = &outcome.report;

    println!("\n📊 Reconciliation results:");
    println!("   Merged records: {}", report.total_records);
    for (provenance, count) in &report.records_by_provenance {
        println!("   {}: {}", provenance, count);
    }
    println!("   Distinct learners: {}", report.distinct_learners);
    println!(
        "   Duplicates removed: {} of {} incoming",
        report.removed_duplicates, outcome.dedup.incoming_count
    );
    if let Some(mean) = report.scores.mean {
        println!(
            "   Reliability: mean {:.2}, median {:.1}, unscored {}",
            mean,
            report.scores.median.unwrap_or_default(),
            report.scores.unscored
        );
    }
    println!("   Fingerprint: {}", report.dataset_fingerprint);

    for summary in &outcome.schema {
        if !summary.missing_columns.is_empty() {
            println!(
                "\n⚠️  Batch '{}' is missing columns: {}",
                summary.batch,
                summary.missing_columns.join(", ")
            );
        }
    }

    if !outcome.dedup.removed_sample.is_empty() {
        println!("\n🔍 Sample of removed duplicates:");
        for key in &outcome.dedup.removed_sample {
            println!("   - {}", key);
        }
    }

    if !report.unmapped_categories.is_empty() {
        println!("\n⚠️  Unmapped category labels:");
        for (label, count) in &report.unmapped_categories {
            println!("   - {:?} ({})", label, count);
        }
    }
    if !report.unmapped_reliability_labels.is_empty() {
        println!("\n⚠️  Unmapped reliability labels:");
        for (label, count) in &report.unmapped_reliability_labels {
            println!("   - {:?} ({})", label, count);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    observability::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            baseline,
            incoming,
            config,
            output,
            metrics,
        } => {
            if metrics {
                observability::metrics::init()
                    .map_err(|e| anyhow::anyhow!("Failed to initialize metrics: {}", e))?;
            }

            let config = load_config(config.as_ref())?;
            let reconciler = Arc::new(Reconciler::new(config)?);
            let adapter = Arc::new(NdjsonOutputAdapter::new(&output));

            let use_case = ReconcileUseCase::new(
                reconciler,
                Box::new(JsonBatchFileAdapter::new(baseline)),
                Box::new(JsonBatchFileAdapter::new(incoming)),
                adapter.clone(),
            );

            println!("🔄 Reconciling evaluation batches...");
            match use_case.execute().await {
                Ok(outcome) => {
                    print_review(&outcome);
                    println!("\n✅ Wrote {}", adapter.dataset_path().display());
                    println!("✅ Wrote {}", adapter.report_path().display());
                }
                Err(e) => {
                    if let Some(ReconcileError::IntegrityViolation(violations)) =
                        e.downcast_ref::<ReconcileError>()
                    {
                        println!("\n❌ Merge rejected, integrity check failed:");
                        for v in violations {
                            println!("   - {}", v);
                        }
                    }
                    error!("Reconciliation failed: {:#}", e);
                    return Err(e);
                }
            }

            if metrics {
                if let Some(rendered) = observability::metrics::render() {
                    println!("\n{}", rendered);
                }
            }
        }
        Commands::CheckConfig { config } => {
            let config = load_config(Some(&config))?;
            println!(
                "✅ Configuration OK: {} category variants -> {} canonical categories, {} reliability labels, identity [{}]",
                config.category_map.len(),
                config.canonical_vocabulary().len(),
                config.score_map.len(),
                config
                    .identity_fields
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    Ok(())
}
