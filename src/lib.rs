pub mod config;
pub mod constants;
pub mod domain;
pub mod error;
pub mod observability;
pub mod pipeline;

// Application use cases and the adapters that feed them
pub mod app;
pub mod infra;

pub use config::ReconcileConfig;
pub use domain::{EvaluationRecord, IdentityField, Provenance, RawBatch};
pub use error::{ReconcileError, Result};
pub use pipeline::{ReconcileOutcome, Reconciler};
