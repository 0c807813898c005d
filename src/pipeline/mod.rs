// Reconciliation pipeline: processing stages and the engine that runs them

pub mod processing;
pub mod reconciler;

pub use reconciler::{ReconcileOutcome, Reconciler};
