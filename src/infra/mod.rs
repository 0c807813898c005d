pub mod batch_file_adapter;
pub mod reconcile_output_adapter;
