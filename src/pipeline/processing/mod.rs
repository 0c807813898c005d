// Pipeline processing stages, in run order

pub mod schema;
pub mod canonicalize;
pub mod identity;
pub mod dedup;
pub mod merge;
pub mod report;
