//! Data models module
//!
//! Persisted benchmark summaries and the per-run and per-task records they hold.

pub mod result;

// Re-export commonly used types
pub use result::{BenchmarkSummary, RunSummary, SystemInfo, TaskRecord};
