//! MTENC - Multi-Threaded ENCode bench
//!
//! Runs the same set of independent compression jobs once sequentially and
//! once on a pool of worker threads, then infers from the speedup ratio
//! whether the host scales across physical cores, hyper-threads, or neither.

use thiserror::Error;

pub mod bench;
pub mod codec;
pub mod config;
pub mod data;
pub mod models;
pub mod report;
pub mod util;

/// Crate-level errors. Task-local failures live in [`bench::TaskError`] and never
/// surface here.
#[derive(Debug, Error)]
pub enum MtEncError {
    /// I/O operation outside of a worker task failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration validation or parsing error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Results persistence error
    #[error("Results persistence error: {0}")]
    Persistence(String),
    /// Test file could not be produced
    #[error("Test data generation error: {0}")]
    DataGeneration(String),
    /// The OS refused to spawn a worker thread
    #[error("Error at creation of worker {worker}: {source}")]
    ThreadCreation {
        worker: usize,
        #[source]
        source: std::io::Error,
    },
    /// Scheduler bookkeeping failed
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl MtEncError {
    /// Whether the error must terminate the process instead of being reported.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MtEncError::ThreadCreation { .. })
    }
}

impl From<serde_json::Error> for MtEncError {
    fn from(err: serde_json::Error) -> Self {
        MtEncError::Persistence(format!("JSON serialization error: {}", err))
    }
}

/// Result type alias for MTENC operations
pub type Result<T> = std::result::Result<T, MtEncError>;

// Common types and constants
pub const APP_NAME: &str = "mtenc";
pub const CONFIG_FILE: &str = "mtenc.toml";
pub const RESULTS_FILE: &str = "results.json";
pub const TEST_FILE_NAME: &str = "TestFile.bin";
pub const OUTPUT_EXTENSION: &str = "enc";
pub const MAX_RESULTS_HISTORY: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_creation_is_fatal() {
        let err = MtEncError::ThreadCreation {
            worker: 2,
            source: std::io::Error::new(std::io::ErrorKind::WouldBlock, "no threads left"),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("worker 2"));

        assert!(!MtEncError::Config("bad".to_string()).is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: MtEncError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, MtEncError::Io(_)));
        assert!(!err.is_fatal());
    }
}
