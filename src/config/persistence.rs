//! Results persistence module
//!
//! Keeps a rotating JSON history of benchmark summaries.

use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::debug;
use crate::{MtEncError, Result, APP_NAME, RESULTS_FILE, MAX_RESULTS_HISTORY};
use crate::models::result::BenchmarkSummary;

/// Results storage manager
#[derive(Debug)]
pub struct ResultsStorage {
    results_path: PathBuf,
}

/// Results file structure for JSON persistence
#[derive(Debug, Serialize, Deserialize)]
struct ResultsFile {
    version: u32,
    results: Vec<BenchmarkSummary>,
}

impl ResultsStorage {
    /// Storage at the standard results file path
    pub fn new() -> Result<Self> {
        Ok(Self::with_path(Self::results_file_path()?))
    }

    /// Storage at an explicit path
    pub fn with_path(results_path: impl Into<PathBuf>) -> Self {
        Self { results_path: results_path.into() }
    }

    /// `$DATA_HOME/mtenc/results.json`
    pub fn results_file_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| MtEncError::Persistence(
                "Unable to determine data directory".to_string()
            ))?;

        Ok(data_dir.join(APP_NAME).join(RESULTS_FILE))
    }

    /// Load all results; a missing file is an empty history
    pub fn load_results(&self) -> Result<Vec<BenchmarkSummary>> {
        if !self.results_path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.results_path)
            .map_err(|e| MtEncError::Persistence(
                format!("Failed to read results file {}: {}", self.results_path.display(), e)
            ))?;

        let results_file: ResultsFile = serde_json::from_str(&content)
            .map_err(|e| MtEncError::Persistence(
                format!("Failed to parse results file {}: {}", self.results_path.display(), e)
            ))?;

        Ok(results_file.results)
    }

    /// Append a summary, dropping the oldest entries beyond MAX_RESULTS_HISTORY
    pub fn append_result(&self, result: BenchmarkSummary) -> Result<()> {
        let mut results = self.load_results()?;
        results.push(result);

        if results.len() > MAX_RESULTS_HISTORY {
            let excess = results.len() - MAX_RESULTS_HISTORY;
            results.drain(..excess);
        }

        debug!(
            path = %self.results_path.display(),
            entries = results.len(),
            "saving results history"
        );
        self.save_results(results)
    }

    fn save_results(&self, results: Vec<BenchmarkSummary>) -> Result<()> {
        if let Some(parent) = self.results_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| MtEncError::Persistence(
                    format!("Failed to create results directory {}: {}", parent.display(), e)
                ))?;
        }

        let content = serde_json::to_string_pretty(&ResultsFile { version: 1, results })?;

        fs::write(&self.results_path, content)
            .map_err(|e| MtEncError::Persistence(
                format!("Failed to write results file {}: {}", self.results_path.display(), e)
            ))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.results_path
    }
}
