//! Configuration management module
//!
//! Holds the fixed benchmark parameters, their validation, and optional
//! loading/saving from the user's config directory.

use std::fs;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};
use crate::{MtEncError, Result, APP_NAME, CONFIG_FILE, TEST_FILE_NAME};

pub mod persistence;

pub use persistence::ResultsStorage;

/// Benchmark configuration structure containing all run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Directory holding the test file and the encoded outputs
    pub work_dir: PathBuf,
    /// File name of the synthetic input; its first four characters prefix outputs
    pub test_file_name: String,
    /// Size of the synthetic input (in bytes)
    pub file_size: u64,
    /// Seed for the synthetic data generator
    pub seed: u64,
    /// Number of encode tasks per run
    pub task_count: usize,
    /// Worker threads for the concurrent run (0 = one per task)
    pub pool_size: usize,
    /// Upper bound on worker threads
    pub max_pool_size: usize,
    /// Codec compression level
    pub compression_level: u32,
    /// Memory reserved per codec session (in MiB)
    pub allocator_mb: u32,
    /// Whether the codec reports progress during encode calls
    pub report_progress: bool,
    /// First task id of the concurrent run; sequential ids start at 0
    pub concurrent_id_base: u16,
    /// Whether to keep the test file and encoded outputs after the run
    pub keep_files: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            test_file_name: TEST_FILE_NAME.to_string(),
            file_size: 256 * 256 * 256, // 16 MiB
            seed: 0,
            task_count: 3,
            pool_size: 0,
            max_pool_size: 64,
            compression_level: 9,
            allocator_mb: 32,
            report_progress: true,
            concurrent_id_base: 0x1000,
            keep_files: false,
        }
    }
}

impl BenchmarkConfig {
    /// Create a new benchmark configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if !self.work_dir.is_dir() {
            return Err(MtEncError::Config(
                format!("Work directory is not a directory: {}", self.work_dir.display())
            ));
        }

        if self.test_file_name.trim().is_empty() {
            return Err(MtEncError::Config(
                "Test file name must not be empty".to_string()
            ));
        }

        if self.file_size == 0 {
            return Err(MtEncError::Config(
                "File size must be greater than 0".to_string()
            ));
        }

        const MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024; // 4 GiB
        if self.file_size > MAX_FILE_SIZE {
            return Err(MtEncError::Config(
                format!("File size too large: {} bytes (max: {} bytes)",
                    self.file_size, MAX_FILE_SIZE)
            ));
        }

        if self.task_count == 0 {
            return Err(MtEncError::Config(
                "Task count must be greater than 0".to_string()
            ));
        }

        if self.max_pool_size == 0 {
            return Err(MtEncError::Config(
                "Maximum pool size must be greater than 0".to_string()
            ));
        }

        if self.pool_size > self.max_pool_size {
            return Err(MtEncError::Config(
                format!("Pool size {} exceeds maximum {}", self.pool_size, self.max_pool_size)
            ));
        }

        // Both id ranges must fit in four hex digits and must not overlap.
        let last_sequential = self.task_count - 1;
        let last_concurrent = self.concurrent_id_base as usize + self.task_count - 1;
        if last_concurrent > u16::MAX as usize {
            return Err(MtEncError::Config(
                format!("Task ids overflow 0xFFFF: base {:#06X} + {} tasks",
                    self.concurrent_id_base, self.task_count)
            ));
        }
        if (self.concurrent_id_base as usize) <= last_sequential {
            return Err(MtEncError::Config(
                format!("Concurrent id base {:#06X} overlaps sequential ids 0..{}",
                    self.concurrent_id_base, self.task_count)
            ));
        }

        if self.compression_level > 9 {
            return Err(MtEncError::Config(
                format!("Compression level must be between 0 and 9, got {}", self.compression_level)
            ));
        }

        if self.allocator_mb == 0 {
            return Err(MtEncError::Config(
                "Allocator size must be greater than 0 MiB".to_string()
            ));
        }

        Ok(())
    }

    /// Path of the synthetic input file
    pub fn test_file_path(&self) -> PathBuf {
        self.work_dir.join(&self.test_file_name)
    }

    /// Set the working directory
    pub fn with_work_dir(mut self, path: PathBuf) -> Self {
        self.work_dir = path;
        self
    }

    /// Set the synthetic input size
    pub fn with_file_size(mut self, size: u64) -> Self {
        self.file_size = size;
        self
    }

    /// Set the generator seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the number of tasks per run
    pub fn with_task_count(mut self, count: usize) -> Self {
        self.task_count = count;
        self
    }

    /// Set the number of worker threads for the concurrent run
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the compression level
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    /// Set the per-session allocator size
    pub fn with_allocator_mb(mut self, size_mb: u32) -> Self {
        self.allocator_mb = size_mb;
        self
    }

    /// Enable or disable codec progress reporting
    pub fn with_report_progress(mut self, report: bool) -> Self {
        self.report_progress = report;
        self
    }

    /// Set whether to keep generated files
    pub fn with_keep_files(mut self, keep: bool) -> Self {
        self.keep_files = keep;
        self
    }

    /// Load configuration from the standard config file location
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|e| MtEncError::Config(
                format!("Failed to read config file {}: {}", config_path.display(), e)
            ))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| MtEncError::Config(
                format!("Failed to parse config file {}: {}", config_path.display(), e)
            ))?;

        config.validate()?;

        Ok(config)
    }

    /// Get the standard configuration file path
    /// Uses $CONFIG_HOME/mtenc/mtenc.toml
    pub fn config_file_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| MtEncError::Config(
                "Unable to determine config directory".to_string()
            ))?;

        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }
}
