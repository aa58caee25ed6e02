//! Benchmark result data models
//!
//! Serializable snapshots of a finished benchmark: both runs, per-task
//! records, the speedup ratio and the host classification.

use crate::bench::{RunMode, RunReport, TaskErrorKind, TaskId, TaskOutcome};
use crate::config::BenchmarkConfig;
use crate::report::{Comparison, HostClass};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Complete benchmark result containing configuration, both runs, and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkSummary {
    /// Timestamp when the benchmark finished
    pub timestamp: DateTime<Utc>,
    /// Configuration used for this benchmark
    pub config: BenchmarkConfig,
    pub sequential: RunSummary,
    pub concurrent: RunSummary,
    /// Concurrent elapsed time over sequential elapsed time
    #[serde(with = "ratio_serde")]
    pub ratio: f64,
    pub host_class: HostClass,
    /// System information at time of benchmark
    pub system_info: SystemInfo,
}

/// One run reduced to plain data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub pool_size: usize,
    pub started_at: DateTime<Utc>,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
    pub tasks: Vec<TaskRecord>,
}

/// Final state of one task in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub succeeded: bool,
    pub error_kind: Option<TaskErrorKind>,
    pub error: Option<String>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

/// System information captured at benchmark time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name and architecture
    pub os: String,
    /// Hardware threads reported by the OS, 0 when unknown
    pub available_parallelism: usize,
}

impl BenchmarkSummary {
    pub fn new(config: BenchmarkConfig, sequential: &RunReport, concurrent: &RunReport) -> Self {
        let comparison = Comparison::from_reports(sequential, concurrent);
        Self {
            timestamp: Utc::now(),
            config,
            sequential: RunSummary::from(sequential),
            concurrent: RunSummary::from(concurrent),
            ratio: comparison.ratio,
            host_class: comparison.class,
            system_info: SystemInfo::detect(),
        }
    }

    /// One-line history entry
    pub fn summary(&self) -> String {
        format!(
            "{} - {} tasks - sequential {:.2}s - concurrent {:.2}s on {} workers \
             - ratio {:.2} - {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            self.sequential.tasks.len(),
            self.sequential.elapsed.as_secs_f64(),
            self.concurrent.elapsed.as_secs_f64(),
            self.concurrent.pool_size,
            self.ratio,
            self.host_class
        )
    }
}

impl RunSummary {
    pub fn failed_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.succeeded).count()
    }
}

impl From<&RunReport> for RunSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            mode: report.mode,
            pool_size: report.pool_size,
            started_at: report.started_at,
            elapsed: report.elapsed,
            tasks: report.outcomes.values().map(TaskRecord::from).collect(),
        }
    }
}

impl From<&TaskOutcome> for TaskRecord {
    fn from(outcome: &TaskOutcome) -> Self {
        Self {
            id: outcome.id,
            succeeded: outcome.status.is_succeeded(),
            error_kind: outcome.status.error_kind(),
            error: outcome.status.error().map(|e| e.to_string()),
            bytes_in: outcome.stats.bytes_in,
            bytes_out: outcome.stats.bytes_out,
            elapsed: outcome.elapsed,
        }
    }
}

impl SystemInfo {
    /// Create system info by detecting current system
    pub fn detect() -> Self {
        Self {
            os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
            available_parallelism: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(0),
        }
    }
}

// Durations are stored as integer nanoseconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

// JSON has no infinity; a non-finite ratio is stored as null
mod ratio_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(ratio: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Some(*ratio).filter(|r| r.is_finite()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}
