//! Benchmark driver
//!
//! Generates the test file, runs the task set sequentially and then
//! concurrently, prints each run and the verdict, and returns the summary.

use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{info, warn};
use crate::bench::scheduler::{RunMode, RunReport, Scheduler};
use crate::bench::spawn::{OsThreads, Spawner};
use crate::bench::task::{TaskId, TaskSettings, WorkerTask};
use crate::codec::{Codec, DeflateCodec};
use crate::config::BenchmarkConfig;
use crate::data::TestFile;
use crate::models::BenchmarkSummary;
use crate::report::{failure_summary, run_line, Comparison, ProgressHub};
use crate::util::units::format_bytes;
use crate::{MtEncError, Result};

/// One full sequential-vs-concurrent benchmark
pub struct Benchmark {
    config: BenchmarkConfig,
    codec: Arc<dyn Codec>,
    spawner: Arc<dyn Spawner>,
    progress_bars: bool,
}

impl Benchmark {
    /// Benchmark of the deflate codec on OS threads.
    pub fn new(config: BenchmarkConfig) -> Self {
        let progress_bars = config.report_progress;
        Self {
            config,
            codec: Arc::new(DeflateCodec::new()),
            spawner: Arc::new(OsThreads::new()),
            progress_bars,
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Draw progress bars on stderr. Codec callbacks still follow `report_progress`.
    pub fn with_progress_bars(mut self, show: bool) -> Self {
        self.progress_bars = show && self.config.report_progress;
        self
    }

    pub fn task_settings(&self) -> TaskSettings {
        TaskSettings {
            level: self.config.compression_level,
            allocator_mb: self.config.allocator_mb,
            report_progress: self.config.report_progress,
        }
    }

    /// Tasks of one run: ids `0..n` sequentially, `concurrent_id_base + i` concurrently.
    pub fn tasks_for(&self, mode: RunMode, input: &Path) -> Vec<WorkerTask> {
        let base = match mode {
            RunMode::Sequential => 0,
            RunMode::Concurrent => self.config.concurrent_id_base,
        };
        (0..self.config.task_count)
            .map(|i| {
                let id = TaskId(base + i as u16);
                WorkerTask::for_id(id, input, &self.config.work_dir, &self.config.test_file_name)
            })
            .collect()
    }

    /// Run both passes. Task failures are reported and kept in the summary;
    /// only configuration, data generation and thread creation errors abort.
    pub async fn run(&self) -> Result<BenchmarkSummary> {
        self.config.validate()?;

        let path = self.config.test_file_path();
        let (size, seed) = (self.config.file_size, self.config.seed);
        let mut test_file = tokio::task::spawn_blocking(move || TestFile::create(path, size, seed))
            .await
            .map_err(join_failed)??;
        if self.config.keep_files {
            test_file.keep_on_drop();
        }
        println!("Test file {} ({})", test_file.path().display(), format_bytes(test_file.len()));

        let sequential = self.run_mode(RunMode::Sequential, test_file.path()).await?;
        self.print_run("  Compressing files sequentially", &sequential);

        let concurrent = match self.run_mode(RunMode::Concurrent, test_file.path()).await {
            Ok(report) => report,
            Err(err) => {
                if !self.config.keep_files {
                    self.remove_outputs(&sequential);
                }
                return Err(err);
            }
        };
        self.print_run("Compressing files simultaneously", &concurrent);

        let comparison = Comparison::from_reports(&sequential, &concurrent);
        println!("{}", comparison.verdict_line());
        info!(ratio = comparison.ratio, class = %comparison.class, "benchmark finished");

        if !self.config.keep_files {
            self.remove_outputs(&sequential);
            self.remove_outputs(&concurrent);
        }

        Ok(BenchmarkSummary::new(self.config.clone(), &sequential, &concurrent))
    }

    async fn run_mode(&self, mode: RunMode, input: &Path) -> Result<RunReport> {
        let tasks = self.tasks_for(mode, input);
        let mut scheduler = Scheduler::new(
            Arc::clone(&self.codec),
            self.task_settings(),
            self.config.max_pool_size,
        )
        .with_spawner(Arc::clone(&self.spawner));

        let renderer = if self.progress_bars {
            let (hub, renderer) = ProgressHub::start();
            scheduler = scheduler.with_progress(hub);
            Some(renderer)
        } else {
            None
        };

        let pool_size = self.config.pool_size;
        let result = tokio::task::spawn_blocking(move || match mode {
            RunMode::Sequential => Ok(scheduler.run_sequential(tasks)),
            RunMode::Concurrent => scheduler.run_concurrent(tasks, pool_size),
        })
        .await
        .map_err(join_failed)?;

        // Every sink is gone once the scheduler has returned.
        if let Some(renderer) = renderer {
            renderer.await.ok();
        }
        result
    }

    fn print_run(&self, label: &str, report: &RunReport) {
        println!("{}: {}", label, run_line(report));
        if let Some(summary) = failure_summary(report) {
            println!("{}", summary);
        }
    }

    fn remove_outputs(&self, report: &RunReport) {
        for path in report.output_paths() {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "failed to remove output: {}", e),
            }
        }
    }
}

fn join_failed(err: JoinError) -> MtEncError {
    MtEncError::Scheduler(format!("blocking task failed: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn small_config(dir: &Path) -> BenchmarkConfig {
        BenchmarkConfig::default()
            .with_work_dir(dir.to_path_buf())
            .with_file_size(256 * 1024)
            .with_seed(3)
            .with_compression_level(1)
            .with_allocator_mb(1)
    }

    #[test]
    fn test_task_ids_per_mode() {
        let dir = tempdir().unwrap();
        let bench = Benchmark::new(small_config(dir.path()));
        let input = dir.path().join("TestFile.bin");

        let ids = |mode| -> Vec<u16> {
            bench.tasks_for(mode, &input).iter().map(|t| t.id().0).collect()
        };
        assert_eq!(ids(RunMode::Sequential), vec![0, 1, 2]);
        assert_eq!(ids(RunMode::Concurrent), vec![0x1000, 0x1001, 0x1002]);

        let outputs = bench.tasks_for(RunMode::Concurrent, &input);
        assert_eq!(outputs[1].output(), dir.path().join("Test1001.enc"));
    }

    #[tokio::test]
    async fn test_run_cleans_up_by_default() {
        let dir = tempdir().unwrap();
        let bench = Benchmark::new(small_config(dir.path())).with_progress_bars(false);

        let summary = bench.run().await.unwrap();
        assert_eq!(summary.sequential.tasks.len(), 3);
        assert_eq!(summary.concurrent.tasks.len(), 3);
        assert_eq!(summary.sequential.failed_count(), 0);
        assert_eq!(summary.concurrent.failed_count(), 0);
        assert!(summary.sequential.tasks.iter().all(|t| t.bytes_out > 0));

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_run_keeps_files_on_request() {
        let dir = tempdir().unwrap();
        let config = small_config(dir.path()).with_keep_files(true);
        let bench = Benchmark::new(config).with_progress_bars(false);

        bench.run().await.unwrap();
        assert!(dir.path().join("TestFile.bin").exists());
        assert!(dir.path().join("Test0002.enc").exists());
        assert!(dir.path().join("Test1002.enc").exists());
    }

    #[tokio::test]
    async fn test_run_with_progress_bars() {
        let dir = tempdir().unwrap();
        let bench = Benchmark::new(small_config(dir.path()));

        let summary = bench.run().await.unwrap();
        assert_eq!(summary.concurrent.failed_count(), 0);
        assert!(summary.concurrent.tasks.iter().all(|t| t.bytes_in == 256 * 1024));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = tempdir().unwrap();
        let bench = Benchmark::new(small_config(dir.path()).with_task_count(0));
        assert!(matches!(bench.run().await, Err(MtEncError::Config(_))));
    }
}
