use mtenc::bench::{
    Benchmark, OsThreads, Scheduler, Spawner, StreamRole, TaskError, TaskErrorKind, TaskId,
    TaskSettings, WorkerHandle, WorkerJob, WorkerTask,
};
use mtenc::codec::{Codec, CodecError, CodecSession, DeflateCodec, EncodeJob, EncodeStats};
use mtenc::config::BenchmarkConfig;
use mtenc::data::TestFile;
use mtenc::report::failure_summary;
use mtenc::MtEncError;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

/// Deflate codec that refuses the allocator for one task slot in every run.
struct StarvedCodec {
    inner: DeflateCodec,
    slot: u16,
}

impl Codec for StarvedCodec {
    fn name(&self) -> &str {
        "starved-deflate"
    }

    fn acquire_allocator(
        &self,
        task: TaskId,
        size_mb: u32,
    ) -> Result<Box<dyn CodecSession>, CodecError> {
        if task.0 & 0x0FFF == self.slot {
            return Err(CodecError::AllocatorUnavailable {
                size_mb,
                reason: "pool exhausted".to_string(),
            });
        }
        self.inner.acquire_allocator(task, size_mb)
    }
}

/// Codec that holds every encode call for a fixed time.
struct SlowCodec(Duration);

struct SlowSession(Duration);

impl Codec for SlowCodec {
    fn name(&self) -> &str {
        "slow"
    }

    fn acquire_allocator(
        &self,
        _task: TaskId,
        _size_mb: u32,
    ) -> Result<Box<dyn CodecSession>, CodecError> {
        Ok(Box::new(SlowSession(self.0)))
    }
}

impl CodecSession for SlowSession {
    fn encode(&mut self, job: EncodeJob<'_>) -> Result<EncodeStats, CodecError> {
        std::thread::sleep(self.0);
        job.output.write_all(b"slow")?;
        Ok(EncodeStats { bytes_in: job.input_len, bytes_out: 4 })
    }
}

/// Spawner that fails once `allowed` threads exist.
struct CappedSpawner {
    allowed: usize,
    calls: AtomicUsize,
}

impl Spawner for CappedSpawner {
    fn spawn(&self, name: String, job: WorkerJob) -> io::Result<WorkerHandle> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.allowed {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "cannot create thread"));
        }
        OsThreads::new().spawn(name, job)
    }
}

fn settings() -> TaskSettings {
    TaskSettings { level: 1, allocator_mb: 1, report_progress: true }
}

fn tasks(ids: impl IntoIterator<Item = u16>, input: &Path, dir: &Path) -> Vec<WorkerTask> {
    ids.into_iter()
        .map(|id| WorkerTask::for_id(TaskId(id), input, dir, "TestFile.bin"))
        .collect()
}

#[test]
fn test_allocator_failure_is_isolated_in_both_modes() {
    let dir = tempdir().unwrap();
    let input = TestFile::create(dir.path().join("TestFile.bin"), 512 * 1024, 9).unwrap();
    let codec = StarvedCodec { inner: DeflateCodec::new(), slot: 1 };
    let scheduler = Scheduler::new(Arc::new(codec), settings(), 8);

    let sequential = scheduler.run_sequential(tasks(0..3, input.path(), dir.path()));
    let concurrent = scheduler
        .run_concurrent(tasks(0x1000..0x1003, input.path(), dir.path()), 0)
        .unwrap();

    for (report, base) in [(&sequential, 0u16), (&concurrent, 0x1000)] {
        let statuses = report.status_map();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[&TaskId(base)], None);
        assert_eq!(statuses[&TaskId(base + 1)], Some(TaskErrorKind::AllocatorAcquisition));
        assert_eq!(statuses[&TaskId(base + 2)], None);

        match report.outcomes[&TaskId(base + 1)].status.error() {
            Some(TaskError::AllocatorAcquisition { size_mb, .. }) => assert_eq!(*size_mb, 1),
            other => panic!("unexpected status {:?}", other),
        }
        let summary = failure_summary(report).unwrap();
        assert!(summary.contains(&format!("task {}: AllocatorAcquisitionError", TaskId(base + 1))));
    }
}

#[test]
fn test_stream_open_failures_name_the_stream() {
    let dir = tempdir().unwrap();
    let input = TestFile::create(dir.path().join("TestFile.bin"), 4096, 0).unwrap();
    let scheduler = Scheduler::new(Arc::new(DeflateCodec::new()), settings(), 8);

    let absent = dir.path().join("absent.bin");
    let no_dir = dir.path().join("no-such-dir");
    let missing_input = WorkerTask::for_id(TaskId(0), &absent, dir.path(), "TestFile.bin");
    let bad_output = WorkerTask::for_id(TaskId(1), input.path(), &no_dir, "TestFile.bin");
    let fine = WorkerTask::for_id(TaskId(2), input.path(), dir.path(), "TestFile.bin");

    let report = scheduler.run_sequential(vec![missing_input, bad_output, fine]);
    let role = |id: u16| match report.outcomes[&TaskId(id)].status.error() {
        Some(TaskError::StreamOpen { role, .. }) => Some(*role),
        _ => None,
    };
    assert_eq!(role(0), Some(StreamRole::Input));
    assert_eq!(role(1), Some(StreamRole::Output));
    assert!(report.outcomes[&TaskId(2)].status.is_succeeded());
}

#[test]
fn test_thread_creation_failure_stops_the_run() {
    let dir = tempdir().unwrap();
    let input = TestFile::create(dir.path().join("TestFile.bin"), 4096, 0).unwrap();
    let spawner = Arc::new(CappedSpawner { allowed: 2, calls: AtomicUsize::new(0) });
    let scheduler = Scheduler::new(Arc::new(DeflateCodec::new()), settings(), 8)
        .with_spawner(spawner);

    let err = scheduler
        .run_concurrent(tasks(0x1000..0x1004, input.path(), dir.path()), 4)
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, MtEncError::ThreadCreation { worker: 2, .. }));
}

#[tokio::test]
async fn test_benchmark_propagates_thread_creation_failure() {
    let dir = tempdir().unwrap();
    let config = BenchmarkConfig::default()
        .with_work_dir(dir.path().to_path_buf())
        .with_file_size(128 * 1024)
        .with_compression_level(1)
        .with_allocator_mb(1);
    let spawner = Arc::new(CappedSpawner { allowed: 0, calls: AtomicUsize::new(0) });
    let bench = Benchmark::new(config).with_spawner(spawner).with_progress_bars(false);

    let err = bench.run().await.unwrap_err();
    assert!(matches!(err, MtEncError::ThreadCreation { worker: 0, .. }));

    // Sequential outputs and the test file are gone even on the fatal path.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_thread_creation_failure_leaves_no_outputs_behind() {
    let dir = tempdir().unwrap();
    let config = BenchmarkConfig::default()
        .with_work_dir(dir.path().to_path_buf())
        .with_file_size(64 * 1024)
        .with_allocator_mb(1);
    let spawner = Arc::new(CappedSpawner { allowed: 1, calls: AtomicUsize::new(0) });
    let bench = Benchmark::new(config)
        .with_codec(Arc::new(SlowCodec(Duration::from_millis(300))))
        .with_spawner(spawner)
        .with_progress_bars(false);

    let err = bench.run().await.unwrap_err();
    assert!(matches!(err, MtEncError::ThreadCreation { worker: 1, .. }));

    // The worker that did start must not write anything after the run returned.
    tokio::time::sleep(Duration::from_millis(600)).await;
    let left: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(left.is_empty(), "leftover files: {:?}", left);
}
