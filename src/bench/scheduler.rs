//! Sequential and concurrent task scheduling
//!
//! Both modes run the same kind of task set and produce a [`RunReport`] keyed
//! by task id. The concurrent mode deals tasks round-robin onto a fixed pool of
//! worker threads, collects outcomes over a channel, and waits on a join
//! barrier before stopping the clock.
//!
//! A codec panic is contained inside its task, so it never takes the rest of
//! a worker's lane down with it.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use crate::codec::{Codec, ProgressSink};
use crate::bench::spawn::{OsThreads, Spawner, WorkerHandle, WorkerJob};
use crate::bench::task::{TaskErrorKind, TaskId, TaskOutcome, TaskSettings, WorkerTask};
use crate::{MtEncError, Result};

/// Hands out a progress sink for each task that is about to run.
pub trait ProgressSource: Send + Sync {
    fn sink_for(&self, task: TaskId) -> Box<dyn ProgressSink>;
}

/// How a run executed its tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunMode {
    Sequential,
    Concurrent,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Sequential => write!(f, "sequential"),
            RunMode::Concurrent => write!(f, "concurrent"),
        }
    }
}

/// Result of one benchmark run
#[derive(Debug)]
pub struct RunReport {
    pub mode: RunMode,
    pub pool_size: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub outcomes: BTreeMap<TaskId, TaskOutcome>,
}

impl RunReport {
    pub fn task_count(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.values().filter(|o| o.status.is_succeeded())
    }

    pub fn failures(&self) -> impl Iterator<Item = &TaskOutcome> {
        self.outcomes.values().filter(|o| !o.status.is_succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Task id to error kind (`None` for success).
    pub fn status_map(&self) -> BTreeMap<TaskId, Option<TaskErrorKind>> {
        self.outcomes
            .iter()
            .map(|(id, outcome)| (*id, outcome.status.error_kind()))
            .collect()
    }

    pub fn bytes_in(&self) -> u64 {
        self.outcomes.values().map(|o| o.stats.bytes_in).sum()
    }

    pub fn output_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.outcomes.values().map(|o| &o.output)
    }
}

/// Runs task sets against one shared codec
pub struct Scheduler {
    codec: Arc<dyn Codec>,
    settings: TaskSettings,
    max_pool_size: usize,
    spawner: Arc<dyn Spawner>,
    progress: Option<Arc<dyn ProgressSource>>,
}

impl Scheduler {
    pub fn new(codec: Arc<dyn Codec>, settings: TaskSettings, max_pool_size: usize) -> Self {
        Self {
            codec,
            settings,
            max_pool_size: max_pool_size.max(1),
            spawner: Arc::new(OsThreads::new()),
            progress: None,
        }
    }

    /// Replace the thread spawner
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Attach a progress source; each running task gets its own sink
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSource>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Effective worker count: `0` asks for one per task; the result never
    /// exceeds the task count or the configured maximum and is at least 1.
    pub fn resolve_pool_size(&self, requested: usize, task_count: usize) -> usize {
        let wanted = if requested == 0 { task_count } else { requested };
        wanted.min(task_count).min(self.max_pool_size).max(1)
    }

    /// Run every task on the calling thread, in order.
    pub fn run_sequential(&self, tasks: Vec<WorkerTask>) -> RunReport {
        info!(tasks = tasks.len(), codec = self.codec.name(), "sequential run starting");
        let started_at = Utc::now();
        let start = Instant::now();

        let mut outcomes = BTreeMap::new();
        for mut task in tasks {
            let sink = self.progress.as_ref().map(|p| p.sink_for(task.id()));
            task.run(self.codec.as_ref(), &self.settings, sink.as_deref());
            let outcome = task.into_outcome();
            outcomes.insert(outcome.id, outcome);
        }

        let elapsed = start.elapsed();
        info!(elapsed_ms = elapsed.as_millis() as u64, "sequential run finished");

        RunReport {
            mode: RunMode::Sequential,
            pool_size: 1,
            started_at,
            finished_at: Utc::now(),
            elapsed,
            outcomes,
        }
    }

    /// Run the tasks on `pool_size` worker threads and wait for all of them.
    ///
    /// Fails with [`MtEncError::ThreadCreation`] as soon as one worker cannot be
    /// spawned. Workers already started stop after their current task, are
    /// joined, and every output of the run is removed before the error returns.
    pub fn run_concurrent(&self, tasks: Vec<WorkerTask>, pool_size: usize) -> Result<RunReport> {
        let pool = self.resolve_pool_size(pool_size, tasks.len());
        info!(tasks = tasks.len(), pool, codec = self.codec.name(), "concurrent run starting");

        let expected: Vec<(TaskId, PathBuf)> = tasks
            .iter()
            .map(|t| (t.id(), t.output().to_path_buf()))
            .collect();

        let mut lanes: Vec<Vec<WorkerTask>> = (0..pool).map(|_| Vec::new()).collect();
        for (index, task) in tasks.into_iter().enumerate() {
            lanes[index % pool].push(task);
        }

        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel::<TaskOutcome>();
        let started_at = Utc::now();
        let start = Instant::now();
        let mut handles = Vec::with_capacity(pool);

        for (worker, lane) in lanes.into_iter().enumerate() {
            let job = self.worker_job(worker, lane, outcome_tx.clone());
            match self.spawner.spawn(format!("mtenc-worker-{}", worker), job) {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    error!(worker, "error at creation of worker thread: {}", source);
                    // Closing the channel makes spawned workers stop after their current task.
                    drop(outcome_rx);
                    drop(outcome_tx);
                    join_all(handles);
                    remove_outputs(expected.iter().map(|(_, output)| output));
                    return Err(MtEncError::ThreadCreation { worker, source });
                }
            }
        }
        drop(outcome_tx);

        join_all(handles);
        let elapsed = start.elapsed();

        let mut outcomes = BTreeMap::new();
        while let Ok(outcome) = outcome_rx.try_recv() {
            outcomes.insert(outcome.id, outcome);
        }
        for (id, output) in expected {
            outcomes
                .entry(id)
                .or_insert_with(|| TaskOutcome::lost(id, output));
        }

        info!(elapsed_ms = elapsed.as_millis() as u64, "concurrent run finished");

        Ok(RunReport {
            mode: RunMode::Concurrent,
            pool_size: pool,
            started_at,
            finished_at: Utc::now(),
            elapsed,
            outcomes,
        })
    }

    fn worker_job(
        &self,
        worker: usize,
        lane: Vec<WorkerTask>,
        outcome_tx: mpsc::UnboundedSender<TaskOutcome>,
    ) -> WorkerJob {
        let codec = Arc::clone(&self.codec);
        let settings = self.settings;
        let progress = self.progress.clone();

        Box::new(move || {
            debug!(worker, tasks = lane.len(), "worker thread started");
            for mut task in lane {
                let sink = progress.as_ref().map(|p| p.sink_for(task.id()));
                task.run(codec.as_ref(), &settings, sink.as_deref());
                if outcome_tx.send(task.into_outcome()).is_err() {
                    // The scheduler gave up on this run.
                    break;
                }
            }
            debug!(worker, "worker thread exiting");
        })
    }
}

fn join_all(handles: Vec<WorkerHandle>) {
    for handle in handles {
        let name = handle.name().unwrap_or("worker").to_string();
        if handle.join().is_err() {
            warn!(worker = %name, "worker thread panicked");
        }
    }
}

fn remove_outputs<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "removed output of aborted run"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), "failed to remove output: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;
    use crate::codec::{CodecError, CodecSession, DeflateCodec, EncodeJob, EncodeStats};

    /// Spawner that refuses after `allowed` successful spawns.
    struct LimitedSpawner {
        allowed: usize,
        spawned: AtomicUsize,
    }

    impl Spawner for LimitedSpawner {
        fn spawn(&self, name: String, job: WorkerJob) -> io::Result<WorkerHandle> {
            if self.spawned.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"));
            }
            OsThreads::new().spawn(name, job)
        }
    }

    /// Codec that panics inside encode for one task id.
    struct PanickyCodec {
        victim: TaskId,
    }

    struct PanickySession {
        explode: bool,
    }

    impl Codec for PanickyCodec {
        fn name(&self) -> &str {
            "panicky"
        }

        fn acquire_allocator(
            &self,
            task: TaskId,
            _size_mb: u32,
        ) -> std::result::Result<Box<dyn CodecSession>, CodecError> {
            Ok(Box::new(PanickySession { explode: task == self.victim }))
        }
    }

    impl CodecSession for PanickySession {
        fn encode(&mut self, job: EncodeJob<'_>) -> std::result::Result<EncodeStats, CodecError> {
            if self.explode {
                panic!("codec state corrupted");
            }
            job.output.write_all(b"ok")?;
            Ok(EncodeStats { bytes_in: 0, bytes_out: 2 })
        }
    }

    /// Codec that sleeps before writing a fixed payload.
    struct SlowCodec {
        delay: Duration,
    }

    struct SlowSession {
        delay: Duration,
    }

    impl Codec for SlowCodec {
        fn name(&self) -> &str {
            "slow"
        }

        fn acquire_allocator(
            &self,
            _task: TaskId,
            _size_mb: u32,
        ) -> std::result::Result<Box<dyn CodecSession>, CodecError> {
            Ok(Box::new(SlowSession { delay: self.delay }))
        }
    }

    impl CodecSession for SlowSession {
        fn encode(&mut self, job: EncodeJob<'_>) -> std::result::Result<EncodeStats, CodecError> {
            std::thread::sleep(self.delay);
            job.output.write_all(b"slow")?;
            Ok(EncodeStats { bytes_in: job.input_len, bytes_out: 4 })
        }
    }

    #[derive(Default)]
    struct CountingProgress {
        sinks: Mutex<Vec<TaskId>>,
    }

    struct NullSink;

    impl ProgressSink for NullSink {
        fn on_progress(&self, _bytes_processed: u64, _total_bytes: u64) {}
    }

    impl ProgressSource for CountingProgress {
        fn sink_for(&self, task: TaskId) -> Box<dyn ProgressSink> {
            self.sinks.lock().unwrap().push(task);
            Box::new(NullSink)
        }
    }

    fn settings() -> TaskSettings {
        TaskSettings {
            level: 1,
            allocator_mb: 1,
            report_progress: true,
        }
    }

    fn make_tasks(ids: impl IntoIterator<Item = u16>, input: &Path, dir: &Path) -> Vec<WorkerTask> {
        ids.into_iter()
            .map(|id| WorkerTask::for_id(TaskId(id), input, dir, "TestFile.bin"))
            .collect()
    }

    fn write_input(dir: &Path) -> PathBuf {
        let path = dir.join("TestFile.bin");
        std::fs::write(&path, vec![7u8; 64 * 1024]).unwrap();
        path
    }

    #[test]
    fn test_resolve_pool_size() {
        let scheduler = Scheduler::new(Arc::new(DeflateCodec::new()), settings(), 4);
        assert_eq!(scheduler.resolve_pool_size(0, 3), 3);
        assert_eq!(scheduler.resolve_pool_size(0, 10), 4);
        assert_eq!(scheduler.resolve_pool_size(2, 3), 2);
        assert_eq!(scheduler.resolve_pool_size(8, 3), 3);
        assert_eq!(scheduler.resolve_pool_size(0, 0), 1);
    }

    #[test]
    fn test_sequential_run_keeps_task_order() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let progress = Arc::new(CountingProgress::default());
        let scheduler = Scheduler::new(Arc::new(DeflateCodec::new()), settings(), 4)
            .with_progress(progress.clone());

        let report = scheduler.run_sequential(make_tasks([2, 0, 1], &input, dir.path()));
        assert_eq!(report.mode, RunMode::Sequential);
        assert!(report.all_succeeded());
        let ids: Vec<TaskId> = report.outcomes.keys().copied().collect();
        assert_eq!(ids, vec![TaskId(0), TaskId(1), TaskId(2)]);
        // Sinks are requested in execution order, which is task order.
        assert_eq!(*progress.sinks.lock().unwrap(), vec![TaskId(2), TaskId(0), TaskId(1)]);
        assert_eq!(report.bytes_in(), 3 * 64 * 1024);
    }

    #[test]
    fn test_concurrent_run_fewer_workers_than_tasks() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let scheduler = Scheduler::new(Arc::new(DeflateCodec::new()), settings(), 2);

        let report = scheduler
            .run_concurrent(make_tasks(0x1000..0x1005, &input, dir.path()), 0)
            .unwrap();
        assert_eq!(report.pool_size, 2);
        assert_eq!(report.task_count(), 5);
        assert!(report.all_succeeded());
        for path in report.output_paths() {
            assert!(std::fs::metadata(path).unwrap().len() > 0);
        }
    }

    #[test]
    fn test_spawn_failure_is_fatal() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let spawner = Arc::new(LimitedSpawner { allowed: 1, spawned: AtomicUsize::new(0) });
        let scheduler = Scheduler::new(Arc::new(DeflateCodec::new()), settings(), 8)
            .with_spawner(spawner);

        let result = scheduler.run_concurrent(make_tasks(0..3, &input, dir.path()), 3);
        match result {
            Err(MtEncError::ThreadCreation { worker, .. }) => assert_eq!(worker, 1),
            other => panic!("expected thread creation failure, got {:?}", other.map(|r| r.mode)),
        }
    }

    #[test]
    fn test_worker_panic_marks_only_its_tasks() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let scheduler = Scheduler::new(Arc::new(PanickyCodec { victim: TaskId(1) }), settings(), 8);

        let report = scheduler
            .run_concurrent(make_tasks(0..3, &input, dir.path()), 3)
            .unwrap();
        let statuses = report.status_map();
        assert_eq!(statuses[&TaskId(0)], None);
        assert_eq!(statuses[&TaskId(1)], Some(TaskErrorKind::WorkerPanicked));
        assert_eq!(statuses[&TaskId(2)], None);
    }

    #[test]
    fn test_codec_panic_spares_rest_of_lane() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let codec = Arc::new(PanickyCodec { victim: TaskId(0) });
        let scheduler = Scheduler::new(codec, settings(), 1);

        let report = scheduler
            .run_concurrent(make_tasks(0..3, &input, dir.path()), 0)
            .unwrap();
        assert_eq!(report.pool_size, 1);
        let statuses = report.status_map();
        assert_eq!(statuses[&TaskId(0)], Some(TaskErrorKind::WorkerPanicked));
        assert_eq!(statuses[&TaskId(1)], None);
        assert_eq!(statuses[&TaskId(2)], None);
    }

    #[test]
    fn test_sequential_codec_panic_is_a_task_failure() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let scheduler = Scheduler::new(Arc::new(PanickyCodec { victim: TaskId(1) }), settings(), 4);

        let report = scheduler.run_sequential(make_tasks(0..3, &input, dir.path()));
        let statuses = report.status_map();
        assert_eq!(statuses[&TaskId(0)], None);
        assert_eq!(statuses[&TaskId(1)], Some(TaskErrorKind::WorkerPanicked));
        assert_eq!(statuses[&TaskId(2)], None);
    }

    #[test]
    fn test_spawn_failure_waits_for_started_workers_and_cleans_up() {
        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let spawner = Arc::new(LimitedSpawner { allowed: 1, spawned: AtomicUsize::new(0) });
        let codec = Arc::new(SlowCodec { delay: Duration::from_millis(200) });
        let scheduler = Scheduler::new(codec, settings(), 8).with_spawner(spawner);

        let result = scheduler.run_concurrent(make_tasks(0x1000..0x1003, &input, dir.path()), 3);
        assert!(matches!(result, Err(MtEncError::ThreadCreation { worker: 1, .. })));

        // Only the shared input is left once the call returns.
        std::thread::sleep(Duration::from_millis(400));
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("TestFile.bin")]);
    }

    #[tokio::test]
    async fn test_progress_reaches_renderer_during_encode() {
        use crate::report::ProgressHub;
        use indicatif::ProgressDrawTarget;

        let dir = tempdir().unwrap();
        let input = write_input(dir.path());
        let (hub, renderer) = ProgressHub::with_draw_target(ProgressDrawTarget::hidden());
        let scheduler = Scheduler::new(Arc::new(DeflateCodec::new()), settings(), 4)
            .with_progress(hub.clone());

        let report = scheduler
            .run_concurrent(make_tasks(0x1000..0x1003, &input, dir.path()), 0)
            .unwrap();
        assert!(report.all_succeeded());
        drop(scheduler);
        drop(hub);

        let last = renderer.await.unwrap();
        let size = 64 * 1024;
        assert_eq!(last.len(), 3);
        for id in 0x1000..0x1003 {
            let event = last[&TaskId(id)];
            assert_eq!((event.bytes_processed, event.total_bytes), (size, size));
        }
    }
}
