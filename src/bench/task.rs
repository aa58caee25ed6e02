//! Single encode job
//!
//! A task opens its own handles on the shared input and on its private output
//! file, acquires its own codec session, runs one encode call and records the
//! outcome. Every resource is a scoped value, so all of them are released on
//! every exit path.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use crate::codec::{Codec, CodecError, EncodeJob, EncodeStats, ProgressSink};
use crate::OUTPUT_EXTENSION;

/// Task identity, rendered as four upper-case hex digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub u16);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Which of the two task streams an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamRole {
    Input,
    Output,
}

impl fmt::Display for StreamRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamRole::Input => write!(f, "input"),
            StreamRole::Output => write!(f, "output"),
        }
    }
}

/// Failures local to one task. None of them affect sibling tasks.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("cannot open {role} stream {}: {source}", .path.display())]
    StreamOpen {
        role: StreamRole,
        path: PathBuf,
        source: io::Error,
    },
    #[error("allocator acquisition of {size_mb} MiB failed: {source}")]
    AllocatorAcquisition { size_mb: u32, source: CodecError },
    #[error("I/O error on {role} stream: {source}")]
    StreamIo { role: StreamRole, source: io::Error },
    #[error("codec failed: {0}")]
    Codec(#[source] CodecError),
    #[error("worker panicked while running the task")]
    WorkerPanicked,
}

/// Discriminant of [`TaskError`], for summaries and comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskErrorKind {
    StreamOpen,
    AllocatorAcquisition,
    StreamIo,
    Codec,
    WorkerPanicked,
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskErrorKind::StreamOpen => "StreamOpenError",
            TaskErrorKind::AllocatorAcquisition => "AllocatorAcquisitionError",
            TaskErrorKind::StreamIo => "StreamIOError",
            TaskErrorKind::Codec => "CodecError",
            TaskErrorKind::WorkerPanicked => "WorkerPanicked",
        };
        f.write_str(name)
    }
}

impl TaskError {
    pub fn kind(&self) -> TaskErrorKind {
        match self {
            TaskError::StreamOpen { .. } => TaskErrorKind::StreamOpen,
            TaskError::AllocatorAcquisition { .. } => TaskErrorKind::AllocatorAcquisition,
            TaskError::StreamIo { .. } => TaskErrorKind::StreamIo,
            TaskError::Codec(_) => TaskErrorKind::Codec,
            TaskError::WorkerPanicked => TaskErrorKind::WorkerPanicked,
        }
    }
}

/// Lifecycle of a task
#[derive(Debug)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed(TaskError),
}

impl TaskStatus {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, TaskStatus::Succeeded)
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            TaskStatus::Failed(err) => Some(err),
            _ => None,
        }
    }

    pub fn error_kind(&self) -> Option<TaskErrorKind> {
        self.error().map(TaskError::kind)
    }
}

/// Per-task codec parameters shared by every task of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSettings {
    pub level: u32,
    pub allocator_mb: u32,
    pub report_progress: bool,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            level: 9,
            allocator_mb: 32,
            report_progress: true,
        }
    }
}

/// Output file name for `id`: first four characters of `base_name`, the id in
/// hex, and the `.enc` extension.
pub fn output_file_name(base_name: &str, id: TaskId) -> String {
    let prefix: String = base_name.chars().take(4).collect();
    format!("{}{}.{}", prefix, id, OUTPUT_EXTENSION)
}

/// Final state of a task after its run
#[derive(Debug)]
pub struct TaskOutcome {
    pub id: TaskId,
    pub output: PathBuf,
    pub status: TaskStatus,
    pub stats: EncodeStats,
    pub elapsed: Duration,
}

impl TaskOutcome {
    /// Outcome for a task whose worker died before reporting it.
    pub fn lost(id: TaskId, output: PathBuf) -> Self {
        Self {
            id,
            output,
            status: TaskStatus::Failed(TaskError::WorkerPanicked),
            stats: EncodeStats::default(),
            elapsed: Duration::ZERO,
        }
    }
}

/// One encode job from the shared input into a private output file
#[derive(Debug)]
pub struct WorkerTask {
    id: TaskId,
    input: PathBuf,
    output: PathBuf,
    status: TaskStatus,
    stats: EncodeStats,
    elapsed: Duration,
}

impl WorkerTask {
    pub fn new(id: TaskId, input: PathBuf, output: PathBuf) -> Self {
        Self {
            id,
            input,
            output,
            status: TaskStatus::Pending,
            stats: EncodeStats::default(),
            elapsed: Duration::ZERO,
        }
    }

    /// Task reading `input` and writing `output_file_name(base_name, id)` in `out_dir`.
    pub fn for_id(id: TaskId, input: &Path, out_dir: &Path, base_name: &str) -> Self {
        Self::new(id, input.to_path_buf(), out_dir.join(output_file_name(base_name, id)))
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn status(&self) -> &TaskStatus {
        &self.status
    }

    /// Run the job once. Calling it again on a finished task is a no-op.
    ///
    /// A panic inside the codec fails this task with
    /// [`TaskError::WorkerPanicked`] and leaves the calling thread usable.
    pub fn run(
        &mut self,
        codec: &dyn Codec,
        settings: &TaskSettings,
        progress: Option<&dyn ProgressSink>,
    ) -> &TaskStatus {
        if !matches!(self.status, TaskStatus::Pending) {
            return &self.status;
        }

        self.status = TaskStatus::Running;
        debug!(task = %self.id, output = %self.output.display(), "task running");

        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.encode(codec, settings, progress)
        }))
        .unwrap_or_else(|_| Err(TaskError::WorkerPanicked));
        self.elapsed = start.elapsed();

        self.status = match result {
            Ok(stats) => {
                self.stats = stats;
                debug!(
                    task = %self.id,
                    bytes_in = stats.bytes_in,
                    bytes_out = stats.bytes_out,
                    elapsed_ms = self.elapsed.as_millis() as u64,
                    "task succeeded"
                );
                TaskStatus::Succeeded
            }
            Err(err) => {
                warn!(task = %self.id, kind = %err.kind(), "task failed: {}", err);
                TaskStatus::Failed(err)
            }
        };

        &self.status
    }

    fn encode(
        &self,
        codec: &dyn Codec,
        settings: &TaskSettings,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<EncodeStats, TaskError> {
        let input_file = File::open(&self.input).map_err(|source| TaskError::StreamOpen {
            role: StreamRole::Input,
            path: self.input.clone(),
            source,
        })?;
        let input_len = input_file
            .metadata()
            .map_err(|source| TaskError::StreamOpen {
                role: StreamRole::Input,
                path: self.input.clone(),
                source,
            })?
            .len();
        let output_file = File::create(&self.output).map_err(|source| TaskError::StreamOpen {
            role: StreamRole::Output,
            path: self.output.clone(),
            source,
        })?;

        let mut input = TrackedStream::new(BufReader::new(input_file));
        let mut output = TrackedStream::new(BufWriter::new(output_file));

        let mut session = codec
            .acquire_allocator(self.id, settings.allocator_mb)
            .map_err(|source| TaskError::AllocatorAcquisition {
                size_mb: settings.allocator_mb,
                source,
            })?;

        let encoded = session.encode(EncodeJob {
            output: &mut output,
            input: &mut input,
            input_len,
            level: settings.level,
            progress: if settings.report_progress { progress } else { None },
        });
        session.release();

        // Buffered bytes must reach the file before the output is judged clean.
        // A flush failure is recorded by the tracked stream.
        output.flush().ok();

        if let Some(source) = input.take_error() {
            return Err(TaskError::StreamIo { role: StreamRole::Input, source });
        }
        if let Some(source) = output.take_error() {
            return Err(TaskError::StreamIo { role: StreamRole::Output, source });
        }

        encoded.map_err(TaskError::Codec)
    }

    /// Consume the task, keeping only what the run produced.
    pub fn into_outcome(self) -> TaskOutcome {
        TaskOutcome {
            id: self.id,
            output: self.output,
            status: self.status,
            stats: self.stats,
            elapsed: self.elapsed,
        }
    }
}

/// Stream wrapper that remembers the first I/O error seen in either direction.
#[derive(Debug)]
pub struct TrackedStream<S> {
    inner: S,
    error: Option<io::Error>,
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, error: None }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn take_error(&mut self) -> Option<io::Error> {
        self.error.take()
    }

    fn record<T>(&mut self, result: io::Result<T>) -> io::Result<T> {
        if let Err(e) = &result {
            if e.kind() != io::ErrorKind::Interrupted && self.error.is_none() {
                self.error = Some(io::Error::new(e.kind(), e.to_string()));
            }
        }
        result
    }
}

impl<S: Read> Read for TrackedStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let result = self.inner.read(buf);
        self.record(result)
    }
}

impl<S: Write> Write for TrackedStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let result = self.inner.write(buf);
        self.record(result)
    }

    fn flush(&mut self) -> io::Result<()> {
        let result = self.inner.flush();
        self.record(result)
    }
}
