//! Benchmark engine module
//!
//! Contains the encode task, the sequential and concurrent schedulers,
//! the thread spawning seam, and the driver that runs both modes.

pub mod runner;
pub mod scheduler;
pub mod spawn;
pub mod task;

// Re-export commonly used types
pub use runner::Benchmark;
pub use scheduler::{ProgressSource, RunMode, RunReport, Scheduler};
pub use spawn::{OsThreads, Spawner, WorkerHandle, WorkerJob};
pub use task::{
    output_file_name, StreamRole, TaskError, TaskErrorKind, TaskId, TaskOutcome, TaskSettings,
    TaskStatus, WorkerTask,
};
