//! Worker thread spawning
//!
//! The scheduler never touches platform thread APIs directly; it goes through
//! [`Spawner`], which makes spawn failures observable and replaceable in tests.

use std::any::Any;
use std::io;
use std::thread::{self, JoinHandle};

/// Body of one worker thread
pub type WorkerJob = Box<dyn FnOnce() + Send + 'static>;

/// Starts worker threads.
pub trait Spawner: Send + Sync {
    /// Start `job` on a new thread named `name`. An `Err` means no thread exists.
    fn spawn(&self, name: String, job: WorkerJob) -> io::Result<WorkerHandle>;
}

/// Handle to a running worker, joined at the end of a concurrent run.
#[derive(Debug)]
pub struct WorkerHandle {
    inner: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn new(inner: JoinHandle<()>) -> Self {
        Self { inner }
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.thread().name()
    }

    /// Block until the worker terminates. `Err` carries the panic payload.
    pub fn join(self) -> Result<(), Box<dyn Any + Send + 'static>> {
        self.inner.join()
    }
}

/// Spawns real OS threads.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsThreads;

impl OsThreads {
    pub fn new() -> Self {
        Self
    }
}

impl Spawner for OsThreads {
    fn spawn(&self, name: String, job: WorkerJob) -> io::Result<WorkerHandle> {
        thread::Builder::new().name(name).spawn(job).map(WorkerHandle::new)
    }
}
