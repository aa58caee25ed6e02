//! Codec adapter module
//!
//! The harness treats the compressor as an opaque service. It only sequences
//! three steps per task: acquire a session (the codec's private memory pool),
//! encode one stream through it, release it.

use std::io::{Read, Write};
use thiserror::Error;
use crate::bench::TaskId;

pub mod deflate;

pub use deflate::DeflateCodec;

/// Errors reported by a codec adapter
#[derive(Debug, Error)]
pub enum CodecError {
    /// The session's memory pool could not be reserved
    #[error("allocator of {size_mb} MiB unavailable: {reason}")]
    AllocatorUnavailable { size_mb: u32, reason: String },
    /// Reading the input or writing the output failed inside the codec
    #[error("stream I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The compressor itself rejected the data or its state
    #[error("compression failed: {0}")]
    Compress(String),
}

/// Receives `(bytes_processed, total_bytes)` notifications during an encode call.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, bytes_processed: u64, total_bytes: u64);
}

/// Everything a session needs for one encode call.
pub struct EncodeJob<'a> {
    pub output: &'a mut dyn Write,
    pub input: &'a mut dyn Read,
    /// Total input length, used as the denominator for progress reports
    pub input_len: u64,
    pub level: u32,
    /// Present only when progress reporting is enabled
    pub progress: Option<&'a dyn ProgressSink>,
}

/// Byte counts of a finished encode call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
}

/// A compression service shared by all workers.
///
/// Implementations must hand out sessions that share no mutable state, since
/// several sessions run at the same time on different threads.
pub trait Codec: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Reserve a private session sized `size_mb` MiB for `task`.
    fn acquire_allocator(
        &self,
        task: TaskId,
        size_mb: u32,
    ) -> Result<Box<dyn CodecSession>, CodecError>;
}

/// A codec instance owned by exactly one task.
///
/// Dropping a session releases it; [`CodecSession::release`] makes the release
/// point explicit.
pub trait CodecSession: Send {
    fn encode(&mut self, job: EncodeJob<'_>) -> Result<EncodeStats, CodecError>;

    fn release(self: Box<Self>) {}
}
