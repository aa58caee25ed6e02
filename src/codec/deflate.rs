//! zlib/deflate adapter built on `flate2`
//!
//! Each session owns an output arena reserved up front; that reservation is
//! the session's "allocator" and the only memory the encoder writes into.

use std::io::{ErrorKind, Read, Write};
use flate2::{Compress, Compression, FlushCompress, Status};
use tracing::trace;
use crate::bench::TaskId;
use super::{Codec, CodecError, CodecSession, EncodeJob, EncodeStats};

const INPUT_CHUNK: usize = 64 * 1024;
const MAX_LEVEL: u32 = 9;
const MAX_ARENA_MB: u32 = 4096;

/// Deflate codec producing zlib-framed output
#[derive(Debug, Clone, Default)]
pub struct DeflateCodec;

impl DeflateCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for DeflateCodec {
    fn name(&self) -> &str {
        "deflate"
    }

    fn acquire_allocator(
        &self,
        task: TaskId,
        size_mb: u32,
    ) -> Result<Box<dyn CodecSession>, CodecError> {
        if size_mb > MAX_ARENA_MB {
            return Err(CodecError::AllocatorUnavailable {
                size_mb,
                reason: format!("arena is limited to {} MiB", MAX_ARENA_MB),
            });
        }
        let size = size_mb as usize * 1024 * 1024;
        if size < INPUT_CHUNK {
            return Err(CodecError::AllocatorUnavailable {
                size_mb,
                reason: format!("arena must hold at least {} bytes", INPUT_CHUNK),
            });
        }

        let mut arena = Vec::new();
        arena
            .try_reserve_exact(size)
            .map_err(|e| CodecError::AllocatorUnavailable {
                size_mb,
                reason: e.to_string(),
            })?;
        arena.resize(size, 0);

        trace!(%task, size_mb, "deflate session acquired");
        Ok(Box::new(DeflateSession { task, arena }))
    }
}

struct DeflateSession {
    task: TaskId,
    arena: Vec<u8>,
}

impl DeflateSession {
    /// Run one compressor step into the arena, returning (consumed, produced).
    fn step(
        compress: &mut Compress,
        input: &[u8],
        arena: &mut [u8],
        flush: FlushCompress,
    ) -> Result<(usize, usize, Status), CodecError> {
        let before_in = compress.total_in();
        let before_out = compress.total_out();
        let status = compress
            .compress(input, arena, flush)
            .map_err(|e| CodecError::Compress(e.to_string()))?;
        let consumed = (compress.total_in() - before_in) as usize;
        let produced = (compress.total_out() - before_out) as usize;
        Ok((consumed, produced, status))
    }
}

impl CodecSession for DeflateSession {
    fn encode(&mut self, job: EncodeJob<'_>) -> Result<EncodeStats, CodecError> {
        let mut compress = Compress::new(Compression::new(job.level.min(MAX_LEVEL)), true);
        let mut chunk = vec![0u8; INPUT_CHUNK];
        let mut stats = EncodeStats::default();

        loop {
            let n = match job.input.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let mut offset = 0;
            while offset < n {
                let (consumed, produced, _) = Self::step(
                    &mut compress,
                    &chunk[offset..n],
                    &mut self.arena,
                    FlushCompress::None,
                )?;
                if consumed == 0 && produced == 0 {
                    return Err(CodecError::Compress("compressor made no progress".to_string()));
                }
                job.output.write_all(&self.arena[..produced])?;
                offset += consumed;
                stats.bytes_out += produced as u64;
            }

            stats.bytes_in += n as u64;
            if let Some(progress) = job.progress {
                progress.on_progress(stats.bytes_in, job.input_len);
            }
        }

        loop {
            let (_, produced, status) =
                Self::step(&mut compress, &[], &mut self.arena, FlushCompress::Finish)?;
            job.output.write_all(&self.arena[..produced])?;
            stats.bytes_out += produced as u64;
            if status == Status::StreamEnd {
                break;
            }
            if produced == 0 {
                return Err(CodecError::Compress("stream did not finish".to_string()));
            }
        }

        trace!(
            task = %self.task,
            bytes_in = stats.bytes_in,
            bytes_out = stats.bytes_out,
            "deflate encode finished"
        );
        Ok(stats)
    }
}
