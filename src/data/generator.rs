//! Order-2 Markov test data
//!
//! Each byte is `prev + 11 * prev_prev + r` with `r` uniform in `0..4`, so the
//! stream carries 2 bits of entropy per byte while looking noisy to a codec
//! that does not know the model.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::debug;
use crate::{MtEncError, Result};

const WRITE_CHUNK: usize = 64 * 1024;

/// Infinite byte source following the order-2 chain.
#[derive(Debug)]
pub struct MarkovSource<'a, R: Rng> {
    rng: &'a mut R,
    prev: u8,
    prev_prev: u8,
}

impl<'a, R: Rng> MarkovSource<'a, R> {
    /// Start the chain from two zero bytes.
    pub fn new(rng: &'a mut R) -> Self {
        Self {
            rng,
            prev: 0,
            prev_prev: 0,
        }
    }
}

impl<R: Rng> Iterator for MarkovSource<'_, R> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let noise: u8 = self.rng.gen_range(0..4);
        let next = self
            .prev
            .wrapping_add(self.prev_prev.wrapping_mul(11))
            .wrapping_add(noise);
        self.prev_prev = self.prev;
        self.prev = next;
        Some(next)
    }
}

/// Generate `size` bytes of chain output using the caller's PRNG.
pub fn generate<R: Rng>(size: usize, rng: &mut R) -> Vec<u8> {
    MarkovSource::new(rng).take(size).collect()
}

/// The shared benchmark input on disk.
///
/// Removed on drop unless [`TestFile::keep_on_drop`] was called.
#[derive(Debug)]
pub struct TestFile {
    path: PathBuf,
    len: u64,
    cleanup_on_drop: bool,
}

impl TestFile {
    /// Write `size` bytes of chain output seeded with `seed` to `path`.
    pub fn create(path: impl Into<PathBuf>, size: u64, seed: u64) -> Result<Self> {
        let path = path.into();
        let mut rng = SmallRng::seed_from_u64(seed);

        let file = File::create(&path).map_err(|e| {
            MtEncError::DataGeneration(format!("Failed to create {}: {}", path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        let mut source = MarkovSource::new(&mut rng);
        let mut chunk = Vec::with_capacity(WRITE_CHUNK);
        let mut written = 0u64;

        while written < size {
            let take = std::cmp::min(WRITE_CHUNK as u64, size - written) as usize;
            chunk.clear();
            chunk.extend(source.by_ref().take(take));
            writer.write_all(&chunk).map_err(|e| {
                MtEncError::DataGeneration(format!(
                    "Write to {} failed at byte {}: {}", path.display(), written, e
                ))
            })?;
            written += take as u64;
        }

        writer.flush().map_err(|e| {
            MtEncError::DataGeneration(format!("Flush of {} failed: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), size, seed, "test file generated");

        Ok(Self {
            path,
            len: size,
            cleanup_on_drop: true,
        })
    }

    /// Leave the file in place when this handle is dropped.
    pub fn keep_on_drop(&mut self) {
        self.cleanup_on_drop = false;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for TestFile {
    fn drop(&mut self) {
        if self.cleanup_on_drop {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
