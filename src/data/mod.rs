//! Synthetic test data module
//!
//! Produces the shared, read-only input that every encode task consumes.

pub mod generator;

pub use generator::{generate, MarkovSource, TestFile};
