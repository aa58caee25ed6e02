//! Utility functions module
//!
//! Contains helper functions for units formatting and derived metrics.

pub mod units;

// Re-export commonly used functions
pub use units::{bits_per_byte, calculate_throughput_mbps, format_bytes, format_duration};
