//! Result reporting module
//!
//! Turns the two run timings into a speedup ratio and a host classification,
//! and renders the per-run lines printed by the benchmark driver.

use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::bench::RunReport;
use crate::util::units::{bits_per_byte, calculate_throughput_mbps, format_duration};

pub mod progress;

pub use progress::{ChannelProgress, ProgressEvent, ProgressHub, BAR_WIDTH};

/// What the speedup ratio says about the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HostClass {
    /// Concurrent run took less than 70% of the sequential time
    Multiprocessor,
    /// Concurrent run was faster, but by less than 30%
    HyperThreaded,
    /// No gain from threading
    Standard,
}

impl HostClass {
    /// Classify from the sequential (`T1`) and concurrent (`T2`) elapsed times.
    ///
    /// `T2 = 0.7 * T1` is `HyperThreaded` and `T2 = T1` is `Standard`. The
    /// comparison runs on integer nanoseconds so the boundaries are exact.
    pub fn classify(sequential: Duration, concurrent: Duration) -> Self {
        let t1 = sequential.as_nanos();
        let t2 = concurrent.as_nanos();
        if t2 * 10 < t1 * 7 {
            HostClass::Multiprocessor
        } else if t2 < t1 {
            HostClass::HyperThreaded
        } else {
            HostClass::Standard
        }
    }

    /// Phrase used in the verdict line
    pub fn description(&self) -> &'static str {
        match self {
            HostClass::Multiprocessor => "multiprocessor PC",
            HostClass::HyperThreaded => "hyper-threading PC",
            HostClass::Standard => "standard PC",
        }
    }
}

impl fmt::Display for HostClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostClass::Multiprocessor => write!(f, "multiprocessor"),
            HostClass::HyperThreaded => write!(f, "hyper-threaded"),
            HostClass::Standard => write!(f, "standard"),
        }
    }
}

/// Concurrent over sequential elapsed time.
///
/// A zero sequential time gives `1.0` when the concurrent time is also zero and
/// infinity otherwise.
pub fn speedup_ratio(sequential: Duration, concurrent: Duration) -> f64 {
    if sequential.is_zero() {
        if concurrent.is_zero() {
            1.0
        } else {
            f64::INFINITY
        }
    } else {
        concurrent.as_secs_f64() / sequential.as_secs_f64()
    }
}

/// Sequential vs concurrent timing comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub sequential: Duration,
    pub concurrent: Duration,
    pub ratio: f64,
    pub class: HostClass,
}

impl Comparison {
    pub fn new(sequential: Duration, concurrent: Duration) -> Self {
        Self {
            sequential,
            concurrent,
            ratio: speedup_ratio(sequential, concurrent),
            class: HostClass::classify(sequential, concurrent),
        }
    }

    pub fn from_reports(sequential: &RunReport, concurrent: &RunReport) -> Self {
        Self::new(sequential.elapsed, concurrent.elapsed)
    }

    pub fn verdict_line(&self) -> String {
        format!(
            "Perhaps you have a {} (speedup ratio {:.2})",
            self.class.description(),
            self.ratio
        )
    }
}

/// "done in ..." line for a finished run
pub fn run_line(report: &RunReport) -> String {
    let failed = report.failures().count();
    let throughput = calculate_throughput_mbps(report.bytes_in(), report.elapsed);
    let (bytes_in, bytes_out) = report
        .succeeded()
        .fold((0, 0), |(i, o), t| (i + t.stats.bytes_in, o + t.stats.bytes_out));
    let mut line = format!(
        "done in {} ({:.1} MiB/s, {:.2} bits/byte over {} tasks",
        format_duration(report.elapsed),
        throughput,
        bits_per_byte(bytes_in, bytes_out),
        report.task_count()
    );
    if failed > 0 {
        line.push_str(&format!(", {} failed", failed));
    }
    line.push(')');
    line
}

/// One line per failed task, or `None` when every task succeeded.
pub fn failure_summary(report: &RunReport) -> Option<String> {
    let lines: Vec<String> = report
        .failures()
        .filter_map(|outcome| {
            outcome
                .status
                .error()
                .map(|err| format!("  task {}: {} - {}", outcome.id, err.kind(), err))
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(format!(
            "{} of {} {} tasks failed:\n{}",
            lines.len(),
            report.task_count(),
            report.mode,
            lines.join("\n")
        ))
    }
}
