//! Units formatting and conversion utilities
//!
//! Human-readable sizes, durations, throughput, and compression density.

use std::time::Duration;

/// Format bytes into human-readable size with binary units
///
/// # Examples
/// ```
/// use mtenc::util::units::format_bytes;
///
/// assert_eq!(format_bytes(1024), "1.0 KiB");
/// assert_eq!(format_bytes(16 * 1024 * 1024), "16.0 MiB");
/// ```
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

/// Format duration into human-readable string
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use mtenc::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    match total_secs {
        3600.. => {
            format!("{}h {}m {}s", total_secs / 3600, (total_secs % 3600) / 60, total_secs % 60)
        }
        60.. => format!("{}m {}s", total_secs / 60, total_secs % 60),
        1.. if millis > 0 => format!("{}.{:02}s", total_secs, millis / 10),
        1.. => format!("{}s", total_secs),
        _ => format!("{}ms", millis),
    }
}

/// Throughput in MiB/s; zero for a zero duration
pub fn calculate_throughput_mbps(bytes: u64, duration: Duration) -> f64 {
    if duration.is_zero() {
        return 0.0;
    }
    bytes as f64 / 1_048_576.0 / duration.as_secs_f64()
}

/// Output bits per input byte; zero for empty input
///
/// # Examples
/// ```
/// use mtenc::util::units::bits_per_byte;
///
/// assert_eq!(bits_per_byte(1000, 250), 2.0);
/// ```
pub fn bits_per_byte(bytes_in: u64, bytes_out: u64) -> f64 {
    if bytes_in == 0 {
        return 0.0;
    }
    8.0 * bytes_out as f64 / bytes_in as f64
}
