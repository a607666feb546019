//! Logging helpers for progress and throughput reporting.

use std::time::{Duration, Instant};

/// Formats a record count compactly: exact below ten thousand, scaled
/// with a k/M/G suffix above (e.g. "9482", "12.6k", "3.1M").
///
/// Sort runs routinely move hundreds of millions of records; the scaled
/// form keeps phase summaries readable at that magnitude.
#[must_use]
pub fn format_records(n: u64) -> String {
    const SCALES: [(u64, &str); 3] = [(1_000_000_000, "G"), (1_000_000, "M"), (1_000, "k")];
    if n < 10_000 {
        return n.to_string();
    }
    for (scale, suffix) in SCALES {
        if n >= scale {
            return format!("{:.1}{suffix}", n as f64 / scale as f64);
        }
    }
    n.to_string()
}

/// Formats a duration at sort-appropriate resolution: milliseconds under
/// a second, tenths of a second under a minute, whole units above
/// (e.g. "840ms", "12.3s", "2m05s", "1h15m").
///
/// Small benchmark sorts finish well under a second, so the sub-second
/// range keeps real precision instead of rounding to "0s".
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs < 1.0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        let whole = duration.as_secs();
        let mins = whole / 60;
        if mins < 60 {
            format!("{}m{:02}s", mins, whole % 60)
        } else {
            format!("{}h{:02}m", mins / 60, mins % 60)
        }
    }
}

/// Formats sustained throughput as records per second (e.g.
/// "1.4M records/s"). Returns "-" for a zero-length interval.
#[must_use]
pub fn format_throughput(records: u64, duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs <= f64::EPSILON {
        return "-".to_string();
    }
    format!("{} records/s", format_records((records as f64 / secs) as u64))
}

/// Operation timing and summary helper.
///
/// # Examples
///
/// ```no_run
/// use exsort_lib::logging::OperationTimer;
///
/// let timer = OperationTimer::new("Sorting");
///
/// // ... do work ...
///
/// timer.log_completion(10_000); // records processed
/// ```
pub struct OperationTimer {
    operation: String,
    start_time: Instant,
}

impl OperationTimer {
    /// Creates a new operation timer and logs the start.
    #[must_use]
    pub fn new(operation: &str) -> Self {
        log::info!("{operation} ...");
        Self { operation: operation.to_string(), start_time: Instant::now() }
    }

    /// Logs the completion with the number of records processed and the
    /// sustained throughput.
    pub fn log_completion(&self, records: u64) {
        let duration = self.start_time.elapsed();
        log::info!(
            "{} completed: {} records in {} ({})",
            self.operation,
            format_records(records),
            format_duration(duration),
            format_throughput(records, duration)
        );
    }
}
