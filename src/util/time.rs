//! Timing utilities
//!
//! Wall-clock measurement for timing records and duration helpers.

use std::time::{Duration, Instant};

/// Wall-clock timestamp for duration measurements
///
/// This is a thin wrapper around `std::time::Instant` that reports elapsed
/// time in the units timing records accumulate (seconds as `f64`).
#[derive(Debug, Clone, Copy)]
pub struct Timestamp {
    instant: Instant,
}

impl Timestamp {
    /// Create a new timestamp representing the current time
    #[inline]
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
        }
    }

    /// Get the elapsed time since this timestamp
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }

    /// Get the elapsed time in seconds
    #[inline]
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }
}

/// Format a duration in human-readable form
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use geotally::util::time::format_duration;
///
/// assert_eq!(format_duration(Duration::from_nanos(500)), "500ns");
/// assert_eq!(format_duration(Duration::from_nanos(1500)), "1.50us");
/// assert_eq!(format_duration(Duration::from_micros(2500)), "2.50ms");
/// assert_eq!(format_duration(Duration::from_secs(5)), "5.00s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.as_nanos();

    if nanos < 1_000 {
        format!("{}ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.2}us", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2}ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos as f64 / 1_000_000_000.0)
    }
}

/// Average duration of one pass out of `passes` measured together
///
/// ```
/// use std::time::Duration;
/// use geotally::util::time::per_pass;
///
/// assert_eq!(per_pass(Duration::from_secs(3), 4), Duration::from_millis(750));
/// assert_eq!(per_pass(Duration::from_secs(3), 0), Duration::ZERO);
/// ```
pub fn per_pass(total: Duration, passes: usize) -> Duration {
    if passes == 0 {
        return Duration::ZERO;
    }
    total.div_f64(passes as f64)
}
