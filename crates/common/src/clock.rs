//! Clock and duration helpers.
//!
//! Job records carry wall-clock timestamps (`created_at`/`updated_at`) so a
//! supervising layer can spot stale jobs, while phase timings use a monotonic
//! stopwatch. Segment durations are kept in integer milliseconds throughout
//! the pipeline and only turned into fractional seconds at the encoder
//! boundary.

use std::time::Instant;

use chrono::{DateTime, Utc};

/// Current wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Convert milliseconds to fractional seconds.
pub fn ms_to_secs(ms: u64) -> f64 {
    ms as f64 / 1000.0
}

/// Convert fractional seconds to whole milliseconds (rounded, never negative).
pub fn secs_to_ms(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * 1000.0).round() as u64
}

/// Format a millisecond duration as seconds for encoder arguments.
pub fn format_secs(ms: u64) -> String {
    format!("{:.3}", ms_to_secs(ms))
}

/// Monotonic stopwatch for logging phase timings.
#[derive(Debug, Clone)]
pub struct Stopwatch {
    started: Instant,
}

impl Stopwatch {
    /// Start measuring now.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Milliseconds since start.
    pub fn elapsed_ms(&self) -> u128 {
        self.started.elapsed().as_millis()
    }

    /// Seconds since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }
}
