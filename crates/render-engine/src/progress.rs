//! Encoder progress parsing and progress bands.

/// State accumulated from ffmpeg's `-progress pipe:1` key/value stream.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ProgressState {
    pub encoded_ms: u64,
    pub complete: bool,
}

impl ProgressState {
    /// Fold one `key=value` line into the state.
    pub fn update(&mut self, key: &str, value: &str) {
        match key {
            // ffmpeg reports out_time_ms in microseconds as well.
            "out_time_ms" | "out_time_us" => {
                if let Ok(us) = value.trim().parse::<i64>() {
                    self.encoded_ms = (us.max(0) / 1000) as u64;
                }
            }
            "progress" => {
                self.complete = value.trim() == "end";
            }
            _ => {}
        }
    }

    /// Parse a raw line. Returns `true` when it closed a progress block.
    pub fn feed_line(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        match trimmed.split_once('=') {
            Some((key, value)) => {
                self.update(key, value);
                key == "progress"
            }
            None => false,
        }
    }
}

/// Highest percentage the encoder stream itself may report. 100 is only
/// reached once the encoder has exited cleanly and the output exists.
pub const IN_STREAM_CAP: f64 = 99.9;

/// Turns encoded time into a non-decreasing percentage of the planned total.
#[derive(Debug, Clone)]
pub struct EncodeProgress {
    total_ms: u64,
    last_percent: f64,
}

impl EncodeProgress {
    pub fn new(total_planned_ms: u64) -> Self {
        Self {
            total_ms: total_planned_ms,
            last_percent: 0.0,
        }
    }

    /// `min(IN_STREAM_CAP, encoded / total)`, never lower than a previous
    /// report.
    pub fn percent(&mut self, state: &ProgressState) -> f64 {
        let raw = if state.complete {
            IN_STREAM_CAP
        } else if self.total_ms == 0 {
            0.0
        } else {
            (state.encoded_ms as f64 / self.total_ms as f64 * 100.0).min(IN_STREAM_CAP)
        };
        self.last_percent = self.last_percent.max(raw);
        self.last_percent
    }
}

/// A slice `[start, end]` of a job's overall 0–100 progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub start: f64,
    pub end: f64,
}

impl ProgressBand {
    pub const STARTUP: ProgressBand = ProgressBand::new(0.0, 10.0);
    pub const RASTERIZE: ProgressBand = ProgressBand::new(10.0, 65.0);
    pub const COMPOSE: ProgressBand = ProgressBand::new(70.0, 95.0);
    pub const FINALIZE: ProgressBand = ProgressBand::new(95.0, 100.0);

    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Map a phase-local percentage into the band.
    pub fn map(&self, phase_percent: f64) -> f64 {
        let fraction = (phase_percent / 100.0).clamp(0.0, 1.0);
        self.start + (self.end - self.start) * fraction
    }

    /// Map step `done` of `total` into the band.
    pub fn step(&self, done: usize, total: usize) -> f64 {
        if total == 0 {
            return self.end;
        }
        self.map(done as f64 / total as f64 * 100.0)
    }
}
