//! Planned composition units.
//!
//! A segment is one slice of the output timeline. The planner produces the
//! ordered list once per job; nothing mutates it afterwards.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What backs a segment's picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    /// A still frame (rasterized slide) held for the segment duration.
    Image,
    /// A video file, optionally trimmed.
    Video,
}

/// Where a segment's sound comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "source", content = "path")]
pub enum SegmentAudio {
    /// Narration file, fitted to the segment duration.
    Narration(PathBuf),
    /// The video's own audio track, trimmed with the picture.
    Intrinsic,
    /// Synthesized silence for the segment duration.
    Silence,
}

/// Which part of the deck a segment came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "role", content = "index")]
pub enum SegmentOrigin {
    Intro,
    Slide(usize),
    Interstitial(u32),
    Outro,
}

/// One node of the concatenation timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub source_path: PathBuf,
    pub duration_ms: u64,
    pub trim_start_ms: Option<u64>,
    pub trim_end_ms: Option<u64>,
    pub audio: SegmentAudio,
    pub origin: SegmentOrigin,
}

impl Segment {
    /// The narration path, if this segment has one.
    pub fn audio_path(&self) -> Option<&PathBuf> {
        match &self.audio {
            SegmentAudio::Narration(path) => Some(path),
            _ => None,
        }
    }

    /// Start of the source window (0 when untrimmed).
    pub fn window_start_ms(&self) -> u64 {
        self.trim_start_ms.unwrap_or(0)
    }

    /// End of the source window.
    pub fn window_end_ms(&self) -> u64 {
        self.trim_end_ms
            .unwrap_or_else(|| self.window_start_ms() + self.duration_ms)
    }
}

/// Sum of all segment durations: the planned output length.
pub fn total_planned_ms(segments: &[Segment]) -> u64 {
    segments.iter().map(|s| s.duration_ms).sum()
}
