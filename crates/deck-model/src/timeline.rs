//! Timeline items: intro, outro, and interstitial video attachments.

use serde::{Deserialize, Serialize};

/// Role of a timeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineItemKind {
    Intro,
    Outro,
    Interstitial,
}

/// A video attached to the deck timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineItem {
    #[serde(rename = "type")]
    pub kind: TimelineItemKind,

    /// Path of the video asset.
    pub asset_path: String,

    /// Interstitials: inserted before the slide with this index.
    /// Values at or past the slide count append after the last slide.
    #[serde(default)]
    pub position: u32,

    /// Start of the used window within the asset.
    #[serde(default)]
    pub start_time_ms: u64,

    /// End of the used window; when absent, `start + duration` is used.
    #[serde(default)]
    pub end_time_ms: Option<u64>,

    /// Length of the window when no end is set.
    #[serde(default)]
    pub duration_ms: u64,
}

impl TimelineItem {
    /// The `[start, end)` window of the asset this item uses.
    ///
    /// An explicit end wins when it lies after the start; otherwise the
    /// window spans `duration_ms`. `None` means the window is empty.
    pub fn window_ms(&self) -> Option<(u64, u64)> {
        let start = self.start_time_ms;
        let end = match self.end_time_ms {
            Some(end) if end > start => end,
            _ => start.saturating_add(self.duration_ms),
        };
        (end > start).then_some((start, end))
    }
}
