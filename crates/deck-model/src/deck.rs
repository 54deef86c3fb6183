//! Deck and slide types.
//!
//! A deck is an ordered list of slides. Each slide selects one of a fixed set
//! of layouts and carries the structured content that layout renders.

use serde::{Deserialize, Serialize};

use crate::asset::MediaAsset;

/// Default on-screen time for a slide that does not specify one.
pub const DEFAULT_SLIDE_DURATION_MS: u64 = 5000;

/// Deck metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deck {
    /// Unique deck identifier.
    pub id: String,

    /// Human-readable title.
    pub title: String,

    /// Output framing.
    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    /// Default background color (CSS color) for slides that set none.
    #[serde(default)]
    pub theme_background: Option<String>,
}

/// Output aspect ratio of a deck.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AspectRatio {
    /// 16:9 widescreen.
    #[default]
    #[serde(rename = "16:9")]
    Widescreen,
    /// 9:16 vertical.
    #[serde(rename = "9:16")]
    Vertical,
    /// 1:1 square.
    #[serde(rename = "1:1")]
    Square,
    /// 4:3 classic.
    #[serde(rename = "4:3")]
    Classic,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Vertical => "9:16",
            AspectRatio::Square => "1:1",
            AspectRatio::Classic => "4:3",
        }
    }
}

/// A single slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    /// Unique slide identifier.
    pub id: String,

    /// Ordering key within the deck.
    pub position: u32,

    /// Layout template.
    pub layout: SlideLayout,

    /// Structured content rendered by the layout.
    #[serde(default)]
    pub content: SlideContent,

    /// How long the slide stays on screen.
    #[serde(default = "default_slide_duration")]
    pub duration_ms: u64,

    /// Narration audio for this slide, if any.
    #[serde(default)]
    pub narration_audio_path: Option<String>,

    /// Embedded video replacing the rendered layout.
    #[serde(default)]
    pub video: Option<SlideVideo>,
}

fn default_slide_duration() -> u64 {
    DEFAULT_SLIDE_DURATION_MS
}

/// Fixed set of slide layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SlideLayout {
    TitleOnly,
    TitleBody,
    TitleBullets,
    TwoColumn,
    Centered,
    Quote,
    StatsGrid,
    Comparison,
    ImageText,
}

impl SlideLayout {
    pub fn as_str(self) -> &'static str {
        match self {
            SlideLayout::TitleOnly => "title-only",
            SlideLayout::TitleBody => "title-body",
            SlideLayout::TitleBullets => "title-bullets",
            SlideLayout::TwoColumn => "two-column",
            SlideLayout::Centered => "centered",
            SlideLayout::Quote => "quote",
            SlideLayout::StatsGrid => "stats-grid",
            SlideLayout::Comparison => "comparison",
            SlideLayout::ImageText => "image-text",
        }
    }
}

/// Content fields consumed by the layouts. Each layout reads the subset it
/// needs and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlideContent {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub body: Option<String>,
    pub bullets: Vec<String>,
    pub stats: Vec<Stat>,
    /// Two-column layout: left and right text blocks.
    pub left_column: Option<String>,
    pub right_column: Option<String>,
    /// Comparison layout: the two sides.
    pub comparison: Option<Comparison>,
    /// Quote layout.
    pub quote: Option<String>,
    pub attribution: Option<String>,
    pub image: Option<SlideImage>,
    /// CSS color; falls back to the deck theme.
    pub background_color: Option<String>,
}

/// One cell of a stats grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stat {
    pub value: String,
    pub label: String,
}

/// Two-sided comparison content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub left: ComparisonSide,
    pub right: ComparisonSide,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSide {
    pub heading: String,
    #[serde(default)]
    pub items: Vec<String>,
}

/// An image placed on a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideImage {
    /// Path or URL of the image.
    pub src: String,
    #[serde(default)]
    pub placement: ImagePlacement,
}

/// Where an image sits relative to the slide text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePlacement {
    #[default]
    Background,
    Left,
    Right,
}

/// A video embedded in a slide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideVideo {
    pub asset: MediaAsset,
    #[serde(default)]
    pub trim_start_ms: Option<u64>,
    #[serde(default)]
    pub trim_end_ms: Option<u64>,
}

impl Slide {
    /// Whether the slide is backed by an embedded video.
    pub fn is_video(&self) -> bool {
        self.video.is_some()
    }

    /// Narration path, ignoring blank strings.
    pub fn narration(&self) -> Option<&str> {
        self.narration_audio_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_deserialization_defaults() {
        let slide: Slide = serde_json::from_str(
            r#"{"id": "s1", "position": 0, "layout": "title-bullets",
                "content": {"title": "Agenda", "bullets": ["One", "Two"]}}"#,
        )
        .unwrap();
        assert_eq!(slide.layout, SlideLayout::TitleBullets);
        assert_eq!(slide.duration_ms, DEFAULT_SLIDE_DURATION_MS);
        assert_eq!(slide.content.bullets.len(), 2);
        assert!(slide.narration().is_none());
        assert!(!slide.is_video());
    }

    #[test]
    fn test_blank_narration_is_absent() {
        let slide = Slide {
            id: "s".into(),
            position: 0,
            layout: SlideLayout::TitleOnly,
            content: SlideContent::default(),
            duration_ms: 1000,
            narration_audio_path: Some("   ".into()),
            video: None,
        };
        assert!(slide.narration().is_none());
    }

    #[test]
    fn test_aspect_ratio_serde_names() {
        let json = serde_json::to_string(&AspectRatio::Vertical).unwrap();
        assert_eq!(json, "\"9:16\"");
        let parsed: AspectRatio = serde_json::from_str("\"4:3\"").unwrap();
        assert_eq!(parsed, AspectRatio::Classic);
        assert_eq!(SlideLayout::StatsGrid.as_str(), "stats-grid");
    }
}
