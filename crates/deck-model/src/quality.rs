//! Render quality presets.

use serde::{Deserialize, Serialize};

use crate::deck::AspectRatio;
use crate::job::RenderKind;

/// x264 speed/quality trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncoderPreset {
    Ultrafast,
    Veryfast,
    Fast,
    Medium,
    Slow,
}

impl EncoderPreset {
    pub fn as_str(self) -> &'static str {
        match self {
            EncoderPreset::Ultrafast => "ultrafast",
            EncoderPreset::Veryfast => "veryfast",
            EncoderPreset::Fast => "fast",
            EncoderPreset::Medium => "medium",
            EncoderPreset::Slow => "slow",
        }
    }
}

/// Output encoding settings, fixed for the life of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualitySettings {
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub audio_bitrate_kbps: u32,
    pub fps: u32,
    pub encoder_preset: EncoderPreset,
}

impl QualitySettings {
    /// Base preset for a render kind, before aspect adjustment.
    pub fn preset(kind: RenderKind) -> Self {
        match kind {
            RenderKind::Preview => Self {
                width: 1280,
                height: 720,
                video_bitrate_kbps: 2000,
                audio_bitrate_kbps: 128,
                fps: 30,
                encoder_preset: EncoderPreset::Fast,
            },
            RenderKind::Final => Self {
                width: 1920,
                height: 1080,
                video_bitrate_kbps: 5000,
                audio_bitrate_kbps: 192,
                fps: 30,
                encoder_preset: EncoderPreset::Medium,
            },
        }
    }

    /// Resolve the settings for a job from its kind and the deck framing.
    pub fn resolve(kind: RenderKind, aspect: AspectRatio) -> Self {
        let base = Self::preset(kind);
        let (width, height) = match aspect {
            AspectRatio::Widescreen => (base.width, base.height),
            AspectRatio::Vertical => (base.height, base.width),
            AspectRatio::Square => (base.height, base.height),
            AspectRatio::Classic => (base.width, base.width * 3 / 4),
        };
        Self {
            width: even(width),
            height: even(height),
            ..base
        }
    }
}

/// H.264 with 4:2:0 chroma needs even dimensions.
fn even(value: u32) -> u32 {
    (value & !1).max(2)
}
