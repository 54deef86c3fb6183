//! Media asset records.

use serde::{Deserialize, Serialize};

/// A stored media file referenced by a deck.
///
/// The optional metadata fields double as the probe cache: once populated
/// they are trusted and the file is not probed again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    /// Unique asset identifier.
    pub id: String,

    /// Path to the media file; relative paths resolve against the media root.
    pub path: String,

    /// Natural duration.
    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,

    /// Whether the file carries an audio stream.
    #[serde(default)]
    pub has_audio: Option<bool>,
}

/// Probed (or defaulted) video metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMeta {
    pub duration_ms: u64,
    /// Unknown when the probe failed.
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub has_audio: bool,
}

impl MediaAsset {
    /// Create an asset record with no cached metadata.
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Cached metadata, if the asset has been probed before.
    pub fn cached_meta(&self) -> Option<VideoMeta> {
        self.duration_ms.map(|duration_ms| VideoMeta {
            duration_ms,
            width: self.width,
            height: self.height,
            has_audio: self.has_audio.unwrap_or(false),
        })
    }

    /// Store probe results into the record.
    pub fn apply_meta(&mut self, meta: &VideoMeta) {
        self.duration_ms = Some(meta.duration_ms);
        self.width = meta.width;
        self.height = meta.height;
        self.has_audio = Some(meta.has_audio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cached_meta_requires_duration() {
        let mut asset = MediaAsset::new("a1", "clips/intro.mp4");
        assert!(asset.cached_meta().is_none());

        asset.apply_meta(&VideoMeta {
            duration_ms: 7200,
            width: Some(1920),
            height: Some(1080),
            has_audio: true,
        });
        let meta = asset.cached_meta().unwrap();
        assert_eq!(meta.duration_ms, 7200);
        assert_eq!(meta.width, Some(1920));
        assert!(meta.has_audio);
    }
}
