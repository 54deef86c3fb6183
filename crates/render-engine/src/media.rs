//! Media asset resolution: path resolution and ffprobe metadata.
//!
//! A failed probe never fails a render. The resolver logs a warning and
//! substitutes the configured default duration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use deckreel_common::clock::secs_to_ms;
use deckreel_common::config::AppConfig;
use deckreel_deck_model::asset::{MediaAsset, VideoMeta};
use deckreel_deck_model::bundle::DeckBundle;
use serde::Deserialize;
use tokio::process::Command;

/// Metadata resolved for one referenced media path.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub meta: VideoMeta,
    /// `false` when `meta` is a fallback after a failed probe.
    pub probed: bool,
}

/// Everything the planner needs to know about a deck's media.
///
/// Entries are keyed by the path string as written in the deck.
#[derive(Debug, Clone, Default)]
pub struct ResolvedMedia {
    media_root: PathBuf,
    videos: HashMap<String, ResolvedAsset>,
}

impl ResolvedMedia {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self {
            media_root: media_root.into(),
            videos: HashMap::new(),
        }
    }

    pub fn insert(&mut self, reference: impl Into<String>, asset: ResolvedAsset) {
        self.videos.insert(reference.into(), asset);
    }

    /// Record a successfully probed video under `reference`.
    pub fn insert_probed(&mut self, reference: &str, meta: VideoMeta) {
        let path = self.path(reference);
        self.insert(
            reference,
            ResolvedAsset {
                path,
                meta,
                probed: true,
            },
        );
    }

    pub fn video(&self, reference: &str) -> Option<&ResolvedAsset> {
        self.videos.get(reference)
    }

    /// Absolute path of a media reference.
    pub fn path(&self, reference: &str) -> PathBuf {
        resolve_media_path(&self.media_root, reference)
    }

    pub fn len(&self) -> usize {
        self.videos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.videos.is_empty()
    }
}

/// Result of resolving a whole bundle.
#[derive(Debug, Clone)]
pub struct ResolvedBundle {
    pub media: ResolvedMedia,
    /// Slide video assets whose cached metadata changed and should be
    /// written back to the deck store.
    pub updated_assets: Vec<MediaAsset>,
}

/// Join relative paths onto the media root; absolute paths pass through.
pub fn resolve_media_path(media_root: &Path, reference: &str) -> PathBuf {
    let path = Path::new(reference.trim());
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        media_root.join(path)
    }
}

/// Resolves media paths and probes video metadata with ffprobe.
#[derive(Debug)]
pub struct MediaResolver {
    media_root: PathBuf,
    ffprobe: PathBuf,
    default_duration_ms: u64,
    cache: Mutex<HashMap<PathBuf, VideoMeta>>,
}

impl MediaResolver {
    pub fn new(
        media_root: impl Into<PathBuf>,
        ffprobe: impl Into<PathBuf>,
        default_duration_ms: u64,
    ) -> Self {
        Self {
            media_root: media_root.into(),
            ffprobe: ffprobe.into(),
            default_duration_ms,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.media_root.clone(),
            config.tools.ffprobe.clone(),
            config.render.default_probe_duration_ms,
        )
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    pub fn resolve_path(&self, reference: &str) -> PathBuf {
        resolve_media_path(&self.media_root, reference)
    }

    /// Metadata for an asset record, probing at most once.
    ///
    /// Successful probes are cached into `asset`. Returns the metadata and
    /// whether it came from a real probe.
    pub async fn resolve_video_meta(&self, asset: &mut MediaAsset) -> (VideoMeta, bool) {
        if let Some(meta) = asset.cached_meta() {
            return (meta, true);
        }
        let path = self.resolve_path(&asset.path);
        let (meta, probed) = self.probe_path(&path).await;
        if probed {
            asset.apply_meta(&meta);
        }
        (meta, probed)
    }

    /// Probe a file, consulting the process-wide cache first.
    pub async fn probe_path(&self, path: &Path) -> (VideoMeta, bool) {
        if let Some(meta) = self.cached(path) {
            return (meta, true);
        }

        match self.run_ffprobe(path).await {
            Ok(meta) => {
                tracing::debug!(
                    path = %path.display(),
                    duration_ms = meta.duration_ms,
                    has_audio = meta.has_audio,
                    "Probed media"
                );
                self.cache
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(path.to_path_buf(), meta);
                (meta, true)
            }
            Err(reason) => {
                tracing::warn!(
                    path = %path.display(),
                    reason = %reason,
                    fallback_ms = self.default_duration_ms,
                    "Media probe failed; using default duration"
                );
                (self.fallback_meta(), false)
            }
        }
    }

    /// Resolve every video a bundle references.
    pub async fn resolve_bundle(&self, bundle: &mut DeckBundle) -> ResolvedBundle {
        let mut media = ResolvedMedia::new(&self.media_root);
        let mut updated_assets = Vec::new();

        for slide in &mut bundle.slides {
            let Some(video) = slide.video.as_mut() else {
                continue;
            };
            let had_cache = video.asset.cached_meta().is_some();
            let (meta, probed) = self.resolve_video_meta(&mut video.asset).await;
            if probed && !had_cache {
                updated_assets.push(video.asset.clone());
            }
            media.insert(
                video.asset.path.clone(),
                ResolvedAsset {
                    path: self.resolve_path(&video.asset.path),
                    meta,
                    probed,
                },
            );
        }

        for item in &bundle.timeline {
            if media.video(&item.asset_path).is_some() {
                continue;
            }
            let path = self.resolve_path(&item.asset_path);
            let (meta, probed) = self.probe_path(&path).await;
            media.insert(item.asset_path.clone(), ResolvedAsset { path, meta, probed });
        }

        ResolvedBundle {
            media,
            updated_assets,
        }
    }

    fn cached(&self, path: &Path) -> Option<VideoMeta> {
        self.cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .copied()
    }

    fn fallback_meta(&self) -> VideoMeta {
        VideoMeta {
            duration_ms: self.default_duration_ms,
            width: None,
            height: None,
            has_audio: false,
        }
    }

    async fn run_ffprobe(&self, path: &Path) -> Result<VideoMeta, String> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.ffprobe.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("ffprobe exited with {}: {}", output.status, stderr.trim()));
        }

        parse_probe_output(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    codec_type: Option<String>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    duration: Option<String>,
}

fn parse_seconds_ms(raw: Option<&str>) -> Option<u64> {
    let ms = secs_to_ms(raw?.trim().parse::<f64>().ok()?);
    (ms > 0).then_some(ms)
}

fn parse_probe_output(stdout: &[u8]) -> Result<VideoMeta, String> {
    let probe: ProbeOutput =
        serde_json::from_slice(stdout).map_err(|e| format!("unreadable ffprobe output: {e}"))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let duration_ms = parse_seconds_ms(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .or_else(|| parse_seconds_ms(video.and_then(|v| v.duration.as_deref())))
        .ok_or_else(|| "no usable duration in ffprobe output".to_string())?;

    Ok(VideoMeta {
        duration_ms,
        width: video.and_then(|v| v.width).filter(|w| *w > 0),
        height: video.and_then(|v| v.height).filter(|h| *h > 0),
        has_audio,
    })
}
