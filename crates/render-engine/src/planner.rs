//! Segment planning.
//!
//! Turns slides plus timeline items into the ordered segment list the
//! compositor concatenates:
//!
//! ```text
//! [intro] ( [interstitials @ i]* slide_i )* [interstitials @ >= N]* [outro]
//! ```
//!
//! Planning is pure. Media metadata must already be resolved.

use std::path::{Path, PathBuf};

use deckreel_common::error::{DeckreelError, DeckreelResult};
use deckreel_deck_model::deck::{Slide, DEFAULT_SLIDE_DURATION_MS};
use deckreel_deck_model::segment::{Segment, SegmentAudio, SegmentKind, SegmentOrigin};
use deckreel_deck_model::timeline::{TimelineItem, TimelineItemKind};

use crate::media::ResolvedMedia;

/// Builds segment lists for one job.
#[derive(Debug, Clone)]
pub struct SegmentPlanner {
    frame_dir: PathBuf,
}

impl SegmentPlanner {
    /// `frame_dir` is where rasterized slide frames will be written.
    pub fn new(frame_dir: impl Into<PathBuf>) -> Self {
        Self {
            frame_dir: frame_dir.into(),
        }
    }

    pub fn frame_dir(&self) -> &Path {
        &self.frame_dir
    }

    /// Path of the still frame for slide `index`.
    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.frame_dir.join(format!("slide_{index:03}.png"))
    }

    /// Plan the segment list. `slides` must already be in position order.
    pub fn plan(
        &self,
        slides: &[Slide],
        timeline: &[TimelineItem],
        media: &ResolvedMedia,
    ) -> DeckreelResult<Vec<Segment>> {
        let intro = single_item(timeline, TimelineItemKind::Intro)?;
        let outro = single_item(timeline, TimelineItemKind::Outro)?;

        let mut interstitials: Vec<&TimelineItem> = timeline
            .iter()
            .filter(|item| item.kind == TimelineItemKind::Interstitial)
            .collect();
        // Stable: equal positions keep their input order.
        interstitials.sort_by_key(|item| item.position);

        let mut segments = Vec::with_capacity(slides.len() + timeline.len());

        if let Some(item) = intro {
            segments.extend(timeline_segment(item, SegmentOrigin::Intro, media));
        }

        let mut pending = interstitials.iter().peekable();
        for (index, slide) in slides.iter().enumerate() {
            while let Some(item) = pending.next_if(|item| item.position as usize <= index) {
                segments.extend(timeline_segment(
                    item,
                    SegmentOrigin::Interstitial(item.position),
                    media,
                ));
            }
            segments.push(self.slide_segment(index, slide, media));
        }

        for item in pending {
            segments.extend(timeline_segment(
                item,
                SegmentOrigin::Interstitial(item.position),
                media,
            ));
        }

        if let Some(item) = outro {
            segments.extend(timeline_segment(item, SegmentOrigin::Outro, media));
        }

        tracing::debug!(
            slides = slides.len(),
            timeline_items = timeline.len(),
            segments = segments.len(),
            "Planned segments"
        );
        Ok(segments)
    }

    fn slide_segment(&self, index: usize, slide: &Slide, media: &ResolvedMedia) -> Segment {
        let narration = slide
            .narration()
            .map(|path| SegmentAudio::Narration(media.path(path)));

        match &slide.video {
            Some(video) => {
                let resolved = media.video(&video.asset.path);
                let natural_ms = resolved.filter(|r| r.probed).map(|r| r.meta.duration_ms);
                let has_audio = resolved.map(|r| r.meta.has_audio).unwrap_or(false);

                let (duration_ms, trim_start_ms, trim_end_ms) = slide_video_window(
                    video.trim_start_ms,
                    video.trim_end_ms,
                    natural_ms,
                    slide.duration_ms,
                )
                .unwrap_or_else(|| {
                    tracing::warn!(
                        slide = %slide.id,
                        trim_start_ms = ?video.trim_start_ms,
                        trim_end_ms = ?video.trim_end_ms,
                        "Video trim window is empty; using the untrimmed clip"
                    );
                    (natural_ms.unwrap_or(slide.duration_ms), None, None)
                });

                let audio = narration.unwrap_or(if has_audio {
                    SegmentAudio::Intrinsic
                } else {
                    SegmentAudio::Silence
                });

                Segment {
                    kind: SegmentKind::Video,
                    source_path: resolved
                        .map(|r| r.path.clone())
                        .unwrap_or_else(|| media.path(&video.asset.path)),
                    duration_ms: duration_ms.max(1),
                    trim_start_ms,
                    trim_end_ms,
                    audio,
                    origin: SegmentOrigin::Slide(index),
                }
            }
            None => {
                let duration_ms = if slide.duration_ms == 0 {
                    tracing::warn!(slide = %slide.id, "Slide has zero duration; using default");
                    DEFAULT_SLIDE_DURATION_MS
                } else {
                    slide.duration_ms
                };
                Segment {
                    kind: SegmentKind::Image,
                    source_path: self.frame_path(index),
                    duration_ms,
                    trim_start_ms: None,
                    trim_end_ms: None,
                    audio: narration.unwrap_or(SegmentAudio::Silence),
                    origin: SegmentOrigin::Slide(index),
                }
            }
        }
    }
}

fn single_item(
    timeline: &[TimelineItem],
    kind: TimelineItemKind,
) -> DeckreelResult<Option<&TimelineItem>> {
    let mut matching = timeline.iter().filter(|item| item.kind == kind);
    let first = matching.next();
    if matching.next().is_some() {
        return Err(DeckreelError::validation(format!(
            "Deck timeline has more than one {kind:?} item"
        )));
    }
    Ok(first)
}

/// Window of a slide video: `(duration, trim_start, trim_end)`.
///
/// `None` when the requested trims leave nothing to play.
fn slide_video_window(
    trim_start: Option<u64>,
    trim_end: Option<u64>,
    natural_ms: Option<u64>,
    fallback_ms: u64,
) -> Option<(u64, Option<u64>, Option<u64>)> {
    if trim_start.is_none() && trim_end.is_none() {
        return Some((natural_ms.unwrap_or(fallback_ms), None, None));
    }

    let start = trim_start.unwrap_or(0);
    let mut end = match (trim_end, natural_ms) {
        (Some(end), _) => end,
        (None, Some(natural)) => natural,
        (None, None) => start.saturating_add(fallback_ms),
    };
    if let Some(natural) = natural_ms {
        end = end.min(natural);
    }
    let duration = end.checked_sub(start).filter(|d| *d > 0)?;
    Some((duration, Some(start), Some(end)))
}

fn timeline_segment(
    item: &TimelineItem,
    origin: SegmentOrigin,
    media: &ResolvedMedia,
) -> Option<Segment> {
    let Some((start, mut end)) = item.window_ms() else {
        tracing::warn!(
            kind = ?item.kind,
            asset = %item.asset_path,
            "Timeline item has an empty window; skipping"
        );
        return None;
    };

    let resolved = media.video(&item.asset_path);
    if let Some(natural) = resolved.filter(|r| r.probed).map(|r| r.meta.duration_ms) {
        if end > natural {
            tracing::debug!(
                asset = %item.asset_path,
                requested_end_ms = end,
                natural_ms = natural,
                "Clamping timeline window to asset length"
            );
            end = natural;
        }
        if end <= start {
            tracing::warn!(
                kind = ?item.kind,
                asset = %item.asset_path,
                start_ms = start,
                natural_ms = natural,
                "Timeline window starts past the end of the asset; skipping"
            );
            return None;
        }
    }

    let has_audio = resolved.map(|r| r.meta.has_audio).unwrap_or(false);
    Some(Segment {
        kind: SegmentKind::Video,
        source_path: resolved
            .map(|r| r.path.clone())
            .unwrap_or_else(|| media.path(&item.asset_path)),
        duration_ms: end - start,
        trim_start_ms: Some(start),
        trim_end_ms: Some(end),
        audio: if has_audio {
            SegmentAudio::Intrinsic
        } else {
            SegmentAudio::Silence
        },
        origin,
    })
}
