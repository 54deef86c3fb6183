//! Typed ffmpeg filter graph.
//!
//! Every segment becomes one video chain and one audio chain built from the
//! descriptors below. Nothing is stringly-typed until [`FilterGraph::to_filter_complex`]
//! and [`FilterGraph::input_args`] serialize the graph for the encoder.
//! Stream labels are derived from segment position at that point.

use std::fmt;
use std::path::PathBuf;

use deckreel_common::clock::format_secs;
use deckreel_common::error::{DeckreelError, DeckreelResult};
use deckreel_deck_model::quality::QualitySettings;
use deckreel_deck_model::segment::{Segment, SegmentAudio, SegmentKind};

/// One encoder input.
#[derive(Debug, Clone, PartialEq)]
pub enum InputSpec {
    /// A still image looped for `duration_ms`.
    StillImage {
        path: PathBuf,
        duration_ms: u64,
        fps: u32,
    },
    /// A video file.
    Video { path: PathBuf },
    /// A narration audio file.
    Audio { path: PathBuf },
}

impl InputSpec {
    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            InputSpec::StillImage {
                path,
                duration_ms,
                fps,
            } => {
                args.extend([
                    "-loop".to_string(),
                    "1".to_string(),
                    "-framerate".to_string(),
                    fps.to_string(),
                    "-t".to_string(),
                    format_secs(*duration_ms),
                    "-i".to_string(),
                    path.display().to_string(),
                ]);
            }
            InputSpec::Video { path } | InputSpec::Audio { path } => {
                args.extend(["-i".to_string(), path.display().to_string()]);
            }
        }
    }
}

/// Per-segment video transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFilter {
    Trim { start_ms: u64, end_ms: u64 },
    ResetPts,
    /// Fit within the box, preserving aspect ratio.
    ScaleToFit { width: u32, height: u32 },
    /// Pad to exactly the box, content centered.
    PadCenter { width: u32, height: u32 },
    SetSar,
    Fps(u32),
    PixelFormat(&'static str),
    /// Repeat the last frame for up to `duration_ms`; always followed by a trim.
    HoldLastFrame { duration_ms: u64 },
}

impl fmt::Display for VideoFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoFilter::Trim { start_ms, end_ms } => write!(
                f,
                "trim=start={}:end={}",
                format_secs(*start_ms),
                format_secs(*end_ms)
            ),
            VideoFilter::ResetPts => f.write_str("setpts=PTS-STARTPTS"),
            VideoFilter::ScaleToFit { width, height } => write!(
                f,
                "scale={width}:{height}:force_original_aspect_ratio=decrease"
            ),
            VideoFilter::PadCenter { width, height } => {
                write!(f, "pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:color=black")
            }
            VideoFilter::SetSar => f.write_str("setsar=1"),
            VideoFilter::Fps(fps) => write!(f, "fps={fps}"),
            VideoFilter::PixelFormat(fmt_name) => write!(f, "format={fmt_name}"),
            VideoFilter::HoldLastFrame { duration_ms } => write!(
                f,
                "tpad=stop_mode=clone:stop_duration={}",
                format_secs(*duration_ms)
            ),
        }
    }
}

/// Where a segment's audio chain starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioSource {
    /// Audio stream of input `n`.
    Input(usize),
    /// Generated silence.
    Silence { sample_rate: u32 },
}

/// Per-segment audio transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFilter {
    Trim { start_ms: u64, end_ms: u64 },
    ResetPts,
    Resample(u32),
    Stereo,
    /// Extend with silence indefinitely; always followed by a trim.
    Pad,
}

impl fmt::Display for AudioFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFilter::Trim { start_ms, end_ms } => write!(
                f,
                "atrim=start={}:end={}",
                format_secs(*start_ms),
                format_secs(*end_ms)
            ),
            AudioFilter::ResetPts => f.write_str("asetpts=PTS-STARTPTS"),
            AudioFilter::Resample(rate) => write!(f, "aresample={rate}"),
            AudioFilter::Stereo => f.write_str("aformat=sample_fmts=fltp:channel_layouts=stereo"),
            AudioFilter::Pad => f.write_str("apad"),
        }
    }
}

/// Both chains for one segment.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentChain {
    pub video_input: usize,
    pub video: Vec<VideoFilter>,
    pub audio_source: AudioSource,
    pub audio: Vec<AudioFilter>,
    pub duration_ms: u64,
}

impl SegmentChain {
    /// Duration the video chain is cut to, if it ends in a held frame and a
    /// trim from zero.
    pub fn video_bound_ms(&self) -> Option<u64> {
        match self.video.as_slice() {
            [.., VideoFilter::HoldLastFrame { .. }, VideoFilter::Trim { start_ms: 0, end_ms }] => {
                Some(*end_ms)
            }
            _ => None,
        }
    }

    /// Duration the audio chain is cut to, if it ends in a trim from zero.
    pub fn audio_bound_ms(&self) -> Option<u64> {
        let mut filters = self.audio.iter().rev();
        let mut last = filters.next()?;
        if *last == AudioFilter::ResetPts {
            last = filters.next()?;
        }
        match last {
            AudioFilter::Trim { start_ms: 0, end_ms } => Some(*end_ms),
            _ => None,
        }
    }
}

/// The complete concat graph for a segment list.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterGraph {
    inputs: Vec<InputSpec>,
    chains: Vec<SegmentChain>,
}

impl FilterGraph {
    /// Build the graph. Fails on an empty segment list.
    pub fn build(
        segments: &[Segment],
        quality: &QualitySettings,
        sample_rate: u32,
    ) -> DeckreelResult<Self> {
        if segments.is_empty() {
            return Err(DeckreelError::validation("Nothing to compose: no segments"));
        }

        let mut inputs = Vec::new();
        let mut chains = Vec::with_capacity(segments.len());

        for segment in segments {
            let duration_ms = segment.duration_ms.max(1);
            let video_input = inputs.len();
            let (window_start, window_end) = match segment.kind {
                SegmentKind::Image => {
                    inputs.push(InputSpec::StillImage {
                        path: segment.source_path.clone(),
                        duration_ms,
                        fps: quality.fps,
                    });
                    (0, duration_ms)
                }
                SegmentKind::Video => {
                    inputs.push(InputSpec::Video {
                        path: segment.source_path.clone(),
                    });
                    let start = segment.window_start_ms();
                    (start, start + duration_ms)
                }
            };

            let video = vec![
                VideoFilter::Trim {
                    start_ms: window_start,
                    end_ms: window_end,
                },
                VideoFilter::ResetPts,
                VideoFilter::ScaleToFit {
                    width: quality.width,
                    height: quality.height,
                },
                VideoFilter::PadCenter {
                    width: quality.width,
                    height: quality.height,
                },
                VideoFilter::SetSar,
                VideoFilter::Fps(quality.fps),
                VideoFilter::PixelFormat("yuv420p"),
                // Clips shorter than their window hold the last frame.
                VideoFilter::HoldLastFrame { duration_ms },
                VideoFilter::Trim {
                    start_ms: 0,
                    end_ms: duration_ms,
                },
            ];

            let fit = [
                AudioFilter::Resample(sample_rate),
                AudioFilter::Stereo,
                AudioFilter::Pad,
                AudioFilter::Trim {
                    start_ms: 0,
                    end_ms: duration_ms,
                },
                AudioFilter::ResetPts,
            ];

            let (audio_source, audio) = match &segment.audio {
                SegmentAudio::Narration(path) => {
                    let index = inputs.len();
                    inputs.push(InputSpec::Audio { path: path.clone() });
                    let mut filters = vec![AudioFilter::ResetPts];
                    filters.extend(fit);
                    (AudioSource::Input(index), filters)
                }
                SegmentAudio::Intrinsic => {
                    let mut filters = vec![
                        AudioFilter::Trim {
                            start_ms: window_start,
                            end_ms: window_end,
                        },
                        AudioFilter::ResetPts,
                    ];
                    filters.extend(fit);
                    (AudioSource::Input(video_input), filters)
                }
                SegmentAudio::Silence => (
                    AudioSource::Silence { sample_rate },
                    vec![
                        AudioFilter::Trim {
                            start_ms: 0,
                            end_ms: duration_ms,
                        },
                        AudioFilter::ResetPts,
                    ],
                ),
            };

            chains.push(SegmentChain {
                video_input,
                video,
                audio_source,
                audio,
                duration_ms,
            });
        }

        Ok(Self { inputs, chains })
    }

    pub fn inputs(&self) -> &[InputSpec] {
        &self.inputs
    }

    pub fn chains(&self) -> &[SegmentChain] {
        &self.chains
    }

    /// `-i` arguments for every input, in index order.
    pub fn input_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        for input in &self.inputs {
            input.push_args(&mut args);
        }
        args
    }

    /// Serialize to `-filter_complex` syntax, ending in `[vout][aout]`.
    pub fn to_filter_complex(&self) -> String {
        let mut parts = Vec::with_capacity(self.chains.len() * 2 + 1);
        let mut concat_inputs = String::new();

        for (i, chain) in self.chains.iter().enumerate() {
            let video = join(&chain.video);
            parts.push(format!("[{}:v]{video}[v{i}]", chain.video_input));

            let audio = join(&chain.audio);
            parts.push(match chain.audio_source {
                AudioSource::Input(index) => format!("[{index}:a]{audio}[a{i}]"),
                AudioSource::Silence { sample_rate } => {
                    format!("anullsrc=channel_layout=stereo:sample_rate={sample_rate},{audio}[a{i}]")
                }
            });

            concat_inputs.push_str(&format!("[v{i}][a{i}]"));
        }

        parts.push(format!(
            "{concat_inputs}concat=n={}:v=1:a=1[{VIDEO_OUT}][{AUDIO_OUT}]",
            self.chains.len()
        ));
        parts.join(";")
    }
}

/// Output label of the concatenated video stream.
pub const VIDEO_OUT: &str = "vout";
/// Output label of the concatenated audio stream.
pub const AUDIO_OUT: &str = "aout";

fn join<T: fmt::Display>(filters: &[T]) -> String {
    filters
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckreel_deck_model::deck::AspectRatio;
    use deckreel_deck_model::job::RenderKind;
    use deckreel_deck_model::segment::SegmentOrigin;

    fn quality() -> QualitySettings {
        QualitySettings::resolve(RenderKind::Preview, AspectRatio::Widescreen)
    }

    fn image(path: &str, duration_ms: u64, audio: SegmentAudio) -> Segment {
        Segment {
            kind: SegmentKind::Image,
            source_path: PathBuf::from(path),
            duration_ms,
            trim_start_ms: None,
            trim_end_ms: None,
            audio,
            origin: SegmentOrigin::Slide(0),
        }
    }

    fn video(path: &str, start: u64, end: u64, audio: SegmentAudio) -> Segment {
        Segment {
            kind: SegmentKind::Video,
            source_path: PathBuf::from(path),
            duration_ms: end - start,
            trim_start_ms: Some(start),
            trim_end_ms: Some(end),
            audio,
            origin: SegmentOrigin::Intro,
        }
    }

    #[test]
    fn test_empty_segments_rejected() {
        assert!(FilterGraph::build(&[], &quality(), 44_100).is_err());
    }

    #[test]
    fn test_inputs_and_labels() {
        let segments = vec![
            video("/m/intro.mp4", 1000, 3000, SegmentAudio::Intrinsic),
            image(
                "/w/slide_000.png",
                4000,
                SegmentAudio::Narration(PathBuf::from("/m/n0.mp3")),
            ),
            image("/w/slide_001.png", 3000, SegmentAudio::Silence),
        ];
        let graph = FilterGraph::build(&segments, &quality(), 44_100).unwrap();

        assert_eq!(
            graph.input_args(),
            vec![
                "-i", "/m/intro.mp4",
                "-loop", "1", "-framerate", "30", "-t", "4.000", "-i", "/w/slide_000.png",
                "-i", "/m/n0.mp3",
                "-loop", "1", "-framerate", "30", "-t", "3.000", "-i", "/w/slide_001.png",
            ]
        );

        let fc = graph.to_filter_complex();
        assert!(fc.starts_with("[0:v]trim=start=1.000:end=3.000,setpts=PTS-STARTPTS,scale=1280:720:force_original_aspect_ratio=decrease,pad=1280:720:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,fps=30,format=yuv420p,tpad=stop_mode=clone:stop_duration=2.000,trim=start=0.000:end=2.000[v0]"));
        assert!(fc.contains("[0:a]atrim=start=1.000:end=3.000,asetpts=PTS-STARTPTS,aresample=44100"));
        assert!(fc.contains("[2:a]asetpts=PTS-STARTPTS,aresample=44100"));
        assert!(fc.contains("anullsrc=channel_layout=stereo:sample_rate=44100,atrim=start=0.000:end=3.000,asetpts=PTS-STARTPTS[a2]"));
        assert!(fc.ends_with("[v0][a0][v1][a1][v2][a2]concat=n=3:v=1:a=1[vout][aout]"));
    }

    #[test]
    fn test_every_audio_chain_is_bounded_to_segment_duration() {
        let segments = vec![
            image("/w/a.png", 2500, SegmentAudio::Silence),
            image(
                "/w/b.png",
                4000,
                SegmentAudio::Narration(PathBuf::from("/m/long.mp3")),
            ),
            video("/m/clip.mp4", 0, 6000, SegmentAudio::Intrinsic),
            video("/m/mute.mp4", 500, 1500, SegmentAudio::Silence),
        ];
        let graph = FilterGraph::build(&segments, &quality(), 44_100).unwrap();
        for (segment, chain) in segments.iter().zip(graph.chains()) {
            assert_eq!(chain.audio_bound_ms(), Some(segment.duration_ms));
            match segment.audio {
                SegmentAudio::Silence => {
                    assert!(matches!(chain.audio_source, AudioSource::Silence { .. }))
                }
                _ => assert!(chain.audio.contains(&AudioFilter::Pad)),
            }
        }
    }

    #[test]
    fn test_every_video_chain_reaches_segment_duration() {
        let segments = vec![
            image("/w/a.png", 2500, SegmentAudio::Silence),
            // Planned past the clip's real end; the last frame is held.
            video("/m/short.mp4", 0, 6000, SegmentAudio::Intrinsic),
            video("/m/mid.mp4", 500, 1500, SegmentAudio::Silence),
        ];
        let graph = FilterGraph::build(&segments, &quality(), 44_100).unwrap();
        for (segment, chain) in segments.iter().zip(graph.chains()) {
            assert_eq!(chain.video_bound_ms(), Some(segment.duration_ms));
            assert_eq!(chain.video_bound_ms(), chain.audio_bound_ms());
            assert!(chain.video.contains(&VideoFilter::HoldLastFrame {
                duration_ms: segment.duration_ms
            }));
        }
        assert!(graph
            .to_filter_complex()
            .contains("tpad=stop_mode=clone:stop_duration=6.000,trim=start=0.000:end=6.000[v1]"));
    }

    #[test]
    fn test_video_chain_normalizes_to_target() {
        let q = QualitySettings::resolve(RenderKind::Final, AspectRatio::Vertical);
        let graph =
            FilterGraph::build(&[image("/w/a.png", 1000, SegmentAudio::Silence)], &q, 44_100)
                .unwrap();
        let chain = &graph.chains()[0];
        assert!(chain.video.contains(&VideoFilter::ScaleToFit {
            width: 1080,
            height: 1920
        }));
        assert!(chain.video.contains(&VideoFilter::PadCenter {
            width: 1080,
            height: 1920
        }));
        assert!(chain.video.contains(&VideoFilter::SetSar));
        assert!(chain.video.contains(&VideoFilter::Fps(30)));
    }
}
