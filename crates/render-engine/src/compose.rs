//! Composition: segments in, one encoded video file out.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use deckreel_common::clock::Stopwatch;
use deckreel_common::config::AppConfig;
use deckreel_common::error::{DeckreelError, DeckreelResult};
use deckreel_deck_model::quality::QualitySettings;
use deckreel_deck_model::segment::{total_planned_ms, Segment};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::filter_graph::{FilterGraph, AUDIO_OUT, VIDEO_OUT};
use crate::process::{command_exists, ProcessScope};
use crate::progress::{EncodeProgress, ProgressState};

const STALL_WARNING: Duration = Duration::from_secs(10);

/// Everything a backend needs to encode one job.
#[derive(Debug, Clone, Copy)]
pub struct CompositionRequest<'a> {
    pub segments: &'a [Segment],
    pub quality: QualitySettings,
    pub output_path: &'a Path,
}

/// Encode progress callback, called with a non-decreasing percentage.
pub type ProgressFn<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Trait for composition backends.
#[async_trait]
pub trait CompositionBackend: Send + Sync {
    /// Encode the request. Returns [`DeckreelError::Canceled`] if the job's
    /// process was killed, [`DeckreelError::Encoding`] on encoder failure.
    async fn compose(
        &self,
        request: &CompositionRequest<'_>,
        scope: &ProcessScope,
        on_progress: ProgressFn<'_>,
    ) -> DeckreelResult<()>;

    /// Check if this backend is available on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// ffmpeg-based composition.
#[derive(Debug, Clone)]
pub struct FfmpegComposer {
    ffmpeg: PathBuf,
    sample_rate: u32,
}

impl FfmpegComposer {
    pub fn new(ffmpeg: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            sample_rate,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.tools.ffmpeg.clone(), config.render.audio_sample_rate)
    }

    /// Full ffmpeg argument list for a request.
    pub fn build_args(&self, request: &CompositionRequest<'_>) -> DeckreelResult<Vec<String>> {
        let graph = FilterGraph::build(request.segments, &request.quality, self.sample_rate)?;

        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-nostats", "-y"]
            .into_iter()
            .map(String::from)
            .collect();
        args.extend(graph.input_args());
        args.extend([
            "-filter_complex".to_string(),
            graph.to_filter_complex(),
            "-map".to_string(),
            format!("[{VIDEO_OUT}]"),
            "-map".to_string(),
            format!("[{AUDIO_OUT}]"),
        ]);
        args.extend(codec_args(&request.quality, self.sample_rate));
        args.extend([
            "-progress".to_string(),
            "pipe:1".to_string(),
            request.output_path.display().to_string(),
        ]);
        Ok(args)
    }
}

/// H.264 + AAC output arguments for a quality preset.
pub fn codec_args(quality: &QualitySettings, sample_rate: u32) -> Vec<String> {
    vec![
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        quality.encoder_preset.as_str().to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-b:v".to_string(),
        format!("{}k", quality.video_bitrate_kbps),
        "-r".to_string(),
        quality.fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        format!("{}k", quality.audio_bitrate_kbps),
        "-ar".to_string(),
        sample_rate.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ]
}

#[async_trait]
impl CompositionBackend for FfmpegComposer {
    async fn compose(
        &self,
        request: &CompositionRequest<'_>,
        scope: &ProcessScope,
        on_progress: ProgressFn<'_>,
    ) -> DeckreelResult<()> {
        scope.check_canceled()?;
        let args = self.build_args(request)?;
        if let Some(parent) = request.output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tracing::debug!(args = ?args, "Running ffmpeg");
        let stopwatch = Stopwatch::start();
        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeckreelError::encoding(format!("Failed to start ffmpeg: {e}"), ""))?;

        let guard = scope.register("ffmpeg", child.id())?;
        tracing::info!(
            job_id = %scope.job_id(),
            pid = ?child.id(),
            segments = request.segments.len(),
            total_ms = total_planned_ms(request.segments),
            "ffmpeg process started"
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeckreelError::encoding("Failed to capture ffmpeg stdout", ""))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DeckreelError::encoding("Failed to capture ffmpeg stderr", ""))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            let mut output = String::new();
            match BufReader::new(stderr).read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        let mut encode = EncodeProgress::new(total_planned_ms(request.segments));
        let run = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut state = ProgressState::default();
            let mut last_encoded_ms = 0u64;
            let mut last_advance = Instant::now();
            while let Some(line) = lines.next_line().await? {
                if !state.feed_line(&line) {
                    continue;
                }
                if state.encoded_ms > last_encoded_ms {
                    last_encoded_ms = state.encoded_ms;
                    last_advance = Instant::now();
                } else if last_advance.elapsed() >= STALL_WARNING {
                    tracing::warn!(
                        encoded_ms = state.encoded_ms,
                        elapsed_secs = stopwatch.elapsed_secs(),
                        "No ffmpeg progress advancement for 10s"
                    );
                    last_advance = Instant::now();
                }
                on_progress(encode.percent(&state));
            }
            child.wait().await
        };

        let status = tokio::select! {
            _ = guard.killed() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                tracing::info!(job_id = %scope.job_id(), "ffmpeg killed");
                return Err(DeckreelError::Canceled);
            }
            status = run => status.map_err(|e| {
                DeckreelError::encoding(format!("Failed to wait on ffmpeg: {e}"), "")
            })?,
        };
        drop(guard);

        let diagnostics = stderr_task
            .await
            .unwrap_or_else(|e| format!("<failed to join stderr reader: {e}>"));

        if !status.success() {
            return Err(DeckreelError::encoding(
                format!("ffmpeg exited with {status}"),
                diagnostics,
            ));
        }
        if !tokio::fs::try_exists(request.output_path).await.unwrap_or(false) {
            return Err(DeckreelError::encoding(
                "ffmpeg reported success but produced no output file",
                diagnostics,
            ));
        }
        on_progress(100.0);

        tracing::info!(
            elapsed_secs = stopwatch.elapsed_secs(),
            output = %request.output_path.display(),
            "Composition finished"
        );
        Ok(())
    }

    fn is_available(&self) -> bool {
        command_exists(&self.ffmpeg)
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}
