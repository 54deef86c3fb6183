//! Slide rasterization.
//!
//! Slides are rendered to PNG by an external headless engine. One session is
//! opened per job, reused for every image segment, and closed explicitly
//! before encoding starts.
//!
//! The bundled engine drives a long-lived worker process over stdio with one
//! JSON object per line:
//!
//! ```text
//! → {"id": 1, "html": "<!DOCTYPE html>...", "width": 1280, "height": 720}
//! ← {"id": 1, "ok": true, "png_base64": "iVBORw0..."}
//! ← {"id": 2, "ok": false, "error": "navigation timeout"}
//! ```
//!
//! Closing the worker's stdin ends the session.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use deckreel_common::error::{DeckreelError, DeckreelResult};
use deckreel_deck_model::deck::Slide;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::markup::{render_slide_html, MarkupContext};
use crate::process::{command_exists, ProcessGuard, ProcessScope};

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Factory for rendering sessions.
#[async_trait]
pub trait RasterEngine: Send + Sync {
    /// Start a session on behalf of the job owning `scope`.
    async fn open_session(&self, scope: &ProcessScope) -> DeckreelResult<Box<dyn RasterSession>>;

    /// Check if the engine can run on this system.
    fn is_available(&self) -> bool;

    fn name(&self) -> &str;
}

/// An open rendering session.
#[async_trait]
pub trait RasterSession: Send {
    /// Render an HTML document to PNG bytes.
    async fn rasterize_html(&mut self, html: &str, width: u32, height: u32)
        -> DeckreelResult<Vec<u8>>;

    /// Tear the session down and release its process.
    async fn close(self: Box<Self>) -> DeckreelResult<()>;
}

/// Per-job adapter: slide in, PNG bytes out.
pub struct SlideRasterizer {
    session: Box<dyn RasterSession>,
    media_root: PathBuf,
    theme_background: Option<String>,
}

impl SlideRasterizer {
    pub async fn open(
        engine: &dyn RasterEngine,
        scope: &ProcessScope,
        media_root: impl Into<PathBuf>,
        theme_background: Option<String>,
    ) -> DeckreelResult<Self> {
        tracing::debug!(job_id = %scope.job_id(), engine = engine.name(), "Opening raster session");
        let session = engine.open_session(scope).await?;
        Ok(Self {
            session,
            media_root: media_root.into(),
            theme_background,
        })
    }

    pub async fn rasterize(&mut self, slide: &Slide, width: u32, height: u32) -> DeckreelResult<Vec<u8>> {
        let ctx = MarkupContext {
            width,
            height,
            theme_background: self.theme_background.as_deref(),
            media_root: &self.media_root,
        };
        let html = render_slide_html(slide, &ctx);
        self.session.rasterize_html(&html, width, height).await
    }

    pub async fn close(self) -> DeckreelResult<()> {
        self.session.close().await
    }
}

#[derive(Debug, Serialize)]
struct WorkerRequest<'a> {
    id: u64,
    html: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct WorkerResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    png_base64: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Engine backed by an external worker command.
#[derive(Debug, Clone)]
pub struct WorkerRasterEngine {
    command: Vec<String>,
}

impl WorkerRasterEngine {
    /// `command` is the program followed by its arguments.
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

#[async_trait]
impl RasterEngine for WorkerRasterEngine {
    async fn open_session(&self, scope: &ProcessScope) -> DeckreelResult<Box<dyn RasterSession>> {
        scope.check_canceled()?;
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| DeckreelError::config("Raster worker command is empty"))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DeckreelError::rasterization(format!("Failed to start raster worker {program}: {e}")))?;

        let guard = scope.register("raster-worker", child.id())?;
        tracing::info!(job_id = %scope.job_id(), pid = ?child.id(), "Raster worker started");

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DeckreelError::rasterization("Failed to capture raster worker stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeckreelError::rasterization("Failed to capture raster worker stdout"))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "raster_worker", "{line}");
                }
            });
        }

        Ok(Box::new(WorkerSession {
            io: WorkerIo {
                child,
                stdin: Some(stdin),
                stdout: BufReader::new(stdout).lines(),
            },
            guard,
            next_id: 1,
        }))
    }

    fn is_available(&self) -> bool {
        self.command.first().is_some_and(command_exists)
    }

    fn name(&self) -> &str {
        "worker"
    }
}

struct WorkerIo {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: Lines<BufReader<ChildStdout>>,
}

struct WorkerSession {
    io: WorkerIo,
    guard: ProcessGuard,
    next_id: u64,
}

impl WorkerIo {
    async fn exchange(&mut self, request: &WorkerRequest<'_>) -> DeckreelResult<WorkerResponse> {
        let mut line = serde_json::to_vec(request)?;
        line.push(b'\n');
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DeckreelError::rasterization("Raster session already closed"))?;
        stdin
            .write_all(&line)
            .await
            .map_err(|e| DeckreelError::rasterization(format!("Raster worker stdin closed: {e}")))?;
        stdin.flush().await?;

        loop {
            let next = self
                .stdout
                .next_line()
                .await
                .map_err(|e| DeckreelError::rasterization(format!("Failed reading raster worker output: {e}")))?;
            let Some(raw) = next else {
                let status = self.child.wait().await.ok();
                return Err(DeckreelError::rasterization(format!(
                    "Raster worker exited unexpectedly ({})",
                    status.map_or_else(|| "unknown status".to_string(), |s| s.to_string())
                )));
            };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            let response: WorkerResponse = serde_json::from_str(raw).map_err(|e| {
                DeckreelError::rasterization(format!("Malformed raster worker response: {e}"))
            })?;
            if response.id != request.id {
                tracing::warn!(expected = request.id, got = response.id, "Ignoring stale raster response");
                continue;
            }
            return Ok(response);
        }
    }
}

#[async_trait]
impl RasterSession for WorkerSession {
    async fn rasterize_html(
        &mut self,
        html: &str,
        width: u32,
        height: u32,
    ) -> DeckreelResult<Vec<u8>> {
        if self.guard.is_killed() {
            return Err(DeckreelError::Canceled);
        }
        let request = WorkerRequest {
            id: self.next_id,
            html,
            width,
            height,
        };
        self.next_id += 1;

        let response = tokio::select! {
            _ = self.guard.killed() => {
                let _ = self.io.child.start_kill();
                return Err(DeckreelError::Canceled);
            }
            response = self.io.exchange(&request) => response?,
        };

        if !response.ok {
            return Err(DeckreelError::rasterization(
                response
                    .error
                    .unwrap_or_else(|| "raster worker reported failure".to_string()),
            ));
        }
        let encoded = response
            .png_base64
            .ok_or_else(|| DeckreelError::rasterization("Raster worker returned no image"))?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| DeckreelError::rasterization(format!("Invalid image encoding: {e}")))?;
        if !bytes.starts_with(PNG_SIGNATURE) {
            return Err(DeckreelError::rasterization("Raster worker output is not a PNG"));
        }
        Ok(bytes)
    }

    async fn close(mut self: Box<Self>) -> DeckreelResult<()> {
        if self.guard.is_killed() {
            let _ = self.io.child.kill().await;
            return Ok(());
        }
        // EOF on stdin asks the worker to exit.
        drop(self.io.stdin.take());
        match tokio::time::timeout(CLOSE_GRACE, self.io.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(status = %status, "Raster worker exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Failed to wait on raster worker");
            }
            Err(_) => {
                tracing::warn!("Raster worker did not exit after stdin closed; killing");
                let _ = self.io.child.kill().await;
            }
        }
        Ok(())
    }
}
