//! Render job coordination.
//!
//! The coordinator validates requests, creates job records, runs each job as
//! its own tokio task, and is the only writer of job state. Phases of a
//! running job and their progress bands:
//!
//! | phase       | band    |
//! |-------------|---------|
//! | startup     | 0–10%   |
//! | rasterize   | 10–65%  |
//! | compose     | 70–95%  |
//! | finalize    | 95–100% |

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use deckreel_common::clock::Stopwatch;
use deckreel_common::config::AppConfig;
use deckreel_common::error::{DeckreelError, DeckreelResult};
use deckreel_deck_model::bundle::DeckBundle;
use deckreel_deck_model::job::{RenderId, RenderJob, RenderKind, RenderStatus};
use deckreel_deck_model::quality::QualitySettings;
use deckreel_deck_model::segment::{Segment, SegmentKind, SegmentOrigin};
use deckreel_deck_model::store::{DeckStore, JobStore};
use deckreel_render_engine::compose::{CompositionBackend, CompositionRequest, FfmpegComposer};
use deckreel_render_engine::media::MediaResolver;
use deckreel_render_engine::planner::SegmentPlanner;
use deckreel_render_engine::process::{ProcessScope, ProcessTable};
use deckreel_render_engine::progress::ProgressBand;
use deckreel_render_engine::rasterizer::{RasterEngine, SlideRasterizer, WorkerRasterEngine};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::bus::{ProgressBus, RenderEvent};
use crate::tracker::JobTracker;

/// Coordinator settings, usually derived from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// Parent of per-job temp dirs (`<work_dir>/<job_id>/`).
    pub work_dir: PathBuf,
    pub output_dir: PathBuf,
    pub max_concurrent_jobs: usize,
    /// How long a finished job's event topic stays open.
    pub event_linger: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            output_dir: config.output_dir.clone(),
            max_concurrent_jobs: config.render.max_concurrent_jobs,
            event_linger: Duration::from_secs(config.render.event_linger_secs),
        }
    }
}

/// Reply to a successful `start_render`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTicket {
    pub id: RenderId,
    pub status: RenderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderProgress {
    pub percent: f64,
    pub current_step_label: String,
}

/// Reply to `get_render_status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderStatusView {
    pub id: RenderId,
    pub status: RenderStatus,
    pub progress: RenderProgress,
    pub output_path: Option<PathBuf>,
    pub file_size_bytes: Option<u64>,
    pub error_message: Option<String>,
}

impl From<&RenderJob> for RenderStatusView {
    fn from(job: &RenderJob) -> Self {
        Self {
            id: job.id,
            status: job.status,
            progress: RenderProgress {
                percent: job.progress_percent,
                current_step_label: job.current_step_label.clone(),
            },
            output_path: job.output_path.clone(),
            file_size_bytes: job.file_size_bytes,
            error_message: job.error_message.clone(),
        }
    }
}

#[derive(Clone)]
struct ActiveJob {
    tracker: Arc<JobTracker>,
    cancel: CancellationToken,
    finished: CancellationToken,
}

struct Inner {
    settings: CoordinatorSettings,
    decks: Arc<dyn DeckStore>,
    jobs: Arc<dyn JobStore>,
    resolver: MediaResolver,
    raster: Arc<dyn RasterEngine>,
    composer: Arc<dyn CompositionBackend>,
    processes: Arc<ProcessTable>,
    bus: Arc<ProgressBus>,
    permits: Arc<Semaphore>,
    active: Mutex<HashMap<RenderId, ActiveJob>>,
}

/// Entry point for starting, observing, and canceling renders.
#[derive(Clone)]
pub struct RenderCoordinator {
    inner: Arc<Inner>,
}

impl RenderCoordinator {
    pub fn new(
        settings: CoordinatorSettings,
        decks: Arc<dyn DeckStore>,
        jobs: Arc<dyn JobStore>,
        resolver: MediaResolver,
        raster: Arc<dyn RasterEngine>,
        composer: Arc<dyn CompositionBackend>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
        let bus = ProgressBus::new(settings.event_linger);
        Self {
            inner: Arc::new(Inner {
                settings,
                decks,
                jobs,
                resolver,
                raster,
                composer,
                processes: ProcessTable::new(),
                bus,
                permits,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Coordinator wired to the worker rasterizer and ffmpeg.
    pub fn from_config(
        config: &AppConfig,
        decks: Arc<dyn DeckStore>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self::new(
            CoordinatorSettings::from_config(config),
            decks,
            jobs,
            MediaResolver::from_config(config),
            Arc::new(WorkerRasterEngine::new(config.tools.raster_worker.clone())),
            Arc::new(FfmpegComposer::from_config(config)),
        )
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.inner.bus
    }

    pub fn process_table(&self) -> &Arc<ProcessTable> {
        &self.inner.processes
    }

    /// Subscribe to one job's events. `None` once its topic has closed.
    pub fn subscribe(&self, id: RenderId) -> Option<broadcast::Receiver<RenderEvent>> {
        self.inner.bus.subscribe(id)
    }

    /// Validate and enqueue a render.
    ///
    /// Bad kinds, unknown decks, and empty decks are rejected here with a
    /// validation error and no job record is created.
    pub async fn start_render(&self, deck_id: &str, kind: &str) -> DeckreelResult<RenderTicket> {
        let kind: RenderKind = kind.parse()?;
        let mut bundle = self
            .inner
            .decks
            .load_bundle(deck_id)
            .await?
            .ok_or_else(|| DeckreelError::validation(format!("Deck not found: {deck_id}")))?;
        bundle.validate()?;
        bundle.sort_slides();

        let job = RenderJob::new(deck_id, kind);
        self.inner.jobs.insert(&job).await?;

        let id = job.id;
        self.inner.bus.open_topic(id);
        let active = ActiveJob {
            tracker: Arc::new(JobTracker::new(job, Arc::clone(&self.inner.bus))),
            cancel: CancellationToken::new(),
            finished: CancellationToken::new(),
        };
        self.inner.active().insert(id, active.clone());

        tracing::info!(
            job_id = %id,
            deck_id = %deck_id,
            kind = %kind,
            slides = bundle.slides.len(),
            timeline_items = bundle.timeline.len(),
            "Render queued"
        );

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.run_job(active, bundle).await;
        });

        Ok(RenderTicket {
            id,
            status: RenderStatus::Queued,
        })
    }

    /// Current status of a job, or `None` if the id is unknown.
    pub async fn get_render_status(&self, id: RenderId) -> DeckreelResult<Option<RenderStatusView>> {
        Ok(self.job(id).await?.as_ref().map(RenderStatusView::from))
    }

    /// Full job record, preferring live in-memory state.
    pub async fn job(&self, id: RenderId) -> DeckreelResult<Option<RenderJob>> {
        if let Some(active) = self.inner.active().get(&id) {
            return Ok(Some(active.tracker.snapshot()));
        }
        self.inner.jobs.get(id).await
    }

    /// Cancel a queued or running job. `false` if it is unknown or terminal.
    pub async fn cancel_render(&self, id: RenderId) -> bool {
        let active = self.inner.active().get(&id).cloned();
        let Some(active) = active else {
            tracing::debug!(job_id = %id, "Cancel ignored: render not in progress");
            return false;
        };
        if !active.tracker.cancel() {
            tracing::debug!(job_id = %id, "Cancel ignored: render already finished");
            return false;
        }
        if let Err(e) = active.tracker.persist(self.inner.jobs.as_ref()).await {
            tracing::error!(job_id = %id, error = %e, "Failed to persist canceled job");
        }
        active.tracker.announce_canceled();
        active.cancel.cancel();
        let killed = self.inner.processes.terminate(id);
        tracing::info!(job_id = %id, killed_process = killed, "Render canceled");
        true
    }

    /// All retained job records, newest first.
    pub async fn list_renders(&self) -> DeckreelResult<Vec<RenderJob>> {
        let mut jobs = self.inner.jobs.list().await?;
        let active = self.inner.active();
        for job in &mut jobs {
            if let Some(live) = active.get(&job.id) {
                *job = live.tracker.snapshot();
            }
        }
        Ok(jobs)
    }

    /// Wait until a job's task has fully finished (including cleanup) and
    /// return its final record.
    pub async fn wait(&self, id: RenderId) -> DeckreelResult<Option<RenderJob>> {
        let finished = self.inner.active().get(&id).map(|a| a.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
        self.inner.jobs.get(id).await
    }

    /// Number of jobs that are queued or running.
    pub fn active_count(&self) -> usize {
        self.inner.active().len()
    }
}

/// Output of a successful pipeline run.
struct Rendered {
    output_path: PathBuf,
    file_size: u64,
}

impl Inner {
    fn active(&self) -> MutexGuard<'_, HashMap<RenderId, ActiveJob>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn persist(&self, tracker: &JobTracker) {
        if let Err(e) = tracker.persist(self.jobs.as_ref()).await {
            tracing::error!(job_id = %tracker.id(), error = %e, "Failed to persist job state");
        }
    }

    async fn run_job(self: Arc<Self>, active: ActiveJob, bundle: DeckBundle) {
        let tracker = Arc::clone(&active.tracker);
        let id = tracker.id();

        let permit = tokio::select! {
            _ = active.cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => permit.ok(),
        };

        if permit.is_some() && tracker.start() {
            self.persist(&tracker).await;
            let stopwatch = Stopwatch::start();
            let temp_dir = self.settings.work_dir.join(id.to_string());
            let scope = ProcessScope::new(Arc::clone(&self.processes), id, active.cancel.clone());
            let output_path = self
                .settings
                .output_dir
                .join(tracker.snapshot().output_file_name());

            let result = self
                .execute(&tracker, bundle, &scope, &temp_dir, &output_path)
                .await;
            self.finish(&tracker, result, &output_path).await;

            if let Err(e) = tokio::fs::remove_dir_all(&temp_dir).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(job_id = %id, path = %temp_dir.display(), error = %e, "Failed to remove temp dir");
                }
            }
            tracing::info!(
                job_id = %id,
                status = %tracker.status(),
                elapsed_secs = stopwatch.elapsed_secs(),
                "Render finished"
            );
        } else if !tracker.is_terminal() {
            // Semaphore closed underneath a queued job.
            if tracker.fail("Render queue is shut down") {
                self.persist(&tracker).await;
            }
        }

        drop(permit);
        self.active().remove(&id);
        active.finished.cancel();
    }

    async fn finish(
        &self,
        tracker: &JobTracker,
        result: DeckreelResult<Rendered>,
        output_path: &Path,
    ) {
        let id = tracker.id();
        let keep_output = match result {
            Ok(rendered) => tracker.succeed(rendered.output_path, rendered.file_size),
            Err(e) if e.is_canceled() => {
                // Usually already recorded by cancel_render.
                if tracker.cancel() {
                    tracker.announce_canceled();
                }
                false
            }
            Err(e) => {
                tracing::error!(job_id = %id, error = %e, "Render failed");
                tracker.fail(e.job_message());
                false
            }
        };
        self.persist(tracker).await;

        if !keep_output {
            if let Err(e) = tokio::fs::remove_file(output_path).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(job_id = %id, error = %e, "Failed to remove partial output");
                }
            }
        }
    }

    async fn execute(
        &self,
        tracker: &JobTracker,
        mut bundle: DeckBundle,
        scope: &ProcessScope,
        temp_dir: &Path,
        output_path: &Path,
    ) -> DeckreelResult<Rendered> {
        let job = tracker.snapshot();
        tokio::fs::create_dir_all(temp_dir).await?;
        if let Some(parent) = output_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Startup: media, plan, session.
        tracker.progress(ProgressBand::STARTUP.map(10.0), "startup", "Resolving media");
        let resolved = tokio::select! {
            _ = scope.cancel_token().cancelled() => return Err(DeckreelError::Canceled),
            resolved = self.resolver.resolve_bundle(&mut bundle) => resolved,
        };
        for asset in &resolved.updated_assets {
            if let Err(e) = self.decks.save_asset_meta(&job.deck_id, asset).await {
                tracing::warn!(job_id = %job.id, asset = %asset.id, error = %e, "Failed to cache probe result");
            }
        }

        let quality = QualitySettings::resolve(job.kind, bundle.deck.aspect_ratio);
        let planner = SegmentPlanner::new(temp_dir);
        let segments = planner.plan(&bundle.slides, &bundle.timeline, &resolved.media)?;
        tracing::info!(
            job_id = %job.id,
            segments = segments.len(),
            width = quality.width,
            height = quality.height,
            "Segments planned"
        );
        tracker.progress(
            ProgressBand::STARTUP.map(40.0),
            "startup",
            format!("Planned {} segments", segments.len()),
        );
        scope.check_canceled()?;

        let stills: Vec<(usize, &Segment)> = segments
            .iter()
            .filter(|s| s.kind == SegmentKind::Image)
            .filter_map(|s| match s.origin {
                SegmentOrigin::Slide(index) => Some((index, s)),
                _ => None,
            })
            .collect();

        if !stills.is_empty() {
            let mut rasterizer = SlideRasterizer::open(
                self.raster.as_ref(),
                scope,
                self.resolver.media_root(),
                bundle.deck.theme_background.clone(),
            )
            .await?;
            tracker.progress(ProgressBand::STARTUP.end, "startup", "Rendering session ready");

            let rendered = rasterize_all(tracker, &mut rasterizer, &bundle, &stills, &quality, scope).await;
            // Released before encoding starts, whatever happened above.
            if let Err(e) = rasterizer.close().await {
                tracing::warn!(job_id = %job.id, error = %e, "Failed to close raster session");
            }
            rendered?;
        }
        tracker.progress(ProgressBand::RASTERIZE.end, "rasterize", "Slides rendered");
        scope.check_canceled()?;

        // Compose.
        tracker.progress(ProgressBand::COMPOSE.start, "compose", "Encoding video");
        self.persist(tracker).await;
        let request = CompositionRequest {
            segments: &segments,
            quality,
            output_path,
        };
        let on_progress = |percent: f64| {
            tracker.progress(ProgressBand::COMPOSE.map(percent), "compose", "Encoding video");
        };
        tracing::info!(job_id = %job.id, backend = self.composer.name(), "Composing");
        self.composer.compose(&request, scope, &on_progress).await?;
        scope.check_canceled()?;

        // Finalize.
        tracker.progress(ProgressBand::FINALIZE.start, "finalize", "Finalizing");
        let metadata = tokio::fs::metadata(output_path)
            .await
            .map_err(|_| DeckreelError::FileNotFound {
                path: output_path.to_path_buf(),
            })?;

        Ok(Rendered {
            output_path: output_path.to_path_buf(),
            file_size: metadata.len(),
        })
    }
}

async fn rasterize_all(
    tracker: &JobTracker,
    rasterizer: &mut SlideRasterizer,
    bundle: &DeckBundle,
    stills: &[(usize, &Segment)],
    quality: &QualitySettings,
    scope: &ProcessScope,
) -> DeckreelResult<()> {
    let total = stills.len();
    for (done, (index, segment)) in stills.iter().enumerate() {
        scope.check_canceled()?;
        let slide = bundle.slides.get(*index).ok_or_else(|| {
            DeckreelError::rasterization(format!("Planned slide {index} is missing from the deck"))
        })?;

        let png = tokio::select! {
            _ = scope.cancel_token().cancelled() => return Err(DeckreelError::Canceled),
            png = rasterizer.rasterize(slide, quality.width, quality.height) => png?,
        };
        tokio::fs::write(&segment.source_path, &png).await?;

        tracker.progress(
            ProgressBand::RASTERIZE.step(done + 1, total),
            "rasterize",
            format!("Rendered slide {} of {total}", done + 1),
        );
    }
    Ok(())
}
