//! End-to-end job lifecycle tests with in-process raster and encode fakes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deckreel_common::error::{DeckreelError, DeckreelResult};
use deckreel_deck_model::bundle::DeckBundle;
use deckreel_deck_model::asset::MediaAsset;
use deckreel_deck_model::deck::{Deck, Slide, SlideContent, SlideLayout, SlideVideo};
use deckreel_deck_model::job::RenderStatus;
use deckreel_deck_model::segment::total_planned_ms;
use deckreel_deck_model::store::{JobStore, MemoryDeckStore, MemoryJobStore};
use deckreel_render_engine::compose::{CompositionBackend, CompositionRequest, ProgressFn};
use deckreel_render_engine::media::MediaResolver;
use deckreel_render_engine::process::ProcessScope;
use deckreel_render_engine::rasterizer::{RasterEngine, RasterSession};
use deckreel_render_jobs::{CoordinatorSettings, RenderCoordinator, RenderEvent};
use tokio::sync::Notify;

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

#[derive(Default)]
struct FakeRaster {
    /// Block inside `rasterize_html` until the job is canceled.
    stall: bool,
    entered: Arc<Notify>,
    rasterized: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

struct FakeSession {
    stall: bool,
    entered: Arc<Notify>,
    rasterized: Arc<AtomicUsize>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl RasterEngine for FakeRaster {
    async fn open_session(&self, _scope: &ProcessScope) -> DeckreelResult<Box<dyn RasterSession>> {
        Ok(Box::new(FakeSession {
            stall: self.stall,
            entered: Arc::clone(&self.entered),
            rasterized: Arc::clone(&self.rasterized),
            closed: Arc::clone(&self.closed),
        }))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

#[async_trait]
impl RasterSession for FakeSession {
    async fn rasterize_html(&mut self, html: &str, _width: u32, _height: u32) -> DeckreelResult<Vec<u8>> {
        assert!(html.contains("<html"));
        if self.stall {
            self.entered.notify_one();
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        self.rasterized.fetch_add(1, Ordering::SeqCst);
        Ok(PNG_SIGNATURE.to_vec())
    }

    async fn close(self: Box<Self>) -> DeckreelResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeComposer {
    fail: bool,
    planned_ms: Mutex<Option<u64>>,
    frames_present: AtomicBool,
}

#[async_trait]
impl CompositionBackend for FakeComposer {
    async fn compose(
        &self,
        request: &CompositionRequest<'_>,
        _scope: &ProcessScope,
        on_progress: ProgressFn<'_>,
    ) -> DeckreelResult<()> {
        *self.planned_ms.lock().unwrap() = Some(total_planned_ms(request.segments));
        let frames_present = request.segments.iter().all(|s| s.source_path.is_file());
        self.frames_present.store(frames_present, Ordering::SeqCst);

        // Partial output, so failure cleanup has something to remove.
        tokio::fs::write(request.output_path, b"partial").await?;
        on_progress(50.0);
        if self.fail {
            return Err(DeckreelError::encoding(
                "ffmpeg exited with exit status: 1",
                "moov atom not found\nConversion failed!",
            ));
        }
        tokio::fs::write(request.output_path, b"fake mp4 payload").await?;
        on_progress(100.0);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "fake"
    }
}

fn slide(index: u32, duration_ms: u64) -> Slide {
    Slide {
        id: format!("s{index}"),
        position: index,
        layout: SlideLayout::TitleBody,
        content: SlideContent {
            title: Some(format!("Slide {index}")),
            ..Default::default()
        },
        duration_ms,
        narration_audio_path: None,
        video: None,
    }
}

fn bundle(id: &str, durations: &[u64]) -> DeckBundle {
    DeckBundle {
        deck: Deck {
            id: id.to_string(),
            title: "Quarterly review".to_string(),
            aspect_ratio: Default::default(),
            theme_background: None,
        },
        slides: durations
            .iter()
            .enumerate()
            .map(|(i, d)| slide(i as u32, *d))
            .collect(),
        timeline: Vec::new(),
    }
}

/// One still slide plus a 6 s clip whose trim starts after the clip ends.
fn trimmed_past_clip_bundle() -> DeckBundle {
    let mut deck = bundle("trimmed", &[4000, 4000]);
    deck.slides[1].video = Some(SlideVideo {
        asset: MediaAsset {
            id: "clip".to_string(),
            path: "clip.mp4".to_string(),
            duration_ms: Some(6000),
            has_audio: Some(false),
            ..Default::default()
        },
        trim_start_ms: Some(7000),
        trim_end_ms: None,
    });
    deck
}

struct Harness {
    coordinator: RenderCoordinator,
    jobs: Arc<MemoryJobStore>,
    work_dir: PathBuf,
    output_dir: PathBuf,
    _root: tempfile::TempDir,
}

async fn harness(raster: FakeRaster, composer: Arc<FakeComposer>, max_jobs: usize) -> Harness {
    let root = tempfile::tempdir().unwrap();
    let work_dir = root.path().join("work");
    let output_dir = root.path().join("renders");
    let media_root = root.path().join("media");

    let decks = Arc::new(MemoryDeckStore::new());
    decks.put(bundle("deck-1", &[4000, 3000, 5000])).await;
    decks.put(bundle("empty", &[])).await;
    decks.put(trimmed_past_clip_bundle()).await;
    let jobs = Arc::new(MemoryJobStore::new());

    let settings = CoordinatorSettings {
        work_dir: work_dir.clone(),
        output_dir: output_dir.clone(),
        max_concurrent_jobs: max_jobs,
        event_linger: Duration::from_secs(30),
    };
    let coordinator = RenderCoordinator::new(
        settings,
        decks,
        jobs.clone(),
        MediaResolver::new(&media_root, "ffprobe", 5000),
        Arc::new(raster),
        composer,
    );
    Harness {
        coordinator,
        jobs,
        work_dir,
        output_dir,
        _root: root,
    }
}

fn dir_is_empty_or_missing(path: &Path) -> bool {
    match std::fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

#[tokio::test]
async fn test_preview_render_succeeds() {
    let raster = FakeRaster::default();
    let rasterized = Arc::clone(&raster.rasterized);
    let closed = Arc::clone(&raster.closed);
    let composer = Arc::new(FakeComposer::default());
    let h = harness(raster, composer.clone(), 2).await;

    let ticket = h.coordinator.start_render("deck-1", "preview").await.unwrap();
    assert_eq!(ticket.status, RenderStatus::Queued);
    let mut rx = h.coordinator.subscribe(ticket.id).unwrap();

    let job = h.coordinator.wait(ticket.id).await.unwrap().unwrap();
    assert_eq!(job.status, RenderStatus::Succeeded);
    assert_eq!(job.progress_percent, 100.0);
    assert_eq!(job.file_size_bytes, Some(b"fake mp4 payload".len() as u64));
    let output = job.output_path.clone().unwrap();
    assert!(output.starts_with(&h.output_dir));
    assert!(output.is_file());

    assert_eq!(rasterized.load(Ordering::SeqCst), 3);
    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(*composer.planned_ms.lock().unwrap(), Some(12_000));
    assert!(composer.frames_present.load(Ordering::SeqCst));
    assert!(!h.work_dir.join(ticket.id.to_string()).exists());

    let mut last_percent = 0.0;
    let mut saw_complete = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            RenderEvent::Progress { percent, .. } => {
                assert!(percent >= last_percent, "progress went backwards");
                last_percent = percent;
            }
            RenderEvent::Complete { file_size, .. } => {
                assert_eq!(file_size, b"fake mp4 payload".len() as u64);
                saw_complete = true;
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(saw_complete);

    let stored = h.jobs.get(ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, RenderStatus::Succeeded);
}

#[tokio::test]
async fn test_cancel_during_rasterization() {
    let raster = FakeRaster {
        stall: true,
        ..Default::default()
    };
    let entered = Arc::clone(&raster.entered);
    let closed = Arc::clone(&raster.closed);
    let composer = Arc::new(FakeComposer::default());
    let h = harness(raster, composer.clone(), 2).await;

    let ticket = h.coordinator.start_render("deck-1", "final").await.unwrap();
    let mut rx = h.coordinator.subscribe(ticket.id).unwrap();
    entered.notified().await;

    let status = h.coordinator.get_render_status(ticket.id).await.unwrap().unwrap();
    assert_eq!(status.status, RenderStatus::Running);

    assert!(h.coordinator.cancel_render(ticket.id).await);
    let job = h.coordinator.wait(ticket.id).await.unwrap().unwrap();
    assert_eq!(job.status, RenderStatus::Canceled);
    assert!(job.error_message.is_none());
    assert!(job.output_path.is_none());

    assert!(closed.load(Ordering::SeqCst));
    assert!(composer.planned_ms.lock().unwrap().is_none());
    assert!(!h.work_dir.join(ticket.id.to_string()).exists());
    assert!(dir_is_empty_or_missing(&h.output_dir));
    assert!(h.coordinator.process_table().is_empty());

    // Second cancel is a no-op.
    assert!(!h.coordinator.cancel_render(ticket.id).await);

    let mut terminal = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.is_terminal() {
            terminal.push(event);
        }
    }
    assert_eq!(terminal, vec![RenderEvent::Canceled { render_id: ticket.id }]);
}

#[tokio::test]
async fn test_encoding_failure_is_recorded() {
    let composer = Arc::new(FakeComposer {
        fail: true,
        ..Default::default()
    });
    let h = harness(FakeRaster::default(), composer, 2).await;

    let ticket = h.coordinator.start_render("deck-1", "preview").await.unwrap();
    let mut rx = h.coordinator.subscribe(ticket.id).unwrap();
    let job = h.coordinator.wait(ticket.id).await.unwrap().unwrap();

    assert_eq!(job.status, RenderStatus::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("ffmpeg exited"));
    assert!(message.contains("Conversion failed!"));
    assert!(job.output_path.is_none());
    assert!(dir_is_empty_or_missing(&h.output_dir));
    assert!(!h.work_dir.join(ticket.id.to_string()).exists());

    let mut saw_error = false;
    while let Ok(event) = rx.try_recv() {
        if let RenderEvent::Error { error, .. } = event {
            assert!(error.contains("Conversion failed!"));
            saw_error = true;
        }
    }
    assert!(saw_error);
}

#[tokio::test]
async fn test_rejected_requests_create_no_job() {
    let h = harness(FakeRaster::default(), Arc::new(FakeComposer::default()), 2).await;

    for (deck, kind) in [("deck-1", "4k"), ("missing", "preview"), ("empty", "final")] {
        let err = h.coordinator.start_render(deck, kind).await.unwrap_err();
        assert!(
            matches!(err, DeckreelError::Validation { .. }),
            "{deck}/{kind}: {err}"
        );
    }
    assert!(h.coordinator.list_renders().await.unwrap().is_empty());
    assert_eq!(h.coordinator.active_count(), 0);
}

#[tokio::test]
async fn test_queued_job_can_be_canceled() {
    let raster = FakeRaster {
        stall: true,
        ..Default::default()
    };
    let entered = Arc::clone(&raster.entered);
    let h = harness(raster, Arc::new(FakeComposer::default()), 1).await;

    let first = h.coordinator.start_render("deck-1", "preview").await.unwrap();
    entered.notified().await;
    let second = h.coordinator.start_render("deck-1", "preview").await.unwrap();

    let status = h.coordinator.get_render_status(second.id).await.unwrap().unwrap();
    assert_eq!(status.status, RenderStatus::Queued);
    assert_eq!(status.progress.current_step_label, "Queued");

    assert!(h.coordinator.cancel_render(second.id).await);
    let job = h.coordinator.wait(second.id).await.unwrap().unwrap();
    assert_eq!(job.status, RenderStatus::Canceled);

    assert!(h.coordinator.cancel_render(first.id).await);
    let job = h.coordinator.wait(first.id).await.unwrap().unwrap();
    assert_eq!(job.status, RenderStatus::Canceled);

    let listed = h.coordinator.list_renders().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|j| j.status == RenderStatus::Canceled));
    assert_eq!(h.coordinator.active_count(), 0);
}

#[tokio::test]
async fn test_unknown_job_status_and_cancel() {
    let h = harness(FakeRaster::default(), Arc::new(FakeComposer::default()), 2).await;
    let id = uuid::Uuid::new_v4();
    assert!(h.coordinator.get_render_status(id).await.unwrap().is_none());
    assert!(!h.coordinator.cancel_render(id).await);
    assert!(h.coordinator.subscribe(id).is_none());
}

#[tokio::test]
async fn test_video_trim_past_clip_end_still_renders() {
    let composer = Arc::new(FakeComposer::default());
    let h = harness(FakeRaster::default(), composer.clone(), 1).await;

    let ticket = h.coordinator.start_render("trimmed", "preview").await.unwrap();
    let job = tokio::time::timeout(Duration::from_secs(10), h.coordinator.wait(ticket.id))
        .await
        .expect("job never finished")
        .unwrap()
        .unwrap();

    assert_eq!(job.status, RenderStatus::Succeeded);
    // The still plus the whole 6 s clip.
    assert_eq!(*composer.planned_ms.lock().unwrap(), Some(10_000));
}

#[tokio::test]
async fn test_late_subscriber_sees_terminal_status() {
    let h = harness(FakeRaster::default(), Arc::new(FakeComposer::default()), 1).await;

    let ticket = h.coordinator.start_render("deck-1", "preview").await.unwrap();
    h.coordinator.wait(ticket.id).await.unwrap();

    // The topic lingers after the terminal event, but nothing more arrives.
    let mut rx = h.coordinator.subscribe(ticket.id).unwrap();
    assert!(rx.try_recv().is_err());
    let job = h.coordinator.job(ticket.id).await.unwrap().unwrap();
    assert!(job.status.is_terminal());
    let view = h.coordinator.get_render_status(ticket.id).await.unwrap().unwrap();
    assert_eq!(view.status, RenderStatus::Succeeded);
}
