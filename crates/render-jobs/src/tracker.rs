//! Per-job state tracking.
//!
//! A [`JobTracker`] owns the in-memory record of one running job. Every
//! transition goes through it, so terminal states stay terminal and progress
//! never goes backwards no matter which task reports it. Progress events are
//! published while the record is locked, which keeps them ahead of the
//! terminal transition on the bus.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use deckreel_common::clock;
use deckreel_common::error::DeckreelResult;
use deckreel_deck_model::job::{RenderId, RenderJob, RenderStatus};
use deckreel_deck_model::store::JobStore;

use crate::bus::{ProgressBus, RenderEvent};

/// In-memory record of one job plus its event topic.
#[derive(Debug)]
pub struct JobTracker {
    job: Mutex<RenderJob>,
    bus: Arc<ProgressBus>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl JobTracker {
    pub fn new(job: RenderJob, bus: Arc<ProgressBus>) -> Self {
        Self {
            job: Mutex::new(job),
            bus,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RenderJob> {
        self.job.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> RenderId {
        self.lock().id
    }

    pub fn snapshot(&self) -> RenderJob {
        self.lock().clone()
    }

    pub fn status(&self) -> RenderStatus {
        self.lock().status
    }

    pub fn is_terminal(&self) -> bool {
        self.lock().is_terminal()
    }

    fn transition(job: &mut RenderJob, next: RenderStatus) -> bool {
        if !job.status.can_transition_to(next) {
            return false;
        }
        job.status = next;
        job.updated_at = clock::now();
        true
    }

    /// `queued → running`. False if the job already left `queued`.
    pub fn start(&self) -> bool {
        let mut job = self.lock();
        if !Self::transition(&mut job, RenderStatus::Running) {
            return false;
        }
        job.progress_percent = 0.0;
        job.current_step_label = "Starting render...".to_string();
        self.bus.publish(RenderEvent::Progress {
            render_id: job.id,
            step: "startup".to_string(),
            message: job.current_step_label.clone(),
            percent: 0.0,
        });
        true
    }

    /// Report progress. Ignored unless running; percent is clamped so it
    /// never decreases or exceeds 100.
    pub fn progress(&self, percent: f64, step: &str, message: impl Into<String>) -> bool {
        let mut job = self.lock();
        if job.status != RenderStatus::Running {
            return false;
        }
        let percent = if percent.is_finite() {
            percent.clamp(job.progress_percent, 100.0)
        } else {
            job.progress_percent
        };
        let message = message.into();
        job.progress_percent = percent;
        job.current_step_label = message.clone();
        job.updated_at = clock::now();
        self.bus.publish(RenderEvent::Progress {
            render_id: job.id,
            step: step.to_string(),
            message,
            percent,
        });
        true
    }

    /// `running → succeeded`, emitting `complete`.
    pub fn succeed(&self, output_path: PathBuf, file_size: u64) -> bool {
        let mut job = self.lock();
        if !Self::transition(&mut job, RenderStatus::Succeeded) {
            return false;
        }
        job.progress_percent = 100.0;
        job.current_step_label = "Render complete".to_string();
        job.output_path = Some(output_path.clone());
        job.file_size_bytes = Some(file_size);
        self.bus.publish(RenderEvent::Complete {
            render_id: job.id,
            output_path,
            file_size,
        });
        true
    }

    /// `→ failed`, emitting `error`.
    pub fn fail(&self, error: impl Into<String>) -> bool {
        let mut job = self.lock();
        if !Self::transition(&mut job, RenderStatus::Failed) {
            return false;
        }
        let error = error.into();
        job.current_step_label = "Render failed".to_string();
        job.error_message = Some(error.clone());
        self.bus.publish(RenderEvent::Error {
            render_id: job.id,
            error,
        });
        true
    }

    /// `→ canceled`. The event is published separately by
    /// [`JobTracker::announce_canceled`] once the record is persisted.
    pub fn cancel(&self) -> bool {
        let mut job = self.lock();
        if !Self::transition(&mut job, RenderStatus::Canceled) {
            return false;
        }
        job.current_step_label = "Render canceled".to_string();
        true
    }

    pub fn announce_canceled(&self) {
        let render_id = self.id();
        self.bus.publish(RenderEvent::Canceled { render_id });
    }

    /// Write the current record to `store`.
    ///
    /// Writes are serialized per job and always carry the latest state, so
    /// a slow progress write can never land after a terminal one.
    pub async fn persist(&self, store: &dyn JobStore) -> DeckreelResult<()> {
        let _ordered = self.persist_lock.lock().await;
        let snapshot = self.snapshot();
        store.update(&snapshot).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckreel_deck_model::job::RenderKind;
    use deckreel_deck_model::store::MemoryJobStore;
    use std::time::Duration;

    fn tracker() -> (JobTracker, Arc<ProgressBus>) {
        let bus = ProgressBus::new(Duration::from_secs(30));
        let job = RenderJob::new("d1", RenderKind::Preview);
        bus.open_topic(job.id);
        (JobTracker::new(job, Arc::clone(&bus)), bus)
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_capped() {
        let (tracker, _bus) = tracker();
        assert!(!tracker.progress(5.0, "startup", "too early"));
        assert!(tracker.start());
        assert!(tracker.progress(40.0, "rasterize", "Slide 2"));
        assert!(tracker.progress(30.0, "rasterize", "late report"));
        assert_eq!(tracker.snapshot().progress_percent, 40.0);
        tracker.progress(250.0, "compose", "overshoot");
        assert_eq!(tracker.snapshot().progress_percent, 100.0);
        tracker.progress(f64::NAN, "compose", "garbage");
        assert_eq!(tracker.snapshot().progress_percent, 100.0);
    }

    #[tokio::test]
    async fn test_terminal_state_is_final() {
        let (tracker, bus) = tracker();
        let mut rx = bus.subscribe(tracker.id()).unwrap();
        assert!(tracker.start());
        assert!(tracker.cancel());
        tracker.announce_canceled();

        assert!(!tracker.cancel());
        assert!(!tracker.fail("late failure"));
        assert!(!tracker.succeed(PathBuf::from("/out.mp4"), 10));
        assert!(!tracker.progress(90.0, "compose", "late progress"));

        let job = tracker.snapshot();
        assert_eq!(job.status, RenderStatus::Canceled);
        assert!(job.error_message.is_none());
        assert!(job.output_path.is_none());

        assert!(matches!(rx.recv().await.unwrap(), RenderEvent::Progress { .. }));
        assert!(matches!(rx.recv().await.unwrap(), RenderEvent::Canceled { .. }));
    }

    #[tokio::test]
    async fn test_cancel_while_queued_blocks_start() {
        let (tracker, _bus) = tracker();
        assert!(tracker.cancel());
        assert!(!tracker.start());
    }

    #[tokio::test]
    async fn test_persist_writes_latest_state() {
        let (tracker, _bus) = tracker();
        let store = MemoryJobStore::new();
        store.insert(&tracker.snapshot()).await.unwrap();
        tracker.start();
        tracker.succeed(PathBuf::from("/out/a.mp4"), 2048);
        tracker.persist(&store).await.unwrap();

        let stored = store.get(tracker.id()).await.unwrap().unwrap();
        assert_eq!(stored.status, RenderStatus::Succeeded);
        assert_eq!(stored.file_size_bytes, Some(2048));
        assert_eq!(stored.progress_percent, 100.0);
    }
}
