//! In-process progress event bus.
//!
//! One broadcast topic per job plus a global firehose. A job's topic is
//! dropped a fixed delay after its terminal event, which closes every
//! receiver still attached to it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use deckreel_deck_model::job::RenderId;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 128;
const GLOBAL_CAPACITY: usize = 512;

/// Events published for render jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RenderEvent {
    Progress {
        render_id: RenderId,
        step: String,
        message: String,
        percent: f64,
    },
    Complete {
        render_id: RenderId,
        output_path: PathBuf,
        file_size: u64,
    },
    Error {
        render_id: RenderId,
        error: String,
    },
    Canceled {
        render_id: RenderId,
    },
}

impl RenderEvent {
    pub fn render_id(&self) -> RenderId {
        match self {
            RenderEvent::Progress { render_id, .. }
            | RenderEvent::Complete { render_id, .. }
            | RenderEvent::Error { render_id, .. }
            | RenderEvent::Canceled { render_id } => *render_id,
        }
    }

    /// Whether this is the last event a job will publish.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RenderEvent::Progress { .. })
    }
}

/// Broadcast hub for [`RenderEvent`]s.
#[derive(Debug)]
pub struct ProgressBus {
    topics: Mutex<HashMap<RenderId, broadcast::Sender<RenderEvent>>>,
    global_tx: broadcast::Sender<RenderEvent>,
    linger: Duration,
}

impl ProgressBus {
    /// Create a bus whose topics linger for `linger` after a terminal event.
    pub fn new(linger: Duration) -> Arc<Self> {
        let (global_tx, _) = broadcast::channel(GLOBAL_CAPACITY);
        Arc::new(Self {
            topics: Mutex::new(HashMap::new()),
            global_tx,
            linger,
        })
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<RenderId, broadcast::Sender<RenderEvent>>> {
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create the topic for a new job.
    pub fn open_topic(&self, render_id: RenderId) {
        self.topics()
            .entry(render_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0);
    }

    pub fn has_topic(&self, render_id: RenderId) -> bool {
        self.topics().contains_key(&render_id)
    }

    /// Subscribe to one job. `None` if the job has no open topic.
    pub fn subscribe(&self, render_id: RenderId) -> Option<broadcast::Receiver<RenderEvent>> {
        self.topics().get(&render_id).map(|tx| tx.subscribe())
    }

    /// Subscribe to every job's events.
    pub fn subscribe_all(&self) -> broadcast::Receiver<RenderEvent> {
        self.global_tx.subscribe()
    }

    /// Publish an event. Terminal events schedule the topic's removal.
    pub fn publish(self: &Arc<Self>, event: RenderEvent) {
        let render_id = event.render_id();
        let terminal = event.is_terminal();

        if let Some(tx) = self.topics().get(&render_id) {
            // No subscribers is fine.
            let _ = tx.send(event.clone());
        }
        let _ = self.global_tx.send(event);

        if terminal {
            self.schedule_close(render_id);
        }
    }

    fn schedule_close(self: &Arc<Self>, render_id: RenderId) {
        let bus = Arc::clone(self);
        let linger = self.linger;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(linger).await;
                    if bus.topics().remove(&render_id).is_some() {
                        tracing::debug!(render_id = %render_id, "Closed progress topic");
                    }
                });
            }
            Err(_) => {
                self.topics().remove(&render_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;
    use uuid::Uuid;

    fn progress(render_id: RenderId, percent: f64) -> RenderEvent {
        RenderEvent::Progress {
            render_id,
            step: "rasterize".into(),
            message: "Rendering".into(),
            percent,
        }
    }

    #[tokio::test]
    async fn test_topic_delivery_is_ordered() {
        let bus = ProgressBus::new(Duration::from_secs(30));
        let id = Uuid::new_v4();
        bus.open_topic(id);
        let mut rx = bus.subscribe(id).unwrap();

        bus.publish(progress(id, 10.0));
        bus.publish(progress(id, 20.0));
        bus.publish(RenderEvent::Canceled { render_id: id });

        assert_eq!(rx.recv().await.unwrap(), progress(id, 10.0));
        assert_eq!(rx.recv().await.unwrap(), progress(id, 20.0));
        assert!(rx.recv().await.unwrap().is_terminal());
    }

    #[tokio::test]
    async fn test_topics_are_isolated_and_global_sees_all() {
        let bus = ProgressBus::new(Duration::from_secs(30));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        bus.open_topic(a);
        bus.open_topic(b);
        let mut rx_a = bus.subscribe(a).unwrap();
        let mut all = bus.subscribe_all();

        bus.publish(progress(b, 5.0));
        bus.publish(progress(a, 7.0));

        assert_eq!(rx_a.recv().await.unwrap().render_id(), a);
        assert_eq!(all.recv().await.unwrap().render_id(), b);
        assert_eq!(all.recv().await.unwrap().render_id(), a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_topic_dropped_after_linger() {
        let bus = ProgressBus::new(Duration::from_secs(30));
        let id = Uuid::new_v4();
        bus.open_topic(id);
        let mut rx = bus.subscribe(id).unwrap();

        bus.publish(RenderEvent::Error {
            render_id: id,
            error: "boom".into(),
        });
        assert!(matches!(rx.recv().await.unwrap(), RenderEvent::Error { .. }));
        assert!(bus.has_topic(id));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!bus.has_topic(id));
        assert!(bus.subscribe(id).is_none());
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));
    }

    #[test]
    fn test_event_wire_format() {
        let id = Uuid::nil();
        let json = serde_json::to_value(RenderEvent::Complete {
            render_id: id,
            output_path: PathBuf::from("/out/a.mp4"),
            file_size: 42,
        })
        .unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["file_size"], 42);
        assert_eq!(json["render_id"], id.to_string());
    }
}
