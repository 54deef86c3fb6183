//! # deckreel-render-jobs
//!
//! Asynchronous render jobs: queueing, per-job state, progress events, and
//! cancellation. The pipeline stages themselves live in
//! `deckreel-render-engine`; this crate drives them for one job at a time per
//! concurrency slot.

pub mod bus;
pub mod coordinator;
pub mod tracker;

pub use bus::{ProgressBus, RenderEvent};
pub use coordinator::{
    CoordinatorSettings, RenderCoordinator, RenderProgress, RenderStatusView, RenderTicket,
};
pub use tracker::JobTracker;
