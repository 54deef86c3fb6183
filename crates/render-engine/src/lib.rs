//! Deckreel Render Engine
//!
//! Turns a deck into a video file, one stage per module:
//!
//! ```text
//! deck.json ──► media (ffprobe, cache) ──► planner ──► Segment[]
//!                                                        │
//! slides ──► markup ──► rasterizer (worker) ──► slide_NNN.png
//!                                                        │
//!                     filter_graph ──► compose (ffmpeg) ─┴──► output.mp4
//! ```
//!
//! Every external process a job spawns is registered in the [`process`]
//! table so cancellation can reach it.

pub mod compose;
pub mod filter_graph;
pub mod markup;
pub mod media;
pub mod planner;
pub mod process;
pub mod progress;
pub mod rasterizer;

pub use compose::{CompositionBackend, CompositionRequest, FfmpegComposer, ProgressFn};
pub use media::{MediaResolver, ResolvedAsset, ResolvedBundle, ResolvedMedia};
pub use planner::SegmentPlanner;
pub use process::{command_exists, ProcessGuard, ProcessScope, ProcessTable};
pub use progress::{EncodeProgress, ProgressBand, ProgressState};
pub use rasterizer::{RasterEngine, RasterSession, SlideRasterizer, WorkerRasterEngine};
