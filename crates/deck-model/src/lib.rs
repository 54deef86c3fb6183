//! Deckreel Deck Model
//!
//! Defines the data contracts of the render pipeline:
//! - **Deck / Slide:** Structured slide content and layout selection
//! - **Timeline:** Intro, outro, and interstitial video attachments
//! - **Asset:** Media references with cached probe metadata
//! - **Segment:** Planned composition units, fixed once planned
//! - **Quality:** Per-job resolution/bitrate presets
//! - **Job:** Render job records and their state machine
//! - **Store:** Storage collaborator traits with memory and filesystem backends
//!
//! All durations are integer milliseconds.

pub mod asset;
pub mod bundle;
pub mod deck;
pub mod job;
pub mod quality;
pub mod segment;
pub mod store;
pub mod timeline;

pub use asset::*;
pub use bundle::*;
pub use deck::*;
pub use job::*;
pub use quality::*;
pub use segment::*;
pub use store::*;
pub use timeline::*;
