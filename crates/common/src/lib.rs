//! Deckreel Common Utilities
//!
//! Shared infrastructure for all Deckreel crates:
//! - Error types and result aliases
//! - Clock and duration helpers used for job timestamps and encoder arguments
//! - Tracing/logging initialization
//! - Configuration loading

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
