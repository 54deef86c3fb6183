//! Deck bundles: a deck with its slides and timeline, as stored on disk.
//!
//! Layout of a bundle directory:
//!
//! ```text
//! <deck_id>/
//!   deck.json      # DeckBundle
//!   media/         # optional, conventional home for relative asset paths
//! ```

use std::path::{Path, PathBuf};

use deckreel_common::error::DeckreelError;
use serde::{Deserialize, Serialize};

use crate::deck::{Deck, Slide};
use crate::timeline::{TimelineItem, TimelineItemKind};

/// File name of the bundle manifest inside a deck directory.
pub const BUNDLE_FILE: &str = "deck.json";

/// A deck together with everything needed to render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckBundle {
    pub deck: Deck,
    pub slides: Vec<Slide>,
    #[serde(default)]
    pub timeline: Vec<TimelineItem>,
}

impl DeckBundle {
    /// Load a bundle from its directory.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, BundleError> {
        let path = dir.as_ref().join(BUNDLE_FILE);
        let content = std::fs::read_to_string(&path).map_err(|e| BundleError::IoError {
            path: path.clone(),
            source: e,
        })?;
        let mut bundle: DeckBundle =
            serde_json::from_str(&content).map_err(|e| BundleError::ParseError {
                path: path.clone(),
                source: e,
            })?;
        bundle.sort_slides();
        Ok(bundle)
    }

    /// Save the bundle into its directory, creating it if needed.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<(), BundleError> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| BundleError::IoError {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = dir.join(BUNDLE_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| BundleError::ParseError {
            path: path.clone(),
            source: e,
        })?;
        std::fs::write(&path, json).map_err(|e| BundleError::IoError { path, source: e })
    }

    /// Order slides by their position (stable for equal positions).
    pub fn sort_slides(&mut self) {
        self.slides.sort_by_key(|s| s.position);
    }

    /// Check the invariants a render relies on.
    pub fn validate(&self) -> Result<(), BundleError> {
        if self.slides.is_empty() {
            return Err(BundleError::ValidationError {
                message: format!("Deck {} has no slides", self.deck.id),
            });
        }

        for kind in [TimelineItemKind::Intro, TimelineItemKind::Outro] {
            let count = self.timeline.iter().filter(|item| item.kind == kind).count();
            if count > 1 {
                return Err(BundleError::ValidationError {
                    message: format!(
                        "Deck {} has {count} {kind:?} items; at most one is allowed",
                        self.deck.id
                    ),
                });
            }
        }

        if let Some(item) = self
            .timeline
            .iter()
            .find(|item| item.asset_path.trim().is_empty())
        {
            return Err(BundleError::ValidationError {
                message: format!("Timeline {:?} item has an empty asset path", item.kind),
            });
        }

        Ok(())
    }

    /// Total slide time as authored (ignores probed video durations).
    pub fn authored_duration_ms(&self) -> u64 {
        self.slides.iter().map(|s| s.duration_ms).sum()
    }
}

/// Errors that can occur when working with deck bundles.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Parse error in {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid deck: {message}")]
    ValidationError { message: String },
}

impl From<BundleError> for DeckreelError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::ValidationError { message } => DeckreelError::validation(message),
            BundleError::IoError { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                DeckreelError::FileNotFound { path }
            }
            other => DeckreelError::storage(other.to_string()),
        }
    }
}
