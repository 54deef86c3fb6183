//! Render job records.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use deckreel_common::error::DeckreelError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a render job.
pub type RenderId = Uuid;

/// Requested render quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    Preview,
    Final,
}

impl RenderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderKind::Preview => "preview",
            RenderKind::Final => "final",
        }
    }
}

impl FromStr for RenderKind {
    type Err = DeckreelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "preview" => Ok(RenderKind::Preview),
            "final" => Ok(RenderKind::Final),
            other => Err(DeckreelError::validation(format!(
                "Unknown render kind: {other:?} (expected \"preview\" or \"final\")"
            ))),
        }
    }
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl RenderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderStatus::Queued => "queued",
            RenderStatus::Running => "running",
            RenderStatus::Succeeded => "succeeded",
            RenderStatus::Failed => "failed",
            RenderStatus::Canceled => "canceled",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RenderStatus::Succeeded | RenderStatus::Failed | RenderStatus::Canceled
        )
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: RenderStatus) -> bool {
        use RenderStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Canceled)
                | (Queued, Failed)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Canceled)
        )
    }
}

impl fmt::Display for RenderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted state of one render request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderJob {
    pub id: RenderId,
    pub deck_id: String,
    pub kind: RenderKind,
    pub status: RenderStatus,
    /// Overall progress in `[0, 100]`, never decreasing.
    pub progress_percent: f64,
    pub current_step_label: String,
    pub output_path: Option<PathBuf>,
    pub file_size_bytes: Option<u64>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Create a queued job.
    pub fn new(deck_id: impl Into<String>, kind: RenderKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            deck_id: deck_id.into(),
            kind,
            status: RenderStatus::Queued,
            progress_percent: 0.0,
            current_step_label: "Queued".to_string(),
            output_path: None,
            file_size_bytes: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Output file name, derived from the deck, creation time, and job id.
    pub fn output_file_name(&self) -> String {
        format!(
            "deck-{}-{}-{}.mp4",
            sanitize_file_component(&self.deck_id),
            self.created_at.format("%Y%m%dT%H%M%S"),
            self.id.simple()
        )
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

fn sanitize_file_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "deck".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("preview".parse::<RenderKind>().unwrap(), RenderKind::Preview);
        assert_eq!(" FINAL ".parse::<RenderKind>().unwrap(), RenderKind::Final);
        let err = "draft".parse::<RenderKind>().unwrap_err();
        assert!(matches!(err, DeckreelError::Validation { .. }));
    }

    #[test]
    fn test_transitions_are_monotonic() {
        use RenderStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Queued.can_transition_to(Canceled));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Canceled));
        assert!(!Running.can_transition_to(Queued));
        for terminal in [Succeeded, Failed, Canceled] {
            assert!(terminal.is_terminal());
            for next in [Queued, Running, Succeeded, Failed, Canceled] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_output_file_name_is_deterministic() {
        let job = RenderJob::new("intro/deck 1", RenderKind::Preview);
        let name = job.output_file_name();
        assert_eq!(name, job.output_file_name());
        assert!(name.starts_with("deck-intro_deck_1-"));
        assert!(name.ends_with(&format!("{}.mp4", job.id.simple())));
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = RenderJob::new("d1", RenderKind::Final);
        assert_eq!(job.status, RenderStatus::Queued);
        assert_eq!(job.progress_percent, 0.0);
        assert_eq!(job.created_at, job.updated_at);
        assert!(!job.is_terminal());
    }
}
