//! Error types shared across Deckreel crates.

use std::path::PathBuf;

/// Top-level error type for Deckreel operations.
///
/// Probe problems are intentionally absent: a failed media probe is logged as
/// a warning and replaced by a default, it never surfaces as an error value.
#[derive(Debug, thiserror::Error)]
pub enum DeckreelError {
    /// Rejected before a job exists (bad kind, unknown deck, empty deck).
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Rasterization error: {message}")]
    Rasterization { message: String },

    /// The external encoder exited unsuccessfully.
    #[error("Encoding error: {message}")]
    Encoding {
        message: String,
        /// Captured stderr of the encoder process.
        diagnostics: String,
    },

    /// The job was canceled on request. Not a failure.
    #[error("Render canceled")]
    Canceled,

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using DeckreelError.
pub type DeckreelResult<T> = Result<T, DeckreelError>;

impl DeckreelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    pub fn rasterization(msg: impl Into<String>) -> Self {
        Self::Rasterization {
            message: msg.into(),
        }
    }

    pub fn encoding(msg: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self::Encoding {
            message: msg.into(),
            diagnostics: diagnostics.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Whether this error represents a deliberate cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }

    /// Message suitable for a job record's `error_message`.
    ///
    /// Encoder diagnostics are appended (last lines only) so a failed job
    /// carries enough context to debug without the full log.
    pub fn job_message(&self) -> String {
        match self {
            Self::Encoding {
                message,
                diagnostics,
            } => {
                let tail = diagnostics_tail(diagnostics, 8);
                if tail.is_empty() {
                    message.clone()
                } else {
                    format!("{message}: {tail}")
                }
            }
            other => other.to_string(),
        }
    }
}

fn diagnostics_tail(diagnostics: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = diagnostics
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canceled_is_distinct_from_encoding() {
        assert!(DeckreelError::Canceled.is_canceled());
        assert!(!DeckreelError::encoding("ffmpeg failed", "").is_canceled());
    }

    #[test]
    fn test_job_message_keeps_diagnostics_tail() {
        let diagnostics = (1..=12)
            .map(|i| format!("line {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let err = DeckreelError::encoding("ffmpeg exited with status 1", diagnostics);
        let message = err.job_message();
        assert!(message.starts_with("ffmpeg exited with status 1: "));
        assert!(message.contains("line 12"));
        assert!(!message.contains("line 4 |"));
    }

    #[test]
    fn test_job_message_without_diagnostics() {
        let err = DeckreelError::encoding("ffmpeg exited", "\n  \n");
        assert_eq!(err.job_message(), "ffmpeg exited");
        assert_eq!(
            DeckreelError::rasterization("worker died").job_message(),
            "Rasterization error: worker died"
        );
    }
}
