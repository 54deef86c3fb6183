//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DeckreelError, DeckreelResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding job records and deck bundles.
    pub data_dir: PathBuf,

    /// Root for per-job temporary working directories.
    pub work_dir: PathBuf,

    /// Directory where finished renders are written.
    pub output_dir: PathBuf,

    /// Base directory that relative media asset paths are resolved against.
    pub media_root: PathBuf,

    /// External tool locations.
    pub tools: ToolPaths,

    /// Render pipeline tuning.
    pub render: RenderDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Locations of the external processes the pipeline delegates to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Encoder binary.
    pub ffmpeg: PathBuf,

    /// Media probe binary.
    pub ffprobe: PathBuf,

    /// Command line of the headless slide rendering worker.
    /// The first element is the program, the rest are arguments.
    pub raster_worker: Vec<String>,
}

/// Render pipeline parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderDefaults {
    /// Jobs allowed to run at once; the rest wait in `queued`.
    pub max_concurrent_jobs: usize,

    /// Seconds a job's event topic stays open after its terminal event.
    pub event_linger_secs: u64,

    /// Duration assumed for a video whose probe failed.
    pub default_probe_duration_ms: u64,

    /// Sample rate every audio stream is resampled to.
    pub audio_sample_rate: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "deckreel=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let data_dir = dirs_default_data();
        Self {
            work_dir: std::env::temp_dir().join("deckreel"),
            output_dir: data_dir.join("renders"),
            media_root: data_dir.join("media"),
            data_dir,
            tools: ToolPaths::default(),
            render: RenderDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            raster_worker: vec!["deckreel-raster-worker".to_string()],
        }
    }
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            event_linger_secs: 30,
            default_probe_duration_ms: 5000,
            audio_sample_rate: 44_100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match Self::load_from(&config_path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!("Failed to load config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit file.
    pub fn load_from(path: impl AsRef<Path>) -> DeckreelResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeckreelError::config(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> DeckreelResult<()> {
        if self.render.max_concurrent_jobs == 0 {
            return Err(DeckreelError::config(
                "render.max_concurrent_jobs must be at least 1",
            ));
        }
        if self.render.audio_sample_rate == 0 {
            return Err(DeckreelError::config(
                "render.audio_sample_rate must be positive",
            ));
        }
        if self.tools.raster_worker.is_empty() {
            return Err(DeckreelError::config(
                "tools.raster_worker must name a program",
            ));
        }
        Ok(())
    }

    /// Directory holding deck bundles (`<decks_dir>/<deck_id>/deck.json`).
    pub fn decks_dir(&self) -> PathBuf {
        self.data_dir.join("decks")
    }

    /// Directory holding persisted job records.
    pub fn jobs_dir(&self) -> PathBuf {
        self.data_dir.join("jobs")
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("deckreel").join("config.json")
}

/// Default data directory.
fn dirs_default_data() -> PathBuf {
    let base = std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local").join("share")
        });
    base.join("deckreel")
}
