use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::detection::{RemoteDetectorConfig, TrackerConfig};
use crate::media::TranscodeSettings;

pub const CONFIG_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite file. Defaults to `~/.agritrack/data/agritrack.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<String>,
    /// Root under which `uploads/`, `processed/` and `thumbnails/` live.
    pub media_root: String,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub tracking: TrackerConfig,
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub transcode: TranscodeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// A configuration with every section at its default.
    pub fn with_media_root(media_root: impl Into<String>) -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            database_path: None,
            media_root: media_root.into(),
            worker: WorkerConfig::default(),
            detection: DetectionConfig::default(),
            tracking: TrackerConfig::default(),
            progress: ProgressConfig::default(),
            transcode: TranscodeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    pub fn media_root(&self) -> PathBuf {
        PathBuf::from(&self.media_root)
    }

    /// Configured database path, falling back to the per-user default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database_path
            .as_ref()
            .map(PathBuf::from)
            .or_else(crate::db::default_database_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    #[serde(default = "default_true")]
    pub recover_interrupted_on_start: bool,
}

fn default_poll_interval() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

/// Upper bound for the poll interval and the inference timeout, in seconds.
pub const MAX_WAIT_SECS: f64 = 3600.0;

/// Clamps to `[1ms, MAX_WAIT_SECS]`; NaN maps to the minimum.
fn wait_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs.clamp(0.001, MAX_WAIT_SECS))
        .unwrap_or(Duration::from_millis(1))
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        wait_duration(self.poll_interval_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            recover_interrupted_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Detections must score strictly above this to be kept.
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Label drawn on boxes and used when the detector omits one.
    #[serde(default = "default_label")]
    pub label: String,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:8000/infer".to_string()
}

fn default_acceptance_threshold() -> f32 {
    0.97
}

fn default_timeout_secs() -> f64 {
    30.0
}

fn default_label() -> String {
    "Sheep".to_string()
}

impl DetectionConfig {
    pub fn remote(&self) -> RemoteDetectorConfig {
        RemoteDetectorConfig {
            endpoint: self.endpoint.clone(),
            timeout: wait_duration(self.timeout_secs),
            default_label: self.label.clone(),
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            acceptance_threshold: default_acceptance_threshold(),
            timeout_secs: default_timeout_secs(),
            label: default_label(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Minimum advance, in percentage points, between persisted updates.
    #[serde(default = "default_step_percent")]
    pub step_percent: u8,
}

fn default_step_percent() -> u8 {
    5
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            step_percent: default_step_percent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_preset")]
    pub preset: String,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_video_codec() -> String {
    TranscodeSettings::default().video_codec
}

fn default_crf() -> u8 {
    TranscodeSettings::default().crf
}

fn default_preset() -> String {
    TranscodeSettings::default().preset
}

impl TranscodeConfig {
    pub fn settings(&self) -> TranscodeSettings {
        TranscodeSettings {
            video_codec: self.video_codec.clone(),
            crf: self.crf,
            preset: self.preset.clone(),
        }
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            video_codec: default_video_codec(),
            crf: default_crf(),
            preset: default_preset(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}
