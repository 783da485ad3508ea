use std::path::PathBuf;

use crate::config::Config;

pub struct PipelineConfig {
    pub media_root: PathBuf,
    pub acceptance_threshold: f32,
    pub label: String,
    pub step_percent: u8,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            media_root: config.media_root(),
            acceptance_threshold: config.detection.acceptance_threshold,
            label: config.detection.label.clone(),
            step_percent: config.progress.step_percent,
        }
    }

    /// Defaults for everything but the media root.
    pub fn with_media_root(media_root: impl Into<PathBuf>) -> Self {
        let media_root = media_root.into();
        let mut config = Self::from_config(&Config::with_media_root(
            media_root.to_string_lossy().to_string(),
        ));
        config.media_root = media_root;
        config
    }
}
