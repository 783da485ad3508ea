//! Conversion of the raw MJPEG output into a browser-playable MP4.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::command::{Endpoint, FfmpegCommand};
use super::ensure_parent;
use crate::error::MediaError;

pub trait Transcoder: Send + Sync {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), MediaError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeSettings {
    pub video_codec: String,
    pub crf: u8,
    pub preset: String,
}

impl Default for TranscodeSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            crf: 23,
            preset: "veryfast".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    settings: TranscodeSettings,
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, settings: TranscodeSettings) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            settings,
        }
    }

    pub fn command(&self, input: &Path, output: &Path) -> FfmpegCommand {
        FfmpegCommand::new(
            &self.ffmpeg,
            Endpoint::File(input.to_path_buf()),
            Endpoint::File(output.to_path_buf()),
        )
        .video_codec(self.settings.video_codec.clone())
        .preset(self.settings.preset.clone())
        .crf(self.settings.crf)
        .output_args(["-pix_fmt", "yuv420p", "-movflags", "+faststart", "-an"])
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        if !input.is_file() {
            return Err(MediaError::FileNotFound(input.to_path_buf()));
        }
        ensure_parent(output)?;
        self.command(input, output).run()?;
        info!("Transcoded {} -> {}", input.display(), output.display());
        Ok(())
    }
}
