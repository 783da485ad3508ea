//! Frame I/O. Decoding and encoding go through external `ffmpeg`/`ffprobe`
//! processes; the pipeline only sees the `FrameSource`/`FrameSink` traits.

use std::path::Path;

use image::RgbImage;
use serde::Serialize;

use crate::error::MediaError;

pub mod command;
pub mod ffmpeg;
pub mod probe;
pub mod thumbnail;
pub mod transcode;

pub use command::FfmpegCommand;
pub use ffmpeg::FfmpegBackend;
pub use probe::probe_video;
pub use thumbnail::save_thumbnail;
pub use transcode::{FfmpegTranscoder, TranscodeSettings, Transcoder};

/// Stream properties known before the first frame is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// Frame count as reported by the container. May differ from the
    /// number of frames actually decoded.
    pub frame_count: u64,
}

impl VideoInfo {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// `frame_count / fps`, or 0.0 for a non-positive frame rate.
    pub fn duration_seconds(&self) -> f64 {
        if self.fps > 0.0 && self.fps.is_finite() {
            self.frame_count as f64 / self.fps
        } else {
            0.0
        }
    }

    /// Returns the reason this stream cannot be processed, if any.
    pub fn degenerate_reason(&self) -> Option<String> {
        if self.frame_count == 0 {
            Some("video reports zero frames".to_string())
        } else if !(self.fps.is_finite() && self.fps > 0.0) {
            Some(format!("video reports a non-positive frame rate ({})", self.fps))
        } else if self.width == 0 || self.height == 0 {
            Some(format!("video reports an empty frame size ({})", self.resolution()))
        } else {
            None
        }
    }
}

/// Ordered stream of decoded RGB frames.
pub trait FrameSource: Send {
    fn info(&self) -> &VideoInfo;

    /// Next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>, MediaError>;
}

/// Encoder for annotated frames.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), MediaError>;

    /// Flushes and closes the output. Frames written so far stay on disk
    /// even if this is never called.
    fn finish(self: Box<Self>) -> Result<(), MediaError>;
}

/// Opens frame sources and sinks for concrete files.
pub trait MediaBackend: Send + Sync {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, MediaError>;

    fn open_sink(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn FrameSink>, MediaError>;
}

/// Creates the parent directory of `path` if needed.
pub(crate) fn ensure_parent(path: &Path) -> Result<(), MediaError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| MediaError::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }
    Ok(())
}
