//! `MediaBackend` over ffmpeg rawvideo pipes.
//!
//! Decoding: `ffmpeg -i <in> -f rawvideo -pix_fmt rgb24 -` and read one
//! `width × height × 3` frame at a time from stdout.
//! Encoding: raw RGB24 frames on stdin, MJPEG in an AVI container out.

use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout};

use image::RgbImage;
use tracing::{debug, warn};

use super::command::{check_status, Endpoint, FfmpegCommand, StderrCollector};
use super::probe::probe_video;
use super::{ensure_parent, FrameSink, FrameSource, MediaBackend, VideoInfo};
use crate::error::MediaError;

/// MJPEG quality scale for the raw output (2 = best, 31 = worst).
const RAW_OUTPUT_QSCALE: &str = "3";

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Decoder writing RGB24 frames of the probed size to stdout.
    fn decode_command(&self, path: &Path) -> FfmpegCommand {
        FfmpegCommand::new(&self.ffmpeg, Endpoint::File(path.to_path_buf()), Endpoint::Pipe)
            .no_autorotate()
            .raw_rgb_output()
    }
}

impl Default for FfmpegBackend {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, MediaError> {
        let info = probe_video(&self.ffprobe, path)?;
        if let Some(reason) = info.degenerate_reason() {
            return Err(MediaError::InvalidMetadata(reason));
        }

        let mut child = self.decode_command(path).spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Pipe(std::io::Error::other("decoder stdout not captured")))?;
        let stderr = StderrCollector::start(child.stderr.take());

        debug!(
            resolution = %info.resolution(),
            fps = info.fps,
            frames = info.frame_count,
            "decoder started"
        );

        Ok(Box::new(FfmpegSource {
            program: self.ffmpeg.clone(),
            info,
            child: Some(child),
            stdout,
            stderr: Some(stderr),
            frame_bytes: info.width as usize * info.height as usize * 3,
        }))
    }

    fn open_sink(&self, path: &Path, info: &VideoInfo) -> Result<Box<dyn FrameSink>, MediaError> {
        ensure_parent(path)?;

        let command = FfmpegCommand::new(
            &self.ffmpeg,
            Endpoint::Pipe,
            Endpoint::File(path.to_path_buf()),
        )
        .raw_rgb_input(info.width, info.height, info.fps)
        .video_codec("mjpeg")
        .output_args(["-q:v", RAW_OUTPUT_QSCALE]);

        let mut child = command.spawn()?;
        let stdin = child.stdin.take();
        let stderr = StderrCollector::start(child.stderr.take());

        Ok(Box::new(FfmpegSink {
            program: self.ffmpeg.clone(),
            size: (info.width, info.height),
            child: Some(child),
            stdin,
            stderr: Some(stderr),
        }))
    }
}

struct FfmpegSource {
    program: PathBuf,
    info: VideoInfo,
    child: Option<Child>,
    stdout: ChildStdout,
    stderr: Option<StderrCollector>,
    frame_bytes: usize,
}

impl FfmpegSource {
    /// Reads until `buf` is full or the pipe hits EOF. Returns bytes read.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize, MediaError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.stdout.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(MediaError::Pipe(e)),
            }
        }
        Ok(filled)
    }

    fn wait(&mut self) -> Result<(), MediaError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self.stderr.take().map(|s| s.finish()).unwrap_or_default();
        check_status(&self.program, status, stderr)
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, MediaError> {
        if self.child.is_none() {
            return Ok(None);
        }

        let mut buf = vec![0u8; self.frame_bytes];
        let read = self.fill(&mut buf)?;

        if read == 0 {
            self.wait()?;
            return Ok(None);
        }
        if read < self.frame_bytes {
            return Err(MediaError::TruncatedFrame {
                expected: self.frame_bytes,
                actual: read,
            });
        }

        RgbImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or(MediaError::TruncatedFrame {
                expected: self.frame_bytes,
                actual: read,
            })
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

struct FfmpegSink {
    program: PathBuf,
    size: (u32, u32),
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<StderrCollector>,
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<(), MediaError> {
        if frame.dimensions() != self.size {
            return Err(MediaError::FrameSize {
                expected: self.size,
                actual: frame.dimensions(),
            });
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::Pipe(std::io::Error::from(ErrorKind::BrokenPipe)))?;
        stdin.write_all(frame.as_raw())?;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<(), MediaError> {
        // Closing stdin lets the encoder flush and exit.
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child.wait()?;
        let stderr = self.stderr.take().map(|s| s.finish()).unwrap_or_default();
        check_status(&self.program, status, stderr)
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            // Let the encoder finalize what it has so partial output stays playable.
            if let Err(e) = child.wait() {
                warn!("Encoder did not exit cleanly: {}", e);
            }
        }
    }
}
