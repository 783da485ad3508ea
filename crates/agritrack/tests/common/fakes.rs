//! Test doubles for the worker's injected components.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use image::{Rgb, RgbImage};

use agritrack::detection::{BoundingBox, Detection, DetectionError, Detector};
use agritrack::error::MediaError;
use agritrack::media::{FrameSink, FrameSource, MediaBackend, Transcoder, VideoInfo};

type Script = Box<dyn FnMut(u64) -> Result<Vec<Detection>, DetectionError> + Send>;

/// Detector driven by a closure over the zero-based call index.
pub struct ScriptedDetector {
    script: Script,
    calls: u64,
}

impl ScriptedDetector {
    pub fn new<F>(script: F) -> Self
    where
        F: FnMut(u64) -> Result<Vec<Detection>, DetectionError> + Send + 'static,
    {
        Self {
            script: Box::new(script),
            calls: 0,
        }
    }

    /// One object sitting still, every frame.
    pub fn steady(score: f32) -> Self {
        Self::new(move |_| Ok(vec![sheep_at(30.0, 30.0, score)]))
    }

    pub fn empty() -> Self {
        Self::new(|_| Ok(vec![]))
    }

    /// Like `steady`, but fails from call `k` on.
    pub fn failing_at(k: u64, score: f32) -> Self {
        Self::new(move |i| {
            if i >= k {
                Err(DetectionError::inference("inference server went away"))
            } else {
                Ok(vec![sheep_at(30.0, 30.0, score)])
            }
        })
    }
}

impl Detector for ScriptedDetector {
    fn infer(&mut self, _frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        let index = self.calls;
        self.calls += 1;
        (self.script)(index)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// A 20x20 box centered on (x, y).
pub fn sheep_at(x: f32, y: f32, score: f32) -> Detection {
    Detection {
        bbox: BoundingBox::new(x - 10.0, y - 10.0, x + 10.0, y + 10.0),
        score,
        label: "Sheep".to_string(),
    }
}

pub fn video(frame_count: u64, fps: f64) -> VideoInfo {
    VideoInfo {
        width: 64,
        height: 48,
        fps,
        frame_count,
    }
}

/// In-memory media backend. Videos are registered by upload file name;
/// the upload must also exist on disk to be opened.
#[derive(Clone, Default)]
pub struct FakeMedia {
    videos: Arc<Mutex<HashMap<String, VideoInfo>>>,
    // keyed by file stem, which raw output names share with the upload
    sink_failures: Arc<Mutex<HashMap<String, u64>>>,
    written: Arc<Mutex<HashMap<PathBuf, u64>>>,
}

fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

impl FakeMedia {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, file_name: &str, info: VideoInfo) {
        self.videos
            .lock()
            .unwrap()
            .insert(file_name.to_string(), info);
    }

    /// Makes the encoder for `file_name` fail once `frames` were written.
    pub fn fail_sink_after(&self, file_name: &str, frames: u64) {
        self.sink_failures
            .lock()
            .unwrap()
            .insert(stem_of(Path::new(file_name)), frames);
    }

    /// Frames encoded into the raw output at `path`.
    pub fn frames_written(&self, path: &Path) -> Option<u64> {
        self.written.lock().unwrap().get(path).copied()
    }
}

impl MediaBackend for FakeMedia {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, MediaError> {
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let info = self
            .videos
            .lock()
            .unwrap()
            .get(&name)
            .copied()
            .ok_or_else(|| MediaError::Probe(format!("unregistered video {}", name)))?;
        Ok(Box::new(FakeSource { info, next: 0 }))
    }

    fn open_sink(&self, path: &Path, _info: &VideoInfo) -> Result<Box<dyn FrameSink>, MediaError> {
        let fail_after = self.sink_failures.lock().unwrap().get(&stem_of(path)).copied();
        self.written.lock().unwrap().insert(path.to_path_buf(), 0);
        Ok(Box::new(FakeSink {
            path: path.to_path_buf(),
            written: Arc::clone(&self.written),
            count: 0,
            fail_after,
        }))
    }
}

struct FakeSource {
    info: VideoInfo,
    next: u64,
}

impl FrameSource for FakeSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, MediaError> {
        if self.next >= self.info.frame_count {
            return Ok(None);
        }
        self.next += 1;
        let shade = (self.next % 255) as u8;
        Ok(Some(RgbImage::from_pixel(
            self.info.width,
            self.info.height,
            Rgb([shade, 90, 40]),
        )))
    }
}

struct FakeSink {
    path: PathBuf,
    written: Arc<Mutex<HashMap<PathBuf, u64>>>,
    count: u64,
    fail_after: Option<u64>,
}

impl FrameSink for FakeSink {
    fn write_frame(&mut self, _frame: &RgbImage) -> Result<(), MediaError> {
        if self.fail_after.is_some_and(|n| self.count >= n) {
            return Err(MediaError::Pipe(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "encoder exited",
            )));
        }
        self.count += 1;
        self.written.lock().unwrap().insert(self.path.clone(), self.count);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), MediaError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, self.count.to_le_bytes())?;
        Ok(())
    }
}

/// Transcoder that copies the raw output, or fails on demand.
#[derive(Clone, Default)]
pub struct FakeTranscoder {
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FakeTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcoder for FakeTranscoder {
    fn transcode(&self, input: &Path, output: &Path) -> Result<(), MediaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(MediaError::ExitStatus {
                program: "ffmpeg".to_string(),
                code: Some(1),
                stderr: "Unknown encoder 'libx264'".to_string(),
            });
        }
        std::fs::copy(input, output)?;
        Ok(())
    }
}
