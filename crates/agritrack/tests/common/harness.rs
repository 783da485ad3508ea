//! Test harness for isolated worker runs.
//!
//! Each `TestHarness` owns a temporary media root and an in-memory job
//! store, and wires the fakes from `fakes.rs` into a real `Worker`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tempfile::TempDir;

use agritrack::config::WorkerConfig;
use agritrack::db::job_repo::{self, JobRow, NewJob};
use agritrack::db::Database;
use agritrack::detection::{CentroidTracker, Detector};
use agritrack::media::{Transcoder, VideoInfo};
use agritrack::worker::job::{now_timestamp, UPLOADS_DIR};
use agritrack::worker::Worker;
use agritrack::{Pipeline, PipelineConfig};

use super::fakes::{FakeMedia, FakeTranscoder};

pub struct TestHarness {
    temp_dir: TempDir,
    pub media_root: PathBuf,
    pub db: Database,
    pub media: FakeMedia,
    pub transcoder: Option<FakeTranscoder>,
    pub shutdown: Arc<AtomicBool>,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let media_root = temp_dir.path().join("media");
        std::fs::create_dir_all(media_root.join(UPLOADS_DIR)).expect("Failed to create uploads dir");

        Self {
            temp_dir,
            media_root,
            db: Database::open_in_memory().expect("Failed to open database"),
            media: FakeMedia::new(),
            transcoder: Some(FakeTranscoder::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_transcoder(mut self, transcoder: Option<FakeTranscoder>) -> Self {
        self.transcoder = transcoder;
        self
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Places an upload on disk, registers its stream info, and queues it.
    pub fn upload(&self, file_name: &str, info: VideoInfo) -> i64 {
        std::fs::write(self.media_root.join(UPLOADS_DIR).join(file_name), b"fake video")
            .expect("Failed to write upload");
        self.media.register(file_name, info);
        self.enqueue(file_name)
    }

    /// Queues a job without creating its upload.
    pub fn enqueue(&self, file_name: &str) -> i64 {
        let ext = Path::new(file_name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        job_repo::insert(
            &self.db,
            &NewJob {
                file_name: file_name.to_string(),
                format: ext,
                size: 0.5,
                upload_timestamp: now_timestamp(),
            },
        )
        .expect("Failed to insert job")
    }

    pub fn worker(&self, detector: impl Detector + 'static) -> Worker {
        self.worker_with_config(detector, &WorkerConfig::default())
    }

    pub fn worker_with_config(&self, detector: impl Detector + 'static, config: &WorkerConfig) -> Worker {
        let transcoder = self
            .transcoder
            .clone()
            .map(|t| Arc::new(t) as Arc<dyn Transcoder>);
        let pipeline = Pipeline::new(
            Arc::new(PipelineConfig::with_media_root(&self.media_root)),
            Box::new(detector),
            Box::new(CentroidTracker::default()),
            Arc::new(self.media.clone()),
            transcoder,
        );
        Worker::new(self.db.clone(), pipeline, config).with_shutdown_flag(Arc::clone(&self.shutdown))
    }

    pub fn job(&self, id: i64) -> JobRow {
        job_repo::find_by_id(&self.db, id)
            .expect("Failed to query job")
            .expect("Job not found")
    }

    pub fn media_path(&self, relative: &str) -> PathBuf {
        self.media_root.join(relative)
    }
}
