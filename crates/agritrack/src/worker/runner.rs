use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use tracing::info_span;

use crate::config::WorkerConfig;
use crate::db::job_repo::{self, CompletionMetrics};
use crate::db::Database;
use crate::error::{MediaError, WorkerError};
use crate::pipeline::{JobContext, Pipeline, StoreProgress};
use crate::sanitize;
use crate::worker::job::{now_timestamp, Job, JobResult};

pub const RESTART_REASON: &str = "interrupted: worker restarted while processing";

/// Single consumer of the job queue. At most one job is PROCESSING at a time.
pub struct Worker {
    db: Database,
    pipeline: Pipeline,
    poll_interval: Duration,
    recover_on_start: bool,
    shutdown: Arc<AtomicBool>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Worker {
    pub fn new(db: Database, pipeline: Pipeline, config: &WorkerConfig) -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            db,
            pipeline,
            poll_interval: config.poll_interval(),
            recover_on_start: config.recover_interrupted_on_start,
            shutdown: Arc::new(AtomicBool::new(false)),
            wake_tx,
            wake_rx,
        }
    }

    /// Uses an externally owned shutdown flag, e.g. one shared with a
    /// signal handler.
    pub fn with_shutdown_flag(mut self, shutdown: Arc<AtomicBool>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Flag checked between iterations and between frames.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Sender that cuts the idle wait short, e.g. right after an upload.
    pub fn waker(&self) -> Sender<()> {
        self.wake_tx.clone()
    }

    /// Fails every PROCESSING row left behind by a previous run.
    pub fn recover_interrupted(&self) -> Result<usize, WorkerError> {
        let count = job_repo::fail_interrupted(&self.db, RESTART_REASON, &now_timestamp())?;
        if count > 0 {
            warn!("Marked {} interrupted job(s) as FAILED", count);
        }
        Ok(count)
    }

    /// Claims and processes one job. `Ok(None)` when the queue is empty.
    pub fn run_once(&mut self) -> Result<Option<JobResult>, WorkerError> {
        let Some(row) = job_repo::claim_next_queued(&self.db, &now_timestamp())? else {
            return Ok(None);
        };

        let job_id = row.id;
        let job = match Job::try_from(row) {
            Ok(job) => job,
            Err(e) => {
                let guard = EpisodeGuard::new(self.db.clone(), job_id);
                guard.fail(e.to_string());
                return Err(e.into());
            }
        };

        Ok(Some(self.run_episode(job)))
    }

    /// Blocks until shutdown is requested.
    pub fn run(&mut self) {
        info!("Worker started");

        if self.recover_on_start {
            if let Err(e) = self.recover_interrupted() {
                error!("Startup recovery failed: {}", e);
            }
        }

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.run_once() {
                Ok(Some(result)) if result.is_success() => continue,
                Ok(Some(_)) | Ok(None) => self.idle(),
                Err(e) => {
                    error!("Worker iteration failed: {}", e);
                    self.idle();
                }
            }
        }

        info!("Worker stopped");
    }

    fn idle(&self) {
        match self.wake_rx.recv_timeout(self.poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => std::thread::sleep(self.poll_interval),
        }
    }

    fn run_episode(&mut self, job: Job) -> JobResult {
        let file_name = sanitize::redact_path(&job.file_name);
        let _span = info_span!("job", job_id = job.id, file_name = %file_name).entered();
        info!("Processing job {} ({})", job.id, file_name);

        let guard = EpisodeGuard::new(self.db.clone(), job.id);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.process(&job)));

        match outcome {
            Ok(Ok(ctx)) => {
                let metrics = ctx.completion_metrics(Utc::now());
                match guard.complete(&metrics) {
                    Ok(()) => {
                        info!(
                            "Job {} completed: {} frames, {} objects",
                            job.id, metrics.processed_frames, metrics.detected_objects
                        );
                        JobResult::completed(
                            &job,
                            ctx.aggregator.processed_frames(),
                            ctx.aggregator.detected_objects(),
                            ctx.warning_messages(),
                        )
                    }
                    Err(e) => {
                        error!("Job {} could not be committed: {}", job.id, e);
                        JobResult::failed(&job, e.to_string())
                    }
                }
            }
            Ok(Err(e)) => {
                let reason = failure_reason(&e);
                error!("Job {} failed: {}", job.id, reason);
                guard.fail(reason.clone());
                JobResult::failed(&job, reason)
            }
            Err(payload) => {
                let reason = format!("worker panicked: {}", panic_message(payload.as_ref()));
                error!("Job {} failed: {}", job.id, reason);
                guard.fail(reason.clone());
                JobResult::failed(&job, reason)
            }
        }
    }

    fn process(&mut self, job: &Job) -> Result<JobContext, WorkerError> {
        let upload = self.pipeline.config().media_root.join(&job.artifacts().upload);

        let mut source = self.pipeline.open_source(&upload).map_err(|e| match e {
            MediaError::InvalidMetadata(reason) => WorkerError::DegenerateInput(reason),
            other => WorkerError::OpenFailed {
                path: upload.clone(),
                source: other,
            },
        })?;

        let info = *source.info();
        if let Some(reason) = info.degenerate_reason() {
            return Err(WorkerError::DegenerateInput(reason));
        }
        debug!(
            "Opened upload {} ({} frames at {} fps)",
            sanitize::hash_path(&upload),
            info.frame_count,
            info.fps
        );

        let mut ctx = JobContext::new(job.clone(), info, self.pipeline.config().step_percent);
        let progress = StoreProgress::new(self.db.clone(), job.id);
        self.pipeline
            .run(&mut ctx, source.as_mut(), &progress, &self.shutdown)?;

        Ok(ctx)
    }
}

/// Stored error text: pipeline errors carry their own wording.
fn failure_reason(error: &WorkerError) -> String {
    match error {
        WorkerError::Pipeline(e) => e.to_string(),
        other => other.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Owns the terminal transition of one claimed job. Dropping it without
/// `complete` marks the job FAILED.
struct EpisodeGuard {
    db: Database,
    job_id: i64,
    committed: bool,
    reason: Option<String>,
}

impl EpisodeGuard {
    fn new(db: Database, job_id: i64) -> Self {
        Self {
            db,
            job_id,
            committed: false,
            reason: None,
        }
    }

    fn complete(mut self, metrics: &CompletionMetrics) -> Result<(), WorkerError> {
        match job_repo::mark_completed(&self.db, self.job_id, metrics) {
            Ok(true) => {
                self.committed = true;
                Ok(())
            }
            Ok(false) => {
                // Row is no longer PROCESSING; nothing left to fail.
                self.committed = true;
                Err(WorkerError::JobVanished(self.job_id))
            }
            Err(e) => {
                self.reason = Some(format!("failed to record completion: {}", e));
                Err(e.into())
            }
        }
    }

    fn fail(mut self, reason: String) {
        self.reason = Some(reason);
    }
}

impl Drop for EpisodeGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        let reason = self
            .reason
            .take()
            .unwrap_or_else(|| "job aborted before completion".to_string());
        match job_repo::mark_failed(&self.db, self.job_id, &reason, &now_timestamp()) {
            Ok(true) => debug!("Job {} marked FAILED", self.job_id),
            Ok(false) => debug!("Job {} already terminal", self.job_id),
            Err(e) => error!("Job {} could not be marked FAILED: {}", self.job_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::job_repo::NewJob;
    use crate::pipeline::PipelineError;
    use crate::detection::{CentroidTracker, Detection, DetectionError, Detector};
    use crate::media::FfmpegBackend;
    use crate::pipeline::PipelineConfig;
    use crate::worker::job::JobStatus;
    use std::time::Instant;

    struct NoDetections;

    impl Detector for NoDetections {
        fn infer(&mut self, _frame: &image::RgbImage) -> Result<Vec<Detection>, DetectionError> {
            Ok(Vec::new())
        }

        fn name(&self) -> &str {
            "none"
        }
    }

    fn empty_queue_worker(poll_interval_secs: f64) -> Worker {
        let pipeline = Pipeline::new(
            Arc::new(PipelineConfig::with_media_root("/nonexistent")),
            Box::new(NoDetections),
            Box::new(CentroidTracker::default()),
            Arc::new(FfmpegBackend::default()),
            None,
        );
        let config = WorkerConfig {
            poll_interval_secs,
            recover_interrupted_on_start: false,
        };
        Worker::new(Database::open_in_memory().unwrap(), pipeline, &config)
    }

    #[test]
    fn test_wake_while_busy_is_buffered_once() {
        let worker = empty_queue_worker(600.0);
        let waker = worker.waker();
        assert!(waker.try_send(()).is_ok());
        assert!(waker.try_send(()).is_err());

        let started = Instant::now();
        worker.idle();
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_idle_waits_for_poll_interval_without_wake() {
        let worker = empty_queue_worker(0.05);
        let started = Instant::now();
        worker.idle();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    fn insert(db: &Database, name: &str) -> i64 {
        job_repo::insert(
            db,
            &NewJob {
                file_name: name.to_string(),
                format: ".mp4".to_string(),
                size: 1.0,
                upload_timestamp: now_timestamp(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_guard_drop_marks_failed() {
        let db = Database::open_in_memory().unwrap();
        let id = insert(&db, "a.mp4");
        job_repo::claim_next_queued(&db, &now_timestamp()).unwrap();

        drop(EpisodeGuard::new(db.clone(), id));

        let row = job_repo::find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Failed.as_str());
        assert_eq!(row.error.as_deref(), Some("job aborted before completion"));
        assert!(row.end_time.is_some());
    }

    #[test]
    fn test_guard_fail_records_reason() {
        let db = Database::open_in_memory().unwrap();
        let id = insert(&db, "a.mp4");
        job_repo::claim_next_queued(&db, &now_timestamp()).unwrap();

        EpisodeGuard::new(db.clone(), id).fail("decoder exited".to_string());

        let row = job_repo::find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.error.as_deref(), Some("decoder exited"));
    }

    #[test]
    fn test_guard_complete_is_terminal() {
        let db = Database::open_in_memory().unwrap();
        let id = insert(&db, "a.mp4");
        job_repo::claim_next_queued(&db, &now_timestamp()).unwrap();

        let metrics = CompletionMetrics {
            duration_seconds: 5.0,
            resolution: "640x480".to_string(),
            processing_time: 1.0,
            processed_frames: 100,
            detected_objects: 1,
            average_confidence: 0.99,
            final_output_video_path: None,
            end_time: now_timestamp(),
        };
        EpisodeGuard::new(db.clone(), id).complete(&metrics).unwrap();

        let row = job_repo::find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(row.status, JobStatus::Completed.as_str());
        assert_eq!(row.progress_percentage, Some(100));
        assert!(row.error.is_none());
    }

    #[test]
    fn test_failure_reason_unwraps_pipeline_errors() {
        let e = WorkerError::Pipeline(PipelineError::Interrupted);
        assert_eq!(failure_reason(&e), "interrupted: worker shutting down");

        let e = WorkerError::DegenerateInput("video reports zero frames".to_string());
        assert_eq!(failure_reason(&e), "Unusable video: video reports zero frames");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
