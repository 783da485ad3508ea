use std::collections::HashSet;

use tracing::debug;

use crate::db::{job_repo, Database};

use super::error::PipelineError;

/// `floor(100 × index / total)`, clamped to 100. An empty stream counts as
/// finished.
pub fn percent(index: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (u128::from(index) * 100) / u128::from(total);
    pct.min(100) as u8
}

/// Running per-job metrics and the progress watermark.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total_frames: u64,
    frames_written: u64,
    step_percent: u8,
    last_reported: u8,
    score_sum: f64,
    score_count: u64,
    identities: HashSet<u64>,
}

impl ProgressAggregator {
    pub fn new(total_frames: u64, step_percent: u8) -> Self {
        Self {
            total_frames,
            frames_written: 0,
            step_percent: step_percent.max(1),
            // the claim persisted 0
            last_reported: 0,
            score_sum: 0.0,
            score_count: 0,
            identities: HashSet::new(),
        }
    }

    pub fn record_score(&mut self, score: f32) {
        self.score_sum += f64::from(score);
        self.score_count += 1;
    }

    pub fn record_identity(&mut self, id: u64) {
        self.identities.insert(id);
    }

    /// Counts one written frame. Returns the percentage to persist when it
    /// has advanced by at least one step since the last persisted value.
    pub fn frame_written(&mut self) -> Option<u8> {
        self.frames_written += 1;
        let pct = percent(self.frames_written, self.total_frames);
        if pct >= self.last_reported.saturating_add(self.step_percent) {
            self.last_reported = pct;
            Some(pct)
        } else {
            None
        }
    }

    pub fn processed_frames(&self) -> u64 {
        self.frames_written
    }

    pub fn detected_objects(&self) -> u64 {
        self.identities.len() as u64
    }

    /// Mean accepted score in [0, 1]; 0.0 when nothing was accepted.
    pub fn average_confidence(&self) -> f64 {
        if self.score_count == 0 {
            return 0.0;
        }
        (self.score_sum / self.score_count as f64).clamp(0.0, 1.0)
    }

    pub fn last_reported(&self) -> u8 {
        self.last_reported
    }
}

/// Events emitted by the pipeline during processing.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Progress { percentage: u8, processing_time: f64 },
    /// Thumbnail written; path is relative to the media root.
    Thumbnail { path: String },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent) -> Result<(), PipelineError>;
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _event: ProgressEvent) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Persists events to the job row.
pub struct StoreProgress {
    db: Database,
    job_id: i64,
}

impl StoreProgress {
    pub fn new(db: Database, job_id: i64) -> Self {
        Self { db, job_id }
    }
}

impl ProgressReporter for StoreProgress {
    fn report(&self, event: ProgressEvent) -> Result<(), PipelineError> {
        match event {
            ProgressEvent::Progress {
                percentage,
                processing_time,
            } => {
                let applied =
                    job_repo::update_progress(&self.db, self.job_id, percentage, processing_time)?;
                debug!(percentage, applied, "progress");
            }
            ProgressEvent::Thumbnail { path } => {
                job_repo::set_thumbnail(&self.db, self.job_id, &path)?;
            }
        }
        Ok(())
    }
}
