use chrono::{DateTime, Utc};
use image::RgbImage;

use crate::db::job_repo::CompletionMetrics;
use crate::media::VideoInfo;
use crate::render::ColorTable;
use crate::worker::job::{format_timestamp, ArtifactPaths, Job};

use super::error::PipelineWarning;
use super::progress::ProgressAggregator;

/// Everything one job accumulates while it is PROCESSING. Dropped with the job.
pub struct JobContext {
    // Input
    pub job: Job,
    pub paths: ArtifactPaths,
    pub info: VideoInfo,

    // Frame loop state
    pub colors: ColorTable,
    pub aggregator: ProgressAggregator,
    pub last_frame: Option<RgbImage>,

    // Finalize results, relative to the media root
    pub thumbnail_path: Option<String>,
    pub final_output_path: Option<String>,

    // Non-fatal warnings
    pub warnings: Vec<PipelineWarning>,
}

impl JobContext {
    pub fn new(job: Job, info: VideoInfo, step_percent: u8) -> Self {
        let paths = job.artifacts();
        Self {
            job,
            paths,
            info,
            colors: ColorTable::default(),
            aggregator: ProgressAggregator::new(info.frame_count, step_percent),
            last_frame: None,
            thumbnail_path: None,
            final_output_path: None,
            warnings: Vec::new(),
        }
    }

    pub fn processing_time(&self, now: DateTime<Utc>) -> f64 {
        self.job.elapsed_seconds(now)
    }

    /// Terminal metrics for the COMPLETED transition.
    pub fn completion_metrics(&self, now: DateTime<Utc>) -> CompletionMetrics {
        CompletionMetrics {
            duration_seconds: self.info.duration_seconds(),
            resolution: self.info.resolution(),
            processing_time: self.processing_time(now),
            processed_frames: self.aggregator.processed_frames() as i64,
            detected_objects: self.aggregator.detected_objects() as i64,
            average_confidence: self.aggregator.average_confidence(),
            final_output_video_path: self.final_output_path.clone(),
            end_time: format_timestamp(now),
        }
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.to_string()).collect()
    }
}
