use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, info_span, warn};

use crate::config::Config;
use crate::detection::{
    to_pixel_format, CentroidTracker, DetectionError, Detector, RemoteDetector, TrackInput,
    TrackedObject, Tracker,
};
use crate::error::MediaError;
use crate::media::{FfmpegBackend, FfmpegTranscoder, FrameSource, MediaBackend, Transcoder};
use crate::render;

use super::config::PipelineConfig;
use super::context::JobContext;
use super::error::{PipelineError, PipelineWarning};
use super::finalize;
use super::progress::{ProgressEvent, ProgressReporter};

pub struct Pipeline {
    config: Arc<PipelineConfig>,
    detector: Box<dyn Detector>,
    tracker: Box<dyn Tracker>,
    media: Arc<dyn MediaBackend>,
    transcoder: Option<Arc<dyn Transcoder>>,
}

impl Pipeline {
    /// Production constructor: remote detector, centroid tracker, ffmpeg I/O.
    pub fn from_config(config: &Config) -> Result<Self, DetectionError> {
        let detector = RemoteDetector::new(config.detection.remote())?;
        let tracker = CentroidTracker::new(config.tracking.clone());
        let media = FfmpegBackend::new(&config.transcode.ffmpeg_path, &config.transcode.ffprobe_path);
        let transcoder: Option<Arc<dyn Transcoder>> = if config.transcode.enabled {
            Some(Arc::new(FfmpegTranscoder::new(
                &config.transcode.ffmpeg_path,
                config.transcode.settings(),
            )))
        } else {
            None
        };

        Ok(Self::new(
            Arc::new(PipelineConfig::from_config(config)),
            Box::new(detector),
            Box::new(tracker),
            Arc::new(media),
            transcoder,
        ))
    }

    /// Inject specific components.
    pub fn new(
        config: Arc<PipelineConfig>,
        detector: Box<dyn Detector>,
        tracker: Box<dyn Tracker>,
        media: Arc<dyn MediaBackend>,
        transcoder: Option<Arc<dyn Transcoder>>,
    ) -> Self {
        Self {
            config,
            detector,
            tracker,
            media,
            transcoder,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>, MediaError> {
        self.media.open_source(path)
    }

    /// Runs the frame loop, then the finalize steps. Errors here fail the job;
    /// anything recorded in `ctx.warnings` does not.
    pub fn run(
        &mut self,
        ctx: &mut JobContext,
        source: &mut dyn FrameSource,
        progress: &dyn ProgressReporter,
        shutdown: &AtomicBool,
    ) -> Result<(), PipelineError> {
        {
            let _step = info_span!("frames").entered();
            self.step_frames(ctx, source, progress, shutdown)?;
        }

        {
            let _step = info_span!("thumbnail").entered();
            finalize::step_thumbnail(ctx, &self.config.media_root, progress);
        }

        {
            let _step = info_span!("transcode").entered();
            finalize::step_transcode(ctx, &self.config.media_root, self.transcoder.as_deref());
        }

        Ok(())
    }

    fn step_frames(
        &mut self,
        ctx: &mut JobContext,
        source: &mut dyn FrameSource,
        progress: &dyn ProgressReporter,
        shutdown: &AtomicBool,
    ) -> Result<(), PipelineError> {
        // Identities are per job.
        self.tracker.reset();

        let raw_output = self.config.media_root.join(&ctx.paths.raw_output);
        let mut sink = self.media.open_sink(&raw_output, &ctx.info)?;
        let format = self.detector.input_format();
        let threshold = self.config.acceptance_threshold;

        info!(
            total_frames = ctx.info.frame_count,
            fps = ctx.info.fps,
            resolution = %ctx.info.resolution(),
            detector = self.detector.name(),
            "Processing frames"
        );

        let mut index: u64 = 0;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Err(PipelineError::Interrupted);
            }

            let Some(frame) = source.next_frame()? else {
                debug!(frames = index, "End of stream");
                break;
            };

            let detections = match self.detector.infer(&to_pixel_format(&frame, format)) {
                Ok(detections) => detections,
                Err(e) => {
                    warn!(frame = index, error = %e, "Detector failed; ending stream");
                    ctx.warnings.push(PipelineWarning::DetectorHalted {
                        frame: index,
                        error: e.to_string(),
                    });
                    break;
                }
            };

            let mut inputs = Vec::with_capacity(detections.len());
            for detection in detections.iter().filter(|d| d.score > threshold) {
                ctx.aggregator.record_score(detection.score);
                inputs.push(TrackInput::from(detection));
            }

            let tracked: Vec<TrackedObject> = self.tracker.update(&inputs);
            for object in &tracked {
                ctx.aggregator.record_identity(object.id);
            }

            let annotated = render::annotate(frame, &tracked, &mut ctx.colors, &self.config.label);
            sink.write_frame(&annotated)?;
            index += 1;

            if let Some(percentage) = ctx.aggregator.frame_written() {
                progress.report(ProgressEvent::Progress {
                    percentage,
                    processing_time: ctx.processing_time(Utc::now()),
                })?;
            }

            ctx.last_frame = Some(annotated);
        }

        sink.finish()?;

        info!(
            processed_frames = ctx.aggregator.processed_frames(),
            detected_objects = ctx.aggregator.detected_objects(),
            "Frames done"
        );
        Ok(())
    }
}
