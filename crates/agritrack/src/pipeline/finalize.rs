//! Post-loop steps. Each one only ever adds a warning; none can fail the job.

use std::path::Path;

use tracing::{info, warn};

use crate::media::{save_thumbnail, Transcoder};
use crate::worker::job::ArtifactPaths;

use super::context::JobContext;
use super::error::PipelineWarning;
use super::progress::{ProgressEvent, ProgressReporter};

/// Writes the last annotated frame as the thumbnail and records its path.
pub(crate) fn step_thumbnail(ctx: &mut JobContext, media_root: &Path, progress: &dyn ProgressReporter) {
    let Some(frame) = ctx.last_frame.take() else {
        info!("No frame available for a thumbnail");
        return;
    };

    let stored = ArtifactPaths::to_stored(&ctx.paths.thumbnail);
    if let Err(e) = save_thumbnail(&frame, &media_root.join(&ctx.paths.thumbnail)) {
        warn!(error = %e, "Thumbnail could not be written");
        ctx.warnings.push(PipelineWarning::ThumbnailFailed {
            error: e.to_string(),
        });
        return;
    }

    match progress.report(ProgressEvent::Thumbnail {
        path: stored.clone(),
    }) {
        Ok(()) => ctx.thumbnail_path = Some(stored),
        Err(e) => {
            warn!(error = %e, "Thumbnail path could not be recorded");
            ctx.warnings.push(PipelineWarning::ThumbnailFailed {
                error: e.to_string(),
            });
        }
    }
}

/// Converts the raw output into the final playable file.
pub(crate) fn step_transcode(ctx: &mut JobContext, media_root: &Path, transcoder: Option<&dyn Transcoder>) {
    let Some(transcoder) = transcoder else {
        ctx.warnings.push(PipelineWarning::TranscodeSkipped {
            reason: "transcoding is disabled".to_string(),
        });
        return;
    };

    if ctx.aggregator.processed_frames() == 0 {
        ctx.warnings.push(PipelineWarning::TranscodeSkipped {
            reason: "no frames were written".to_string(),
        });
        return;
    }

    let input = media_root.join(&ctx.paths.raw_output);
    let output = media_root.join(&ctx.paths.final_output);
    match transcoder.transcode(&input, &output) {
        Ok(()) => {
            ctx.final_output_path = Some(ArtifactPaths::to_stored(&ctx.paths.final_output));
        }
        Err(e) => {
            warn!(error = %e, "Transcode failed; raw output kept");
            ctx.warnings.push(PipelineWarning::TranscodeFailed {
                error: e.to_string(),
            });
        }
    }
}
