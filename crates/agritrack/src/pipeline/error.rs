use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Frame I/O failed: {0}")]
    Media(#[from] crate::error::MediaError),

    #[error("Job store update failed: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("interrupted: worker shutting down")]
    Interrupted,
}

/// Non-fatal problems. The job still completes.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineWarning {
    /// Inference failed; the stream was treated as ended at `frame`.
    DetectorHalted { frame: u64, error: String },
    ThumbnailFailed { error: String },
    TranscodeFailed { error: String },
    TranscodeSkipped { reason: String },
}

impl fmt::Display for PipelineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineWarning::DetectorHalted { frame, error } => {
                write!(f, "detector failed at frame {}: {}", frame, error)
            }
            PipelineWarning::ThumbnailFailed { error } => write!(f, "thumbnail failed: {}", error),
            PipelineWarning::TranscodeFailed { error } => write!(f, "transcode failed: {}", error),
            PipelineWarning::TranscodeSkipped { reason } => {
                write!(f, "transcode skipped: {}", reason)
            }
        }
    }
}
