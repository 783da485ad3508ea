use thiserror::Error;

/// Errors raised by a `Detector` while running inference on one frame.
#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Inference request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Inference server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed inference response: {0}")]
    Decode(String),

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),

    #[error("Inference failed: {0}")]
    Inference(String),
}

impl DetectionError {
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }
}
