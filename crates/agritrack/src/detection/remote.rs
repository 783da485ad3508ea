//! HTTP detector that forwards frames to an external inference server.
//!
//! Request: `POST <endpoint>` with `{"image": <base64 JPEG>, "width", "height"}`.
//! Response: `{"detections": [{"box": [x1, y1, x2, y2], "score", "label"}]}`.

use std::io::Cursor;
use std::time::Duration;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::detector::Detector;
use super::error::DetectionError;
use super::types::{BoundingBox, Detection};

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone)]
pub struct RemoteDetectorConfig {
    pub endpoint: String,
    pub timeout: Duration,
    /// Used when the server omits a label.
    pub default_label: String,
}

impl Default for RemoteDetectorConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/infer".to_string(),
            timeout: Duration::from_secs(30),
            default_label: "Sheep".to_string(),
        }
    }
}

#[derive(Serialize)]
struct InferRequest<'a> {
    image: &'a str,
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct InferResponse {
    #[serde(default)]
    detections: Vec<RawDetection>,
}

#[derive(Deserialize)]
struct RawDetection {
    #[serde(rename = "box")]
    bbox: [f32; 4],
    score: f32,
    #[serde(default)]
    label: Option<String>,
}

pub struct RemoteDetector {
    http: Client,
    config: RemoteDetectorConfig,
}

impl RemoteDetector {
    pub fn new(config: RemoteDetectorConfig) -> Result<Self, DetectionError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn encode_frame(frame: &RgbImage) -> Result<String, DetectionError> {
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(frame)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(buf.into_inner()))
    }

    fn parse_response(&self, body: &str) -> Result<Vec<Detection>, DetectionError> {
        let response: InferResponse =
            serde_json::from_str(body).map_err(|e| DetectionError::decode(e.to_string()))?;

        response
            .detections
            .into_iter()
            .map(|raw| {
                if !raw.score.is_finite() || raw.bbox.iter().any(|v| !v.is_finite()) {
                    return Err(DetectionError::decode("non-finite box or score"));
                }
                Ok(Detection {
                    bbox: BoundingBox::from_corners(raw.bbox),
                    score: raw.score,
                    label: raw
                        .label
                        .filter(|l| !l.is_empty())
                        .unwrap_or_else(|| self.config.default_label.clone()),
                })
            })
            .collect()
    }
}

impl Detector for RemoteDetector {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        let image = Self::encode_frame(frame)?;
        let request = InferRequest {
            image: &image,
            width: frame.width(),
            height: frame.height(),
        };

        let response = self.http.post(&self.config.endpoint).json(&request).send()?;

        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(DetectionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let detections = self.parse_response(&body)?;
        debug!(count = detections.len(), "remote inference returned");
        Ok(detections)
    }

    fn name(&self) -> &str {
        "remote"
    }
}
