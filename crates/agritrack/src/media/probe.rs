//! FFprobe video information.

use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;
use tracing::debug;

use super::VideoInfo;
use crate::error::MediaError;

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
    #[serde(default)]
    tags: Option<FfprobeTags>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeTags {
    rotate: Option<String>,
}

impl FfprobeStream {
    /// Display rotation in degrees, from the display matrix or the legacy
    /// `rotate` tag.
    fn rotation(&self) -> Option<f64> {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse().ok())
            })
            .filter(|r: &f64| *r != 0.0)
    }
}

/// Probe a video file for stream properties.
pub fn probe_video(ffprobe: &Path, path: &Path) -> Result<VideoInfo, MediaError> {
    if !path.is_file() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| MediaError::Spawn {
            program: ffprobe.display().to_string(),
            source: e,
        })?;

    if !output.status.success() {
        return Err(MediaError::ExitStatus {
            program: ffprobe.display().to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    parse_probe_output(&output.stdout, path)
}

/// Turns ffprobe JSON into `VideoInfo`.
///
/// The frame rate comes from `r_frame_rate` (falling back to
/// `avg_frame_rate`); the frame count from `nb_frames`, or from
/// `duration × fps` when the container does not record it.
pub(crate) fn parse_probe_output(json: &[u8], path: &Path) -> Result<VideoInfo, MediaError> {
    let probe: FfprobeOutput =
        serde_json::from_slice(json).map_err(|e| MediaError::Probe(e.to_string()))?;

    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref().unwrap_or("video") == "video")
        .ok_or_else(|| MediaError::NoVideoStream(path.to_path_buf()))?;

    let width = stream
        .width
        .ok_or_else(|| MediaError::InvalidMetadata("missing width".to_string()))?;
    let height = stream
        .height
        .ok_or_else(|| MediaError::InvalidMetadata("missing height".to_string()))?;

    // Frames are decoded without autorotation, so the stored size is the
    // size that arrives on the pipe.
    if let Some(rotation) = stream.rotation() {
        debug!(rotation, "stream carries a rotation tag, decoding unrotated");
    }

    let fps = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(0.0);

    let frame_count = match stream.nb_frames.as_deref().and_then(|n| n.parse::<u64>().ok()) {
        Some(n) => n,
        None => {
            let duration = stream
                .duration
                .as_deref()
                .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
                .and_then(|d| d.parse::<f64>().ok())
                .unwrap_or(0.0);
            if duration > 0.0 && fps > 0.0 {
                (duration * fps).round() as u64
            } else {
                0
            }
        }
    };

    Ok(VideoInfo {
        width,
        height,
        fps,
        frame_count,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). `0/0` yields `None`.
pub(crate) fn parse_frame_rate(s: &str) -> Option<f64> {
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den > 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.trim().parse().ok()
}
