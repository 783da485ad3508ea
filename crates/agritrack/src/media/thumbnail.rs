//! Thumbnail generation from an in-memory frame.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use super::ensure_parent;
use crate::error::MediaError;

pub const THUMBNAIL_WIDTH: u32 = 480;
const THUMBNAIL_QUALITY: u8 = 85;

/// Writes `frame` as a JPEG at `path`, scaled down to `THUMBNAIL_WIDTH`
/// (aspect ratio kept). Narrower frames are written as-is.
pub fn save_thumbnail(frame: &RgbImage, path: &Path) -> Result<(), MediaError> {
    ensure_parent(path)?;

    let scaled;
    let image = if frame.width() > THUMBNAIL_WIDTH {
        let height = ((frame.height() as u64 * THUMBNAIL_WIDTH as u64) / frame.width() as u64)
            .max(1) as u32;
        scaled = imageops::resize(frame, THUMBNAIL_WIDTH, height, FilterType::Triangle);
        &scaled
    } else {
        frame
    };

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, THUMBNAIL_QUALITY).encode_image(image)?;
    Ok(())
}
