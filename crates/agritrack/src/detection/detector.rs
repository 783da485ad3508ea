//! Detector seam. The pipeline only sees this trait, so the model behind it
//! can be a remote server or a scripted double in tests.

use std::borrow::Cow;

use image::RgbImage;

use super::error::DetectionError;
use super::types::{Detection, PixelFormat};

/// Common interface for object detectors.
pub trait Detector: Send {
    /// Detect objects in a single frame. The frame is already in
    /// `input_format()` channel order.
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError>;

    /// Detector name (for logging).
    fn name(&self) -> &str;

    fn input_format(&self) -> PixelFormat {
        PixelFormat::Rgb
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn infer(&mut self, frame: &RgbImage) -> Result<Vec<Detection>, DetectionError> {
        (**self).infer(frame)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn input_format(&self) -> PixelFormat {
        (**self).input_format()
    }
}

/// Converts an RGB frame into the given channel order.
/// Borrows the frame unchanged when no conversion is needed.
pub fn to_pixel_format(frame: &RgbImage, format: PixelFormat) -> Cow<'_, RgbImage> {
    match format {
        PixelFormat::Rgb => Cow::Borrowed(frame),
        PixelFormat::Bgr => {
            let mut swapped = frame.clone();
            for pixel in swapped.pixels_mut() {
                pixel.0.swap(0, 2);
            }
            Cow::Owned(swapped)
        }
    }
}
