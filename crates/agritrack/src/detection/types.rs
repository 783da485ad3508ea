//! Value types shared by detectors, trackers and the renderer.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, `(x1, y1)` top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from `[x1, y1, x2, y2]`, reordering swapped corners.
    pub fn from_corners(corners: [f32; 4]) -> Self {
        let [a, b, c, d] = corners;
        Self {
            x1: a.min(c),
            y1: b.min(d),
            x2: a.max(c),
            y2: b.max(d),
        }
    }

    /// A square box of half-size `half` centred on `center`.
    pub fn around(center: Point, half: f32) -> Self {
        Self {
            x1: center.x - half,
            y1: center.y - half,
            x2: center.x + half,
            y2: center.y + half,
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.x1 + self.x2) / 2.0,
            y: (self.y1 + self.y2) / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f32 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One candidate object reported by a detector for a single frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub label: String,
}

/// An accepted detection as handed to the tracker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackInput {
    pub center: Point,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl From<&Detection> for TrackInput {
    fn from(det: &Detection) -> Self {
        Self {
            center: det.bbox.center(),
            score: det.score,
            bbox: det.bbox,
        }
    }
}

/// A confirmed track as reported by the tracker for the current frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedObject {
    /// Identity, stable for the lifetime of the track within one job.
    pub id: u64,
    /// Estimated center for this frame.
    pub estimate: Point,
    /// Box of the detection matched this frame. `None` while coasting.
    pub last_detection: Option<BoundingBox>,
}

/// Channel order a detector expects its input in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelFormat {
    #[default]
    Rgb,
    Bgr,
}
