pub mod detector;
pub mod error;
pub mod remote;
pub mod tracker;
pub mod types;

pub use detector::{to_pixel_format, Detector};
pub use error::DetectionError;
pub use remote::{RemoteDetector, RemoteDetectorConfig};
pub use tracker::{CentroidTracker, Tracker, TrackerConfig};
pub use types::{BoundingBox, Detection, PixelFormat, Point, TrackInput, TrackedObject};
