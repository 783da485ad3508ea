//! Frame annotation: per-track boxes and identity labels.

pub mod annotate;
pub mod font;
pub mod palette;

pub use annotate::{annotate, display_box, label_text};
pub use palette::ColorTable;
