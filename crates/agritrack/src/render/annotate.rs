use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::font::{draw_text, text_size};
use super::palette::ColorTable;
use crate::detection::{BoundingBox, TrackedObject};

/// Half-size of the box drawn around a coasting track's estimate.
pub const COASTING_HALF_SIZE: f32 = 20.0;
const BOX_THICKNESS: i32 = 2;
const LABEL_TEXT: Rgb<u8> = Rgb([255, 255, 255]);

pub fn label_text(label: &str, id: u64) -> String {
    format!("{} #{}", label, id)
}

/// The box drawn for a tracked object: its matched detection, or a fixed
/// square around the estimate while coasting.
pub fn display_box(object: &TrackedObject) -> BoundingBox {
    object
        .last_detection
        .unwrap_or_else(|| BoundingBox::around(object.estimate, COASTING_HALF_SIZE))
}

/// Draws a box and `"<label> #<id>"` for every tracked object.
pub fn annotate(
    mut frame: RgbImage,
    objects: &[TrackedObject],
    colors: &mut ColorTable,
    label: &str,
) -> RgbImage {
    for object in objects {
        let color = colors.color_for(object.id);
        let bbox = display_box(object);
        let Some((x, y, w, h)) = clip(&bbox, frame.width(), frame.height()) else {
            continue;
        };

        draw_box(&mut frame, x, y, w, h, color);

        let text = label_text(label, object.id);
        let (_, text_h) = text_size(&text);
        let text_y = if y >= text_h as i32 { y - text_h as i32 } else { y + h as i32 };
        draw_text(&mut frame, &text, x, text_y, LABEL_TEXT, Some(color));
    }
    frame
}

/// Clamps a box to the image. `None` when nothing of it is visible.
fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<(i32, i32, u32, u32)> {
    if !(bbox.x1.is_finite() && bbox.y1.is_finite() && bbox.x2.is_finite() && bbox.y2.is_finite()) {
        return None;
    }
    let x1 = bbox.x1.round().clamp(0.0, width as f32 - 1.0) as i32;
    let y1 = bbox.y1.round().clamp(0.0, height as f32 - 1.0) as i32;
    let x2 = bbox.x2.round().clamp(0.0, width as f32 - 1.0) as i32;
    let y2 = bbox.y2.round().clamp(0.0, height as f32 - 1.0) as i32;
    if width == 0 || height == 0 || x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, (x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}

fn draw_box(img: &mut RgbImage, x: i32, y: i32, w: u32, h: u32, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let inner_w = w as i32 - 2 * inset;
        let inner_h = h as i32 - 2 * inset;
        if inner_w <= 0 || inner_h <= 0 {
            break;
        }
        let rect = Rect::at(x + inset, y + inset).of_size(inner_w as u32, inner_h as u32);
        draw_hollow_rect_mut(img, rect, color);
    }
}
