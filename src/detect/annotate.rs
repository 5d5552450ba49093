use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::result::BoundingBox;

/// Draw a rectangle outline onto `image`.
///
/// The outer edge runs through `(x, y)` and `(x + width, y + height)`;
/// thicker outlines grow inward. Anything past the image edge is clipped.
pub fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: [u8; 3], thickness: u32) {
    let color = Rgb(color);
    let (x, y) = (bbox.x as i32, bbox.y as i32);
    let (outer_w, outer_h) = (bbox.width + 1, bbox.height + 1);

    for inset in 0..thickness.max(1) {
        let (Some(w), Some(h)) = (
            outer_w.checked_sub(2 * inset).filter(|w| *w > 0),
            outer_h.checked_sub(2 * inset).filter(|h| *h > 0),
        ) else {
            break;
        };
        let rect = Rect::at(x + inset as i32, y + inset as i32).of_size(w, h);
        draw_hollow_rect_mut(image, rect, color);
    }
}
