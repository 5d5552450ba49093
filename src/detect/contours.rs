//! Outer contours of foreground regions.
//!
//! Borders come from `imageproc`'s Suzuki-Abe tracer. Only outer borders with
//! no parent are kept, so holes and anything nested inside a hole are ignored.
//! Each contour is the closed chain of boundary pixel centres.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};

use super::result::BoundingBox;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Contour {
    points: Vec<(u32, u32)>,
}

impl Contour {
    /// Polygon area enclosed by the chain through pixel centres.
    ///
    /// A filled `w` x `h` rectangle yields `(w - 1) * (h - 1)`; lines and
    /// single pixels enclose nothing.
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        let mut twice = 0i64;
        let mut prev = self.points[self.points.len() - 1];
        for &point in &self.points {
            twice += prev.0 as i64 * point.1 as i64 - point.0 as i64 * prev.1 as i64;
            prev = point;
        }
        twice.abs() as f64 / 2.0
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let Some(&(first_x, first_y)) = self.points.first() else {
            return BoundingBox {
                x: 0,
                y: 0,
                width: 0,
                height: 0,
            };
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first_x, first_y, first_x, first_y);
        for &(x, y) in &self.points {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        BoundingBox {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }
}

/// Outer border of every top-level region, in raster order of each region's
/// first pixel.
pub fn find_external_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| Contour {
            points: c.points.into_iter().map(|p| (p.x, p.y)).collect(),
        })
        .collect()
}
