//! Binary morphology on foreground masks, on top of `imageproc`'s grayscale
//! operators. Kernels are elliptical and anchored at their centre.

use anyhow::Result;
use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_dilate, grayscale_erode, grayscale_open, Mask};

use crate::error::PipelineError;

/// Largest kernel side `imageproc` accepts.
const MAX_SIDE: u32 = 511;

pub struct StructuringElement {
    shape: GrayImage,
    mask: Mask,
}

impl StructuringElement {
    /// Elliptical kernel inscribed in a `width` x `height` box.
    ///
    /// Rows are filled symmetrically about the centre column, so a 5x5 kernel
    /// keeps the three middle rows whole and only the centre of the top and
    /// bottom rows.
    pub fn ellipse(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 || width % 2 == 0 || height % 2 == 0 {
            return Err(PipelineError::invalid(format!(
                "structuring element must have odd, non-zero sides (got {}x{})",
                width, height
            ))
            .into());
        }
        if width > MAX_SIDE || height > MAX_SIDE {
            return Err(PipelineError::invalid(format!(
                "structuring element sides must not exceed {} (got {}x{})",
                MAX_SIDE, width, height
            ))
            .into());
        }

        let r = (height / 2) as i32;
        let c = (width / 2) as i32;
        let inv_r2 = if r > 0 { 1.0 / (r * r) as f64 } else { 0.0 };

        let mut shape = GrayImage::new(width, height);
        for dy in -r..=r {
            let dx = if r > 0 {
                let rows = (r * r - dy * dy) as f64;
                (c as f64 * (rows * inv_r2).sqrt()).round() as i32
            } else {
                c
            };
            let x0 = (c - dx).max(0);
            let x1 = (c + dx + 1).min(width as i32);
            for x in x0..x1 {
                shape.put_pixel(x as u32, (dy + r) as u32, Luma([255]));
            }
        }

        let mask = Mask::from_image(&shape, c as u8, r as u8);
        Ok(Self { shape, mask })
    }
}

pub fn erode(mask: &GrayImage, kernel: &StructuringElement) -> GrayImage {
    grayscale_erode(mask, &kernel.mask)
}

pub fn dilate(mask: &GrayImage, kernel: &StructuringElement) -> GrayImage {
    grayscale_dilate(mask, &kernel.mask)
}

/// Erosion followed by dilation. Removes specks smaller than the kernel.
pub fn open(mask: &GrayImage, kernel: &StructuringElement) -> GrayImage {
    grayscale_open(mask, &kernel.mask)
}
