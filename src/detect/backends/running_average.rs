use anyhow::Result;
use image::{GrayImage, Luma, RgbImage};

use crate::detect::backend::{BackgroundSubtractor, BACKGROUND, FOREGROUND};

/// Exponential running-average background with a fixed per-channel threshold.
///
/// Cheaper and less adaptive than the mixture model; useful for static
/// cameras with stable lighting. The first frame seeds the average and yields
/// an empty mask.
pub struct RunningAverageBackground {
    learning_rate: f32,
    threshold: f32,
    width: u32,
    height: u32,
    average: Vec<[f32; 3]>,
    frames: u64,
}

impl RunningAverageBackground {
    pub const DEFAULT_LEARNING_RATE: f32 = 0.05;
    pub const DEFAULT_THRESHOLD: f32 = 30.0;

    pub fn new() -> Self {
        Self::with_params(Self::DEFAULT_LEARNING_RATE, Self::DEFAULT_THRESHOLD)
    }

    pub fn with_params(learning_rate: f32, threshold: f32) -> Self {
        Self {
            learning_rate: learning_rate.clamp(0.0, 1.0),
            threshold: threshold.max(0.0),
            width: 0,
            height: 0,
            average: Vec::new(),
            frames: 0,
        }
    }
}

impl Default for RunningAverageBackground {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundSubtractor for RunningAverageBackground {
    fn name(&self) -> &'static str {
        "running-average"
    }

    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let (width, height) = frame.dimensions();
        if (width, height) != (self.width, self.height) {
            if self.frames > 0 {
                log::warn!(
                    "frame size changed from {}x{} to {}x{}; relearning background",
                    self.width,
                    self.height,
                    width,
                    height
                );
            }
            self.width = width;
            self.height = height;
            self.average.clear();
            self.frames = 0;
        }

        let mut mask = GrayImage::new(width, height);
        if self.average.is_empty() {
            self.average = frame
                .pixels()
                .map(|p| [p[0] as f32, p[1] as f32, p[2] as f32])
                .collect();
            self.frames = 1;
            return Ok(mask);
        }

        let rate = self.learning_rate;
        for ((rgb, avg), out) in frame
            .pixels()
            .zip(self.average.iter_mut())
            .zip(mask.pixels_mut())
        {
            let mut moving = false;
            for c in 0..3 {
                let value = rgb[c] as f32;
                if (value - avg[c]).abs() > self.threshold {
                    moving = true;
                }
                avg[c] += rate * (value - avg[c]);
            }
            *out = Luma([if moving { FOREGROUND } else { BACKGROUND }]);
        }
        self.frames += 1;
        Ok(mask)
    }

    fn frames_seen(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn seeds_on_first_frame_then_flags_changes() -> Result<()> {
        let mut model = RunningAverageBackground::new();
        let base = RgbImage::from_pixel(5, 5, Rgb([20, 20, 20]));
        let first = model.apply(&base)?;
        assert!(first.pixels().all(|p| p[0] == BACKGROUND));

        let mut moved = base.clone();
        moved.put_pixel(4, 0, Rgb([20, 200, 20]));
        moved.put_pixel(1, 1, Rgb([40, 40, 40]));
        let mask = model.apply(&moved)?;
        assert_eq!(mask.get_pixel(4, 0)[0], FOREGROUND);
        assert_eq!(mask.get_pixel(1, 1)[0], BACKGROUND);
        assert_eq!(model.frames_seen(), 2);
        Ok(())
    }

    #[test]
    fn size_change_reseeds_the_average() -> Result<()> {
        let mut model = RunningAverageBackground::new();
        model.apply(&RgbImage::from_pixel(2, 2, Rgb([0, 0, 0])))?;
        let mask = model.apply(&RgbImage::from_pixel(3, 2, Rgb([255, 255, 255])))?;
        assert!(mask.pixels().all(|p| p[0] == BACKGROUND));
        assert_eq!(model.frames_seen(), 1);
        Ok(())
    }
}
