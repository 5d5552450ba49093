//! Adaptive per-pixel mixture-of-Gaussians background model.
//!
//! Each pixel keeps up to `max_modes` RGB Gaussians (shared variance per mode)
//! sorted by weight. A pixel is background when it falls within
//! `var_threshold` squared deviations of one of the heaviest modes whose
//! cumulative weight stays under `background_ratio`. Matching modes absorb the
//! pixel with learning rate `1 / min(2 * frames, history)`; weights of all
//! modes decay and modes whose weight falls below the complexity prior are
//! dropped. A pixel matching nothing spawns a new mode (replacing the weakest
//! one when the mixture is full).

use anyhow::Result;
use image::{GrayImage, Luma, RgbImage};

use crate::detect::backend::{BackgroundSubtractor, BACKGROUND, FOREGROUND};

#[derive(Clone, Debug, PartialEq)]
pub struct MixtureParams {
    pub history: u32,
    pub max_modes: usize,
    /// Squared Mahalanobis distance for the background test.
    pub var_threshold: f32,
    /// Squared Mahalanobis distance for a mode to absorb a pixel.
    pub var_threshold_gen: f32,
    pub background_ratio: f32,
    pub var_init: f32,
    pub var_min: f32,
    pub var_max: f32,
    pub complexity_reduction: f32,
}

impl Default for MixtureParams {
    fn default() -> Self {
        Self {
            history: 500,
            max_modes: 5,
            var_threshold: 16.0,
            var_threshold_gen: 9.0,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            complexity_reduction: 0.05,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Gaussian {
    weight: f32,
    mean: [f32; 3],
    variance: f32,
}

pub struct MixtureBackground {
    params: MixtureParams,
    width: u32,
    height: u32,
    modes: Vec<Gaussian>,
    mode_counts: Vec<u8>,
    frames: u64,
}

impl MixtureBackground {
    pub fn new() -> Self {
        Self::with_params(MixtureParams::default())
    }

    pub fn with_params(params: MixtureParams) -> Self {
        let max_modes = params.max_modes.clamp(1, u8::MAX as usize);
        Self {
            params: MixtureParams {
                max_modes,
                ..params
            },
            width: 0,
            height: 0,
            modes: Vec::new(),
            mode_counts: Vec::new(),
            frames: 0,
        }
    }

    fn allocate(&mut self, width: u32, height: u32) {
        let pixels = width as usize * height as usize;
        self.width = width;
        self.height = height;
        self.modes = vec![Gaussian::default(); pixels * self.params.max_modes];
        self.mode_counts = vec![0; pixels];
        self.frames = 0;
    }

    fn learning_rate(&self) -> f32 {
        let window = self
            .frames
            .saturating_mul(2)
            .min(self.params.history.max(1) as u64)
            .max(1);
        1.0 / window as f32
    }

    /// Update one pixel's mixture. Returns true when the pixel is foreground.
    fn update_pixel(&mut self, pixel: usize, value: [f32; 3], alpha: f32) -> bool {
        let p = &self.params;
        let max_modes = p.max_modes;
        let modes = &mut self.modes[pixel * max_modes..(pixel + 1) * max_modes];
        let count = self.mode_counts[pixel] as usize;

        let decay = 1.0 - alpha;
        let prune = -alpha * p.complexity_reduction;

        let mut background = false;
        let mut fitted = false;
        let mut total_weight = 0.0f32;
        let mut kept = 0usize;

        for mode in 0..count {
            let mut g = modes[mode];
            let mut weight = decay * g.weight + prune;

            if !fitted {
                let diff = [
                    g.mean[0] - value[0],
                    g.mean[1] - value[1],
                    g.mean[2] - value[2],
                ];
                let dist2 = diff[0] * diff[0] + diff[1] * diff[1] + diff[2] * diff[2];

                if total_weight < p.background_ratio && dist2 < p.var_threshold * g.variance {
                    background = true;
                }

                if dist2 < p.var_threshold_gen * g.variance {
                    fitted = true;
                    weight += alpha;
                    let k = alpha / weight;
                    for c in 0..3 {
                        g.mean[c] -= k * diff[c];
                    }
                    g.variance = (g.variance + k * (dist2 - g.variance)).clamp(p.var_min, p.var_max);
                }
            }

            if weight < -prune {
                continue;
            }
            g.weight = weight;
            total_weight += weight;
            modes[kept] = g;
            kept += 1;
        }

        if total_weight > 0.0 {
            for g in &mut modes[..kept] {
                g.weight /= total_weight;
            }
        }

        if !fitted {
            let slot = if kept == max_modes { max_modes - 1 } else { kept };
            if slot == kept {
                kept += 1;
            }
            let weight = if kept == 1 {
                1.0
            } else {
                for g in &mut modes[..kept - 1] {
                    g.weight *= decay;
                }
                alpha
            };
            modes[slot] = Gaussian {
                weight,
                mean: value,
                variance: p.var_init,
            };
        }

        sort_by_weight(&mut modes[..kept]);
        self.mode_counts[pixel] = kept as u8;

        !background
    }
}

impl Default for MixtureBackground {
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion sort, heaviest first. Mixtures hold a handful of modes.
fn sort_by_weight(modes: &mut [Gaussian]) {
    for i in 1..modes.len() {
        let mut j = i;
        while j > 0 && modes[j].weight > modes[j - 1].weight {
            modes.swap(j, j - 1);
            j -= 1;
        }
    }
}

impl BackgroundSubtractor for MixtureBackground {
    fn name(&self) -> &'static str {
        "mixture"
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
            self.allocate(width, height);
        }

        self.frames += 1;
        let alpha = self.learning_rate();

        let mut mask = GrayImage::new(width, height);
        for (pixel, (rgb, out)) in frame.pixels().zip(mask.pixels_mut()).enumerate() {
            let value = [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32];
            let foreground = self.update_pixel(pixel, value, alpha);
            *out = Luma([if foreground { FOREGROUND } else { BACKGROUND }]);
        }
        Ok(mask)
    }

    fn frames_seen(&self) -> u64 {
        self.frames
    }
}
