use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Foreground value written into masks.
pub const FOREGROUND: u8 = 255;

/// Background value written into masks.
pub const BACKGROUND: u8 = 0;

/// Adaptive background model.
///
/// A model is stateful and order-sensitive: each `apply` both classifies the
/// frame against the current statistics and folds the frame into them. Feed
/// frames in capture order, one model per run.
pub trait BackgroundSubtractor {
    /// Model identifier, as used in configuration.
    fn name(&self) -> &'static str;

    /// Classify `frame` and update the model. Returns a binary mask with
    /// `FOREGROUND` for moving pixels and `BACKGROUND` elsewhere.
    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage>;

    /// Number of frames absorbed since creation or the last frame-size change.
    fn frames_seen(&self) -> u64;
}
