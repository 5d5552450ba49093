use serde::Serialize;

/// Axis-aligned box in pixel coordinates. `x`/`y` is the top-left corner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// One moving region that passed the area filter.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Enclosed contour area in square pixels.
    pub area: f64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionPhase {
    /// The background model has not seen enough frames to be trusted.
    WarmUp,
    #[default]
    Steady,
}

/// Result of running detection on one sampled frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FrameDetections {
    pub index: u64,
    pub phase: DetectionPhase,
    pub detections: Vec<Detection>,
    /// Foreground pixels left after the opening step.
    pub foreground_pixels: u64,
    /// Regions found but not drawn because the model was warming up.
    pub suppressed: usize,
}

impl FrameDetections {
    pub fn motion_detected(&self) -> bool {
        !self.detections.is_empty()
    }
}
