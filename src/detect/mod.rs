//! Motion detection: background subtraction, mask cleanup, region extraction
//! and annotation.

pub mod annotate;
mod backend;
pub mod backends;
pub mod contours;
mod detector;
pub mod morphology;
mod registry;
mod result;

pub use backend::{BackgroundSubtractor, BACKGROUND, FOREGROUND};
#[cfg(feature = "detect-opencv")]
pub use backends::OpenCvMog2;
pub use backends::{MixtureBackground, MixtureParams, RunningAverageBackground};
pub use detector::{detect_motion, filter_regions, DetectionReport, MotionDetector};
pub use registry::{
    background_by_name, ensure_known_background, BACKGROUND_MODELS, DEFAULT_BACKGROUND_MODEL,
};
pub use result::{BoundingBox, Detection, DetectionPhase, FrameDetections};
