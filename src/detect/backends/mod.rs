//! Background model implementations:
//! - Built-in mixture of Gaussians (always available)
//! - OpenCV MOG2 (feature: detect-opencv)
//! - Running average (always available)

pub mod mixture;
#[cfg(feature = "detect-opencv")]
pub mod opencv_mog2;
pub mod running_average;

pub use mixture::{MixtureBackground, MixtureParams};
#[cfg(feature = "detect-opencv")]
pub use opencv_mog2::OpenCvMog2;
pub use running_average::RunningAverageBackground;
