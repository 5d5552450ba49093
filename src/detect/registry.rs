use anyhow::Result;

use super::backend::BackgroundSubtractor;
use super::backends::{MixtureBackground, RunningAverageBackground};
use crate::error::PipelineError;

/// Background models selectable by name. The first entry is the default.
///
/// `mog2` is OpenCV's subtractor when built with `detect-opencv` and the
/// built-in `mixture` model otherwise.
pub const BACKGROUND_MODELS: &[&str] = &["mog2", "mixture", "running-average"];

pub const DEFAULT_BACKGROUND_MODEL: &str = "mog2";

/// Construct a fresh background model by name.
pub fn background_by_name(name: &str) -> Result<Box<dyn BackgroundSubtractor>> {
    match name {
        "mog2" => mog2(),
        "mixture" => Ok(Box::new(MixtureBackground::new())),
        "running-average" => Ok(Box::new(RunningAverageBackground::new())),
        other => Err(unknown(other).into()),
    }
}

#[cfg(feature = "detect-opencv")]
fn mog2() -> Result<Box<dyn BackgroundSubtractor>> {
    Ok(Box::new(super::backends::OpenCvMog2::new()?))
}

#[cfg(not(feature = "detect-opencv"))]
fn mog2() -> Result<Box<dyn BackgroundSubtractor>> {
    log::debug!("mog2: built without detect-opencv, using the built-in mixture model");
    Ok(Box::new(MixtureBackground::new()))
}

/// Validate a model name without allocating the model.
pub fn ensure_known_background(name: &str) -> Result<()> {
    if BACKGROUND_MODELS.contains(&name) {
        Ok(())
    } else {
        Err(unknown(name).into())
    }
}

fn unknown(name: &str) -> PipelineError {
    PipelineError::invalid(format!(
        "unknown background model '{}' (expected one of: {})",
        name,
        BACKGROUND_MODELS.join(", ")
    ))
}
