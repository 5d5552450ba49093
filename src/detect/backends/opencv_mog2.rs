//! OpenCV's MOG2 background subtractor.
//!
//! Shadow detection is off, so masks only ever hold `FOREGROUND` and
//! `BACKGROUND`. Frames are handed over as packed 8-bit 3-channel matrices;
//! channel order does not matter to the model.

use anyhow::{anyhow, Context, Result};
use image::{GrayImage, RgbImage};
use opencv::core::{Mat, Ptr, Scalar, CV_8UC3};
use opencv::prelude::*;
use opencv::video::{create_background_subtractor_mog2, BackgroundSubtractorMOG2};

use super::mixture::MixtureParams;
use crate::detect::backend::BackgroundSubtractor;

pub struct OpenCvMog2 {
    params: MixtureParams,
    subtractor: Ptr<BackgroundSubtractorMOG2>,
    dimensions: (u32, u32),
    frames: u64,
}

impl OpenCvMog2 {
    pub fn new() -> Result<Self> {
        Self::with_params(MixtureParams::default())
    }

    pub fn with_params(params: MixtureParams) -> Result<Self> {
        let subtractor = build(&params)?;
        Ok(Self {
            params,
            subtractor,
            dimensions: (0, 0),
            frames: 0,
        })
    }
}

fn build(params: &MixtureParams) -> Result<Ptr<BackgroundSubtractorMOG2>> {
    let mut subtractor = create_background_subtractor_mog2(
        params.history as i32,
        params.var_threshold as f64,
        false,
    )
    .context("create MOG2 background subtractor")?;
    subtractor.set_n_mixtures(params.max_modes as i32)?;
    subtractor.set_background_ratio(params.background_ratio as f64)?;
    subtractor.set_var_threshold_gen(params.var_threshold_gen as f64)?;
    subtractor.set_var_init(params.var_init as f64)?;
    subtractor.set_var_min(params.var_min as f64)?;
    subtractor.set_var_max(params.var_max as f64)?;
    subtractor.set_complexity_reduction_threshold(params.complexity_reduction as f64)?;
    Ok(subtractor)
}

fn to_mat(frame: &RgbImage) -> Result<Mat> {
    let (width, height) = frame.dimensions();
    let mut mat =
        Mat::new_rows_cols_with_default(height as i32, width as i32, CV_8UC3, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(frame.as_raw());
    Ok(mat)
}

impl BackgroundSubtractor for OpenCvMog2 {
    fn name(&self) -> &'static str {
        "mog2"
    }

    fn apply(&mut self, frame: &RgbImage) -> Result<GrayImage> {
        let dimensions = frame.dimensions();
        if dimensions != self.dimensions {
            if self.frames > 0 {
                log::warn!(
                    "frame size changed from {}x{} to {}x{}; relearning background",
                    self.dimensions.0,
                    self.dimensions.1,
                    dimensions.0,
                    dimensions.1
                );
                self.subtractor = build(&self.params)?;
            }
            self.dimensions = dimensions;
            self.frames = 0;
        }

        let input = to_mat(frame)?;
        let mut fg_mask = Mat::default();
        self.subtractor
            .apply(&input, &mut fg_mask, -1.0)
            .context("MOG2 apply")?;
        self.frames += 1;

        let (width, height) = dimensions;
        GrayImage::from_raw(width, height, fg_mask.data_bytes()?.to_vec())
            .ok_or_else(|| anyhow!("MOG2 returned a {}x{} mask", fg_mask.cols(), fg_mask.rows()))
    }

    fn frames_seen(&self) -> u64 {
        self.frames
    }
}
