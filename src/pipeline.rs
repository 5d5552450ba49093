//! Batch pipeline: sample a video into a frame store, then detect motion in
//! the stored frames.
//!
//! The phases are strictly sequential. Detection only starts once sampling has
//! finished writing, and it reads the store back from disk, so either phase can
//! also be run on its own.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::detect::{detect_motion, DetectionReport};
use crate::error::PipelineError;
use crate::ingest::{VideoFile, VideoSource};
use crate::sampler::{FrameSampler, SamplingReport};
use crate::storage::FrameStore;
use crate::ui::Ui;

#[derive(Clone, Debug, Serialize)]
pub struct PipelineReport {
    pub video: String,
    pub sampling: SamplingReport,
    pub detection: DetectionReport,
}

/// Sample then detect. Writes the combined report when `report_path` is set.
pub fn run_pipeline(config: &PipelineConfig, ui: &Ui) -> Result<PipelineReport> {
    config.validate()?;
    let sampling = sample_phase(config, ui)?;
    let detection = detect_phase(config, ui)?;
    let report = PipelineReport {
        video: config.video.clone(),
        sampling,
        detection,
    };
    if let Some(path) = &config.report_path {
        write_report(path, &report)?;
    }
    Ok(report)
}

/// Sampling phase only.
pub fn sample_video(config: &PipelineConfig, ui: &Ui) -> Result<SamplingReport> {
    config.sampler.validate()?;
    let report = sample_phase(config, ui)?;
    if let Some(path) = &config.report_path {
        write_report(path, &report)?;
    }
    Ok(report)
}

/// Detection phase only, over a previously sampled frame store.
pub fn detect_frames(config: &PipelineConfig, ui: &Ui) -> Result<DetectionReport> {
    config.validate()?;
    let report = detect_phase(config, ui)?;
    if let Some(path) = &config.report_path {
        write_report(path, &report)?;
    }
    Ok(report)
}

fn sample_phase(config: &PipelineConfig, ui: &Ui) -> Result<SamplingReport> {
    let sampler = FrameSampler::from_settings(&config.sampler)?;

    let mut source = {
        let _stage = ui.stage("Open video");
        VideoFile::open(&config.video)?
    };
    // Reject unusable frame rates before the store directory is created.
    sampler.plan(source.frame_rate())?;
    let mut store = FrameStore::create(&config.sampler.frames_dir, config.sampler.image_format)?;

    let report = {
        let _stage = ui.stage("Sample frames");
        let mut progress = ui.progress("sampling");
        sampler.run(&mut source, &mut store, |p| match p.fraction() {
            Some(fraction) => progress.set_fraction(fraction),
            None => log::info!("sampled frame {} ({} written)", p.index, p.written),
        })?
    };

    log::info!(
        "sampled {} frame(s) from {} into {}",
        report.indices.len(),
        source.path(),
        report.store_dir.display()
    );
    Ok(report)
}

fn detect_phase(config: &PipelineConfig, ui: &Ui) -> Result<DetectionReport> {
    let input = FrameStore::open(&config.sampler.frames_dir)?;
    let mut output =
        FrameStore::create(&config.detector.output_dir, config.sampler.image_format)?;
    let total = input.entries()?.len() as u64;

    let _stage = ui.stage("Detect motion");
    let mut progress = ui.progress("detecting");
    let mut done = 0u64;
    let report = detect_motion(&input, &mut output, &config.detector, |_| {
        done += 1;
        progress.set_count(done, total);
    })?;

    log::info!(
        "{} of {} frame(s) contain motion",
        report.frames_with_motion(),
        report.processed()
    );
    Ok(report)
}

/// Serialize a report as pretty JSON, creating parent directories as needed.
pub fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::StorageUnavailable {
            path: parent.to_path_buf(),
            reason: e.to_string(),
        })?;
    }
    let json = serde_json::to_string_pretty(report).context("serialize report")?;
    fs::write(path, json).map_err(|e| PipelineError::StorageUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    log::info!("report written to {}", path.display());
    Ok(())
}
