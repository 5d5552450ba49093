use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::DEFAULT_BACKGROUND_MODEL;
use crate::error::PipelineError;
use crate::frame::ArtifactFormat;

const DEFAULT_INTERVAL_SECS: f64 = 1.0;
const DEFAULT_FRAMES_DIR: &str = "frames";
const DEFAULT_OUTPUT_DIR: &str = "motion_detected_frames";
const DEFAULT_MIN_CONTOUR_AREA: f64 = 100.0;
const DEFAULT_STRUCTURING_ELEMENT: [u32; 2] = [5, 5];
const DEFAULT_BOX_COLOR: [u8; 3] = [0, 255, 0];
const DEFAULT_BOX_THICKNESS: u32 = 2;
const DEFAULT_WARM_UP_FRAMES: u32 = 0;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    video: Option<String>,
    report_path: Option<PathBuf>,
    sampler: Option<SamplerConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SamplerConfigFile {
    sample_interval_seconds: Option<f64>,
    frames_dir: Option<PathBuf>,
    image_format: Option<ArtifactFormat>,
    max_catch_up_frames: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    output_dir: Option<PathBuf>,
    background_model: Option<String>,
    min_contour_area: Option<f64>,
    structuring_element: Option<[u32; 2]>,
    box_color: Option<[u8; 3]>,
    box_thickness: Option<u32>,
    warm_up_frames: Option<u32>,
    on_unreadable_frame: Option<UnreadableFramePolicy>,
}

/// What the detector does with a frame artifact it cannot decode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnreadableFramePolicy {
    /// Log the index, count it, and continue with the next frame.
    #[default]
    Skip,
    /// Stop the detection phase with the decode error.
    Abort,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub video: String,
    pub report_path: Option<PathBuf>,
    pub sampler: SamplerSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct SamplerSettings {
    pub interval_secs: f64,
    pub frames_dir: PathBuf,
    pub image_format: ArtifactFormat,
    /// Upper bound on single-frame advances per sample. Defaults to twice the stride plus one.
    pub max_catch_up_frames: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub output_dir: PathBuf,
    pub background_model: String,
    pub min_contour_area: f64,
    /// Elliptical structuring element, `[width, height]`, both odd.
    pub structuring_element: [u32; 2],
    pub box_color: [u8; 3],
    pub box_thickness: u32,
    /// Frames whose detections are suppressed while the background model converges.
    pub warm_up_frames: u32,
    pub on_unreadable_frame: UnreadableFramePolicy,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            frames_dir: PathBuf::from(DEFAULT_FRAMES_DIR),
            image_format: ArtifactFormat::default(),
            max_catch_up_frames: None,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            background_model: DEFAULT_BACKGROUND_MODEL.to_string(),
            min_contour_area: DEFAULT_MIN_CONTOUR_AREA,
            structuring_element: DEFAULT_STRUCTURING_ELEMENT,
            box_color: DEFAULT_BOX_COLOR,
            box_thickness: DEFAULT_BOX_THICKNESS,
            warm_up_frames: DEFAULT_WARM_UP_FRAMES,
            on_unreadable_frame: UnreadableFramePolicy::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            video: String::new(),
            report_path: None,
            sampler: SamplerSettings::default(),
            detector: DetectorSettings::default(),
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.interval_secs.is_finite() || self.interval_secs <= 0.0 {
            return Err(PipelineError::invalid(format!(
                "sample_interval_seconds must be a positive number (got {})",
                self.interval_secs
            ))
            .into());
        }
        if self.max_catch_up_frames == Some(0) {
            return Err(PipelineError::invalid("max_catch_up_frames must be at least 1").into());
        }
        Ok(())
    }
}

impl DetectorSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.min_contour_area.is_finite() || self.min_contour_area < 0.0 {
            return Err(PipelineError::invalid(format!(
                "min_contour_area must be zero or positive (got {})",
                self.min_contour_area
            ))
            .into());
        }
        let [width, height] = self.structuring_element;
        if width == 0 || height == 0 || width % 2 == 0 || height % 2 == 0 {
            return Err(PipelineError::invalid(format!(
                "structuring_element must have odd, non-zero sides (got {}x{})",
                width, height
            ))
            .into());
        }
        if self.box_thickness == 0 {
            return Err(PipelineError::invalid("box_thickness must be at least 1").into());
        }
        crate::detect::ensure_known_background(&self.background_model)?;
        Ok(())
    }
}

impl PipelineConfig {
    /// Load from the file named by `MOTIONSIFT_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("MOTIONSIFT_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply env overrides and validate.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let cfg = Self::read_from(path)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Like `load_from`, but leaves validation to the caller so later layers
    /// (command-line flags) can still replace out-of-range values.
    pub fn read_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let sampler_file = file.sampler.unwrap_or_default();
        let detector_file = file.detector.unwrap_or_default();
        let defaults = DetectorSettings::default();

        let sampler = SamplerSettings {
            interval_secs: sampler_file
                .sample_interval_seconds
                .unwrap_or(DEFAULT_INTERVAL_SECS),
            frames_dir: sampler_file
                .frames_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FRAMES_DIR)),
            image_format: sampler_file.image_format.unwrap_or_default(),
            max_catch_up_frames: sampler_file.max_catch_up_frames,
        };
        let detector = DetectorSettings {
            output_dir: detector_file.output_dir.unwrap_or(defaults.output_dir),
            background_model: detector_file
                .background_model
                .unwrap_or(defaults.background_model),
            min_contour_area: detector_file
                .min_contour_area
                .unwrap_or(defaults.min_contour_area),
            structuring_element: detector_file
                .structuring_element
                .unwrap_or(defaults.structuring_element),
            box_color: detector_file.box_color.unwrap_or(defaults.box_color),
            box_thickness: detector_file.box_thickness.unwrap_or(defaults.box_thickness),
            warm_up_frames: detector_file
                .warm_up_frames
                .unwrap_or(defaults.warm_up_frames),
            on_unreadable_frame: detector_file
                .on_unreadable_frame
                .unwrap_or(defaults.on_unreadable_frame),
        };

        Self {
            video: file.video.unwrap_or_default(),
            report_path: file.report_path,
            sampler,
            detector,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(video) = std::env::var("MOTIONSIFT_VIDEO") {
            if !video.trim().is_empty() {
                self.video = video;
            }
        }
        if let Ok(dir) = std::env::var("MOTIONSIFT_FRAMES_DIR") {
            if !dir.trim().is_empty() {
                self.sampler.frames_dir = PathBuf::from(dir);
            }
        }
        if let Ok(dir) = std::env::var("MOTIONSIFT_OUTPUT_DIR") {
            if !dir.trim().is_empty() {
                self.detector.output_dir = PathBuf::from(dir);
            }
        }
        if let Ok(interval) = std::env::var("MOTIONSIFT_INTERVAL_SECS") {
            self.sampler.interval_secs = interval.trim().parse().map_err(|_| {
                PipelineError::invalid("MOTIONSIFT_INTERVAL_SECS must be a number of seconds")
            })?;
        }
        if let Ok(area) = std::env::var("MOTIONSIFT_MIN_AREA") {
            self.detector.min_contour_area = area.trim().parse().map_err(|_| {
                PipelineError::invalid("MOTIONSIFT_MIN_AREA must be a number of square pixels")
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.sampler.validate()?;
        self.detector.validate()?;
        // Opening the output store clears its artifacts.
        if self.sampler.frames_dir == self.detector.output_dir {
            return Err(PipelineError::invalid(format!(
                "frames_dir and output_dir must differ (both are {})",
                self.sampler.frames_dir.display()
            ))
            .into());
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| {
            PipelineError::invalid(format!("invalid config file {}: {}", path.display(), e))
        })?
    } else {
        serde_json::from_str(&raw).map_err(|e| {
            PipelineError::invalid(format!("invalid config file {}: {}", path.display(), e))
        })?
    };
    Ok(cfg)
}
