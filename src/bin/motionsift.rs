//! motionsift - sample a video at a fixed interval and annotate motion.
//!
//! Configuration comes from an optional JSON/TOML file (`--config` or
//! `MOTIONSIFT_CONFIG`), then `MOTIONSIFT_*` environment variables, then the
//! flags below. Any fatal pipeline error exits non-zero.

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;

use motionsift::pipeline::{detect_frames, run_pipeline, sample_video};
use motionsift::ui::Ui;
use motionsift::PipelineConfig;

#[derive(Parser, Debug)]
#[command(name = "motionsift", version, about = "Batch frame sampling and motion detection")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Config file (JSON, or TOML with a .toml extension)
    #[arg(long, global = true, value_name = "PATH", env = "MOTIONSIFT_CONFIG")]
    config: Option<PathBuf>,

    /// Write a JSON report of the run to this path
    #[arg(long, global = true, value_name = "PATH")]
    report: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample the video, then detect motion in the sampled frames
    Run {
        video: Option<String>,
        #[command(flatten)]
        sampling: SamplingArgs,
        #[command(flatten)]
        detection: DetectionArgs,
    },
    /// Only sample frames from the video
    Sample {
        video: Option<String>,
        #[command(flatten)]
        sampling: SamplingArgs,
    },
    /// Only detect motion in a previously sampled frame directory
    Detect {
        /// Directory holding sampled frames
        #[arg(long, value_name = "DIR")]
        frames_dir: Option<PathBuf>,
        #[command(flatten)]
        detection: DetectionArgs,
    },
}

#[derive(Args, Debug, Default)]
struct SamplingArgs {
    /// Seconds between sampled frames
    #[arg(long, value_name = "SECS")]
    interval: Option<f64>,
    /// Directory for sampled frames
    #[arg(long, value_name = "DIR")]
    frames_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct DetectionArgs {
    /// Directory for annotated frames
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Minimum contour area in square pixels
    #[arg(long, value_name = "PX")]
    min_area: Option<f64>,
}

impl SamplingArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(interval) = self.interval {
            config.sampler.interval_secs = interval;
        }
        if let Some(dir) = &self.frames_dir {
            config.sampler.frames_dir = dir.clone();
        }
    }
}

impl DetectionArgs {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(dir) = &self.output_dir {
            config.detector.output_dir = dir.clone();
        }
        if let Some(area) = self.min_area {
            config.detector.min_contour_area = area;
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = Ui::from_args(Some(&cli.ui), is_tty, !stdout_is_tty);

    // Validated once, after the flags below are applied.
    let mut config = PipelineConfig::read_from(cli.config.as_deref())?;
    if cli.report.is_some() {
        config.report_path = cli.report.clone();
    }

    match &cli.command {
        Command::Run {
            video,
            sampling,
            detection,
        } => {
            if let Some(video) = video {
                config.video = video.clone();
            }
            sampling.apply(&mut config);
            detection.apply(&mut config);
            config.validate()?;
            let report = run_pipeline(&config, &ui)?;
            log::info!(
                "{} frame(s) sampled, {} with motion, {} skipped",
                report.sampling.indices.len(),
                report.detection.frames_with_motion(),
                report.detection.skipped.len()
            );
        }
        Command::Sample { video, sampling } => {
            if let Some(video) = video {
                config.video = video.clone();
            }
            sampling.apply(&mut config);
            config.validate()?;
            let report = sample_video(&config, &ui)?;
            log::info!("Frames saved to: {}", report.store_dir.display());
        }
        Command::Detect {
            frames_dir,
            detection,
        } => {
            if let Some(dir) = frames_dir {
                config.sampler.frames_dir = dir.clone();
            }
            detection.apply(&mut config);
            config.validate()?;
            detect_frames(&config, &ui)?;
        }
    }
    Ok(())
}
