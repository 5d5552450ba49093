//! Frame sampler.
//!
//! Selects frames roughly `interval_secs` apart from a video source and writes
//! them, in capture order, to a `FrameStore`.
//!
//! Stepping has two parts. A coarse stride of `round(fps * interval)` frames
//! bounds the work per sample, and a catch-up pass advances the source one
//! frame at a time (without converting pixels) until the source's own clock
//! reaches the running target `1/fps + k * interval`. The frame that completes
//! the target becomes the next sample, so the nominal/real clock mismatch never
//! accumulates. The catch-up pass is bounded; when the source clock stops
//! advancing the coarse stride is used instead.

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::config::SamplerSettings;
use crate::error::PipelineError;
use crate::frame::SampledFrame;
use crate::ingest::VideoSource;
use crate::storage::FrameStore;

/// Slack when comparing the source clock against the target, in seconds.
const CLOCK_EPSILON_SECS: f64 = 1e-9;

/// Progress signal emitted after each sample is written.
#[derive(Clone, Copy, Debug)]
pub struct SampleProgress {
    pub index: u64,
    pub frames_total: u64,
    pub written: u64,
}

impl SampleProgress {
    /// `index / frames_total`, or `None` when the source does not report a length.
    pub fn fraction(&self) -> Option<f64> {
        if self.frames_total == 0 {
            None
        } else {
            Some((self.index as f64 / self.frames_total as f64).min(1.0))
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Seek, read or single-frame advance ran past the last frame.
    EndOfSource,
    /// A frame could not be decoded. Earlier samples are kept.
    DecodeFailure { index: u64 },
}

#[derive(Clone, Debug, Serialize)]
pub struct SamplingReport {
    pub store_dir: PathBuf,
    pub indices: Vec<u64>,
    pub frames_total: u64,
    pub stride: u64,
    /// Samples where the catch-up bound was hit and the coarse stride was used.
    pub clock_stalls: u64,
    pub stop_reason: StopReason,
}

/// Stepping parameters derived from the source frame rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingPlan {
    pub fps: f64,
    pub interval_secs: f64,
    pub stride: u64,
    pub max_catch_up: u64,
}

impl SamplingPlan {
    /// Source time the k-th catch-up must reach (`k` counts samples taken so far).
    pub fn target_secs(&self, samples: u64) -> f64 {
        1.0 / self.fps + samples as f64 * self.interval_secs
    }
}

enum CatchUp {
    Reached,
    Exhausted,
    EndOfSource,
}

#[derive(Clone, Debug)]
pub struct FrameSampler {
    interval_secs: f64,
    max_catch_up_frames: Option<u64>,
}

impl FrameSampler {
    pub fn new(interval_secs: f64) -> Result<Self> {
        let settings = SamplerSettings {
            interval_secs,
            ..SamplerSettings::default()
        };
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &SamplerSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            interval_secs: settings.interval_secs,
            max_catch_up_frames: settings.max_catch_up_frames,
        })
    }

    pub fn interval_secs(&self) -> f64 {
        self.interval_secs
    }

    /// Derive the stride for a source. Rejects unusable frame rates before any I/O.
    pub fn plan(&self, fps: f64) -> Result<SamplingPlan> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(PipelineError::invalid(format!(
                "video source reports an unusable frame rate ({})",
                fps
            ))
            .into());
        }
        let stride = ((fps * self.interval_secs).round() as u64).max(1);
        let max_catch_up = self
            .max_catch_up_frames
            .unwrap_or_else(|| stride.saturating_mul(2).saturating_add(1));
        Ok(SamplingPlan {
            fps,
            interval_secs: self.interval_secs,
            stride,
            max_catch_up,
        })
    }

    /// Sample `source` into `store`, calling `on_progress` after every write.
    ///
    /// Storage failures abort with an error. A decode failure ends sampling
    /// early but keeps every frame already written.
    pub fn run<S, F>(
        &self,
        source: &mut S,
        store: &mut FrameStore,
        mut on_progress: F,
    ) -> Result<SamplingReport>
    where
        S: VideoSource + ?Sized,
        F: FnMut(&SampleProgress),
    {
        let plan = self.plan(source.frame_rate())?;
        let frames_total = source.frame_count();
        log::info!(
            "sampling every {:.3}s ({} frames at {:.3} fps, {} frames total)",
            plan.interval_secs,
            plan.stride,
            plan.fps,
            frames_total
        );

        let mut index = 0u64;
        let mut indices = Vec::new();
        let mut clock_stalls = 0u64;

        let stop_reason = loop {
            if let Err(e) = source.seek(index) {
                log::debug!("seek to frame {} failed: {:#}", index, e);
                break StopReason::EndOfSource;
            }
            let image = match source.read() {
                Ok(Some(image)) => image,
                Ok(None) => break StopReason::EndOfSource,
                Err(e) => {
                    log::warn!("sampling stopped at frame {}: {:#}", index, e);
                    break StopReason::DecodeFailure { index };
                }
            };

            let frame = SampledFrame::new(index, image);
            store.write(frame.index, &frame.image)?;
            indices.push(frame.index);
            on_progress(&SampleProgress {
                index: frame.index,
                frames_total,
                written: indices.len() as u64,
            });

            let target = plan.target_secs(indices.len() as u64);
            index = match catch_up(source, target, plan.max_catch_up) {
                CatchUp::Reached => source.position().saturating_sub(1).max(index + 1),
                CatchUp::Exhausted => {
                    clock_stalls += 1;
                    log::warn!(
                        "source clock stuck at {:.3}s (target {:.3}s); stepping {} frames from frame {}",
                        source.elapsed_secs(),
                        target,
                        plan.stride,
                        index
                    );
                    index + plan.stride
                }
                CatchUp::EndOfSource => break StopReason::EndOfSource,
            };
        };

        log::info!(
            "sampled {} frames into {}",
            indices.len(),
            store.dir().display()
        );

        Ok(SamplingReport {
            store_dir: store.dir().to_path_buf(),
            indices,
            frames_total,
            stride: plan.stride,
            clock_stalls,
            stop_reason,
        })
    }
}

/// Advance single frames until the source clock reaches `target` seconds.
fn catch_up<S>(source: &mut S, target: f64, max_frames: u64) -> CatchUp
where
    S: VideoSource + ?Sized,
{
    let mut advanced = 0u64;
    while source.elapsed_secs() + CLOCK_EPSILON_SECS < target {
        if advanced >= max_frames {
            return CatchUp::Exhausted;
        }
        match source.grab() {
            Ok(true) => advanced += 1,
            Ok(false) => return CatchUp::EndOfSource,
            Err(e) => {
                log::warn!(
                    "frame advance failed at frame {}: {:#}",
                    source.position(),
                    e
                );
                return CatchUp::EndOfSource;
            }
        }
    }
    CatchUp::Reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use crate::frame::ArtifactFormat;
    use crate::ingest::{SyntheticConfig, SyntheticVideo};

    fn synthetic(url: &str) -> SyntheticVideo {
        SyntheticVideo::new(SyntheticConfig::from_url(url).expect("stub url"))
    }

    fn sample(url: &str, interval: f64) -> Result<(SamplingReport, tempfile::TempDir)> {
        let tmp = tempfile::tempdir()?;
        let mut store = FrameStore::create(tmp.path().join("frames"), ArtifactFormat::Png)?;
        let mut video = synthetic(url);
        let report = FrameSampler::new(interval)?.run(&mut video, &mut store, |_| {})?;
        Ok((report, tmp))
    }

    #[test]
    fn ten_second_clip_at_one_second_yields_ten_frames() -> Result<()> {
        let (report, tmp) = sample("stub://clip?fps=10&frames=100&width=32&height=24", 1.0)?;
        assert_eq!(report.indices, (0..10).map(|k| k * 10).collect::<Vec<u64>>());
        assert_eq!(report.stride, 10);
        assert_eq!(report.stop_reason, StopReason::EndOfSource);
        assert_eq!(report.clock_stalls, 0);

        let stored = FrameStore::open(tmp.path().join("frames"))?.entries()?;
        assert_eq!(stored.len(), 10);
        assert_eq!(stored[9].index, 90);
        Ok(())
    }

    #[test]
    fn one_extra_frame_lets_the_tail_sample_land() -> Result<()> {
        let (report, _tmp) = sample("stub://clip?fps=10&frames=101&width=16&height=16", 1.0)?;
        assert_eq!(report.indices.last(), Some(&100));
        assert_eq!(report.indices.len(), 11);
        Ok(())
    }

    #[test]
    fn fractional_rate_does_not_accumulate_drift() -> Result<()> {
        let fps = 29.97;
        let (report, _tmp) = sample("stub://ntsc?fps=29.97&frames=3000&width=16&height=16", 1.0)?;
        assert!(report.indices.len() >= 99);
        for (k, index) in report.indices.iter().enumerate() {
            let drift = *index as f64 / fps - k as f64;
            assert!(
                drift > -1e-6 && drift < 1.0 / fps + 1e-6,
                "sample {k} at frame {index} drifted {drift:.4}s"
            );
        }
        for pair in report.indices.windows(2) {
            let gap = (pair[1] - pair[0]) as f64 / fps;
            assert!((gap - 1.0).abs() <= 1.0 / fps, "gap {gap:.4}s");
        }
        Ok(())
    }

    #[test]
    fn real_clock_faster_than_nominal_rate_is_followed() -> Result<()> {
        // Container claims 10 fps, timestamps actually advance at 12.5 fps.
        let (report, _tmp) = sample("stub://vfr?fps=10&clock=12.5&frames=200&width=16&height=16", 1.0)?;
        assert_eq!(report.stride, 10);
        assert_eq!(&report.indices[..4], &[0, 13, 26, 38]);
        Ok(())
    }

    #[test]
    fn indices_are_strictly_increasing_for_sub_frame_intervals() -> Result<()> {
        let (report, _tmp) = sample("stub://fast?fps=10&frames=30&width=8&height=8", 0.01)?;
        assert_eq!(report.stride, 1);
        assert_eq!(report.indices, (0..30).collect::<Vec<u64>>());
        Ok(())
    }

    #[test]
    fn resampling_is_idempotent() -> Result<()> {
        let url = "stub://again?fps=24&clock=23.5&frames=480&width=16&height=16";
        let (first, _a) = sample(url, 2.0)?;
        let (second, _b) = sample(url, 2.0)?;
        assert_eq!(first.indices, second.indices);
        Ok(())
    }

    #[test]
    fn stalled_clock_falls_back_to_coarse_stride() -> Result<()> {
        let (report, _tmp) = sample("stub://stuck?fps=10&frames=100&stall=25&width=16&height=16", 1.0)?;
        assert_eq!(report.indices, vec![0, 10, 20, 30, 40, 50, 60, 70, 80]);
        assert_eq!(report.clock_stalls, 6);
        assert_eq!(report.stop_reason, StopReason::EndOfSource);
        Ok(())
    }

    #[test]
    fn decode_failure_keeps_earlier_frames() -> Result<()> {
        let (report, tmp) = sample("stub://bad?fps=10&frames=100&corrupt=40&width=16&height=16", 1.0)?;
        assert_eq!(report.indices, vec![0, 10, 20, 30]);
        assert_eq!(report.stop_reason, StopReason::DecodeFailure { index: 40 });
        assert_eq!(FrameStore::open(tmp.path().join("frames"))?.entries()?.len(), 4);
        Ok(())
    }

    #[test]
    fn zero_fps_is_rejected_before_any_io() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut store = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        let mut video = synthetic("stub://broken?fps=0&frames=100");
        let err = FrameSampler::new(1.0)?
            .run(&mut video, &mut store, |_| {})
            .unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(PipelineError::InvalidConfiguration(_))
        ));
        assert_eq!(video.position(), 0);
        assert_eq!(store.written(), 0);
        Ok(())
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = FrameSampler::new(0.0).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn progress_reports_fraction_of_source() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut store = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        let mut video = synthetic("stub://p?fps=10&frames=50&width=8&height=8");
        let mut seen = Vec::new();
        FrameSampler::new(1.0)?.run(&mut video, &mut store, |p| seen.push(p.fraction()))?;
        assert_eq!(
            seen,
            vec![Some(0.0), Some(0.2), Some(0.4), Some(0.6), Some(0.8)]
        );
        Ok(())
    }
}
