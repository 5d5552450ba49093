//! Frame-by-frame motion detection over a sampled frame store.
//!
//! Each frame goes through the same steps: the background model classifies
//! pixels into a foreground mask, an elliptical opening removes specks, outer
//! contours of the remaining regions are traced and those enclosing at least
//! `min_contour_area` become detections. The model is stateful, so frames must
//! arrive in strictly increasing index order.

use anyhow::{Context, Result};
use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::path::PathBuf;

use super::annotate::draw_box;
use super::backend::{BackgroundSubtractor, BACKGROUND};
use super::contours::find_external_contours;
use super::morphology::{self, StructuringElement};
use super::registry::background_by_name;
use super::result::{Detection, DetectionPhase, FrameDetections};
use crate::config::{DetectorSettings, UnreadableFramePolicy};
use crate::error::{classify, PipelineError};
use crate::storage::FrameStore;

pub struct MotionDetector {
    background: Box<dyn BackgroundSubtractor>,
    kernel: StructuringElement,
    min_area: f64,
    box_color: [u8; 3],
    box_thickness: u32,
    warm_up_frames: u32,
    last_index: Option<u64>,
}

impl MotionDetector {
    pub fn new(settings: &DetectorSettings) -> Result<Self> {
        settings.validate()?;
        let background = background_by_name(&settings.background_model)?;
        Self::with_background(settings, background)
    }

    /// Use a caller-supplied background model instead of the configured one.
    pub fn with_background(
        settings: &DetectorSettings,
        background: Box<dyn BackgroundSubtractor>,
    ) -> Result<Self> {
        let [width, height] = settings.structuring_element;
        let kernel = StructuringElement::ellipse(width, height)?;
        log::debug!(
            "motion detector: model={} kernel={}x{} min_area={}",
            background.name(),
            width,
            height,
            settings.min_contour_area
        );
        Ok(Self {
            background,
            kernel,
            min_area: settings.min_contour_area,
            box_color: settings.box_color,
            box_thickness: settings.box_thickness.max(1),
            warm_up_frames: settings.warm_up_frames,
            last_index: None,
        })
    }

    pub fn background_name(&self) -> &'static str {
        self.background.name()
    }

    /// Phase the next processed frame will be in.
    pub fn phase(&self) -> DetectionPhase {
        if self.background.frames_seen() < self.warm_up_frames as u64 {
            DetectionPhase::WarmUp
        } else {
            DetectionPhase::Steady
        }
    }

    pub fn process(&mut self, index: u64, frame: &RgbImage) -> Result<FrameDetections> {
        if let Some(last) = self.last_index {
            if index <= last {
                return Err(PipelineError::OutOfOrder { index, last }.into());
            }
        }
        let phase = self.phase();

        let mask = self
            .background
            .apply(frame)
            .with_context(|| format!("background model failed on frame {}", index))?;
        let mask = morphology::open(&mask, &self.kernel);
        let foreground_pixels = mask.pixels().filter(|p| p[0] != BACKGROUND).count() as u64;
        let regions = filter_regions(&mask, self.min_area);
        self.last_index = Some(index);

        let result = match phase {
            DetectionPhase::WarmUp => FrameDetections {
                index,
                phase,
                detections: Vec::new(),
                foreground_pixels,
                suppressed: regions.len(),
            },
            DetectionPhase::Steady => FrameDetections {
                index,
                phase,
                detections: regions,
                foreground_pixels,
                suppressed: 0,
            },
        };
        log::debug!(
            "frame {}: {} region(s), {} foreground px ({:?})",
            index,
            result.detections.len(),
            foreground_pixels,
            phase
        );
        Ok(result)
    }

    /// Draw every detection of `result` onto `frame`.
    pub fn annotate(&self, frame: &mut RgbImage, result: &FrameDetections) {
        for detection in &result.detections {
            draw_box(frame, &detection.bbox, self.box_color, self.box_thickness);
        }
    }
}

/// Outer regions of `mask` enclosing at least `min_area` square pixels.
pub fn filter_regions(mask: &GrayImage, min_area: f64) -> Vec<Detection> {
    find_external_contours(mask)
        .into_iter()
        .filter_map(|contour| {
            let area = contour.area();
            (area >= min_area).then(|| Detection {
                bbox: contour.bounding_box(),
                area,
            })
        })
        .collect()
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct DetectionReport {
    pub output_dir: PathBuf,
    pub frames: Vec<FrameDetections>,
    /// Input artifacts that could not be decoded and have no output.
    pub skipped: Vec<u64>,
}

impl DetectionReport {
    pub fn processed(&self) -> usize {
        self.frames.len()
    }

    pub fn frames_with_motion(&self) -> usize {
        self.frames.iter().filter(|f| f.motion_detected()).count()
    }
}

/// Run detection over every artifact of `input`, writing one annotated frame
/// per decodable input frame to `output` under the same index and extension.
pub fn detect_motion<F>(
    input: &FrameStore,
    output: &mut FrameStore,
    settings: &DetectorSettings,
    mut on_frame: F,
) -> Result<DetectionReport>
where
    F: FnMut(&FrameDetections),
{
    let mut detector = MotionDetector::new(settings)?;
    let entries = input.entries()?;
    log::info!(
        "detecting motion in {} frame(s) from {} ({})",
        entries.len(),
        input.dir().display(),
        detector.background_name()
    );

    let mut report = DetectionReport {
        output_dir: output.dir().to_path_buf(),
        ..DetectionReport::default()
    };

    for entry in &entries {
        let frame = match input.read(entry) {
            Ok(frame) => frame,
            Err(err) => {
                let recoverable = classify(&err).is_some_and(|e| !e.is_fatal());
                if recoverable && settings.on_unreadable_frame == UnreadableFramePolicy::Skip {
                    log::warn!("skipping frame {}: {:#}", entry.index, err);
                    report.skipped.push(entry.index);
                    continue;
                }
                return Err(err);
            }
        };

        let result = detector.process(entry.index, &frame)?;
        let mut annotated = frame;
        detector.annotate(&mut annotated, &result);
        output.write_as(entry.index, entry.format, &annotated)?;

        on_frame(&result);
        report.frames.push(result);
    }

    if !report.skipped.is_empty() {
        log::warn!(
            "{} unreadable frame(s) skipped: {:?}",
            report.skipped.len(),
            report.skipped
        );
    }
    log::info!("Motion detected frames saved to: {}", output.dir().display());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ArtifactFormat;
    use crate::ingest::{SyntheticConfig, SyntheticVideo};
    use crate::detect::result::BoundingBox;
    use image::{Luma, Rgb};
    use std::fs;

    fn rect_mask(w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(200, 200, |x, y| {
            let inside = (20..20 + w).contains(&x) && (30..30 + h).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    fn scene() -> SyntheticVideo {
        SyntheticVideo::new(SyntheticConfig::default())
    }

    #[test]
    fn area_threshold_boundaries() {
        // Enclosed areas: 9 * 11 = 99, 1 * 101 = 101, 10 * 10 = 100.
        assert!(filter_regions(&rect_mask(10, 12), 100.0).is_empty());

        let kept = filter_regions(&rect_mask(2, 102), 100.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].area, 101.0);
        assert_eq!(
            kept[0].bbox,
            BoundingBox {
                x: 20,
                y: 30,
                width: 2,
                height: 102
            }
        );

        assert_eq!(filter_regions(&rect_mask(11, 11), 100.0).len(), 1);
    }

    fn blob_frame(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| {
            let inside = (20..20 + w).contains(&x) && (10..10 + h).contains(&y);
            Rgb(if inside { [220, 220, 220] } else { [40, 40, 40] })
        })
    }

    #[test]
    fn opened_blob_area_is_thresholded_through_process() -> Result<()> {
        // The 5x5 opening trims 1.5 px² from each corner of a solid block, so
        // 8x16 encloses 7 * 15 - 6 = 99 and 10x13 encloses 9 * 12 - 6 = 102.
        let settings = DetectorSettings {
            background_model: "mixture".to_string(),
            ..DetectorSettings::default()
        };
        let background = blob_frame(0, 0);

        let mut detector = MotionDetector::new(&settings)?;
        for index in 0..3 {
            detector.process(index, &background)?;
        }
        let small = detector.process(3, &blob_frame(8, 16))?;
        assert_eq!(small.phase, DetectionPhase::Steady);
        assert!(small.foreground_pixels > 0);
        assert!(small.detections.is_empty());

        let mut detector = MotionDetector::new(&settings)?;
        for index in 0..3 {
            detector.process(index, &background)?;
        }
        let large = detector.process(3, &blob_frame(10, 13))?;
        assert_eq!(large.detections.len(), 1);
        assert_eq!(large.detections[0].area, 102.0);
        assert_eq!(
            large.detections[0].bbox,
            BoundingBox {
                x: 20,
                y: 10,
                width: 10,
                height: 13
            }
        );
        Ok(())
    }

    #[test]
    fn identical_frames_have_no_motion() -> Result<()> {
        let mut detector = MotionDetector::new(&DetectorSettings::default())?;
        let frame = scene().render(0);
        detector.process(0, &frame)?;
        let result = detector.process(1, &frame)?;
        assert!(result.detections.is_empty());
        assert_eq!(result.foreground_pixels, 0);
        Ok(())
    }

    #[test]
    fn moving_square_yields_one_box() -> Result<()> {
        let video = scene();
        let mut detector = MotionDetector::new(&DetectorSettings::default())?;
        let mut last = FrameDetections::default();
        for index in [0, 10, 20, 30] {
            last = detector.process(index, &video.render(index))?;
        }
        let (x, y) = video.object_origin(30);
        let size = video.object_size();
        assert_eq!(last.phase, DetectionPhase::Steady);
        assert_eq!(last.detections.len(), 1);
        assert_eq!(
            last.detections[0].bbox,
            BoundingBox {
                x,
                y,
                width: size,
                height: size
            }
        );
        Ok(())
    }

    #[test]
    fn warm_up_suppresses_detections() -> Result<()> {
        let video = scene();
        let settings = DetectorSettings {
            warm_up_frames: 2,
            ..DetectorSettings::default()
        };
        let mut detector = MotionDetector::new(&settings)?;

        let first = detector.process(0, &video.render(0))?;
        assert_eq!(first.phase, DetectionPhase::WarmUp);
        assert!(first.detections.is_empty());
        assert_eq!(first.suppressed, 1);

        assert_eq!(detector.process(10, &video.render(10))?.phase, DetectionPhase::WarmUp);
        let steady = detector.process(20, &video.render(20))?;
        assert_eq!(steady.phase, DetectionPhase::Steady);
        assert_eq!(steady.detections.len(), 1);
        Ok(())
    }

    #[test]
    fn annotation_draws_configured_color() -> Result<()> {
        let video = scene();
        let mut detector = MotionDetector::new(&DetectorSettings::default())?;
        detector.process(0, &video.render(0))?;
        detector.process(10, &video.render(10))?;
        let mut frame = video.render(20);
        let result = detector.process(20, &frame)?;
        detector.annotate(&mut frame, &result);

        let bbox = result.detections[0].bbox;
        assert_eq!(frame.get_pixel(bbox.x, bbox.y).0, [0, 255, 0]);
        assert_eq!(frame.get_pixel(bbox.x + 1, bbox.y + 1).0, [0, 255, 0]);
        Ok(())
    }

    #[test]
    fn out_of_order_frames_are_rejected() -> Result<()> {
        let mut detector = MotionDetector::new(&DetectorSettings::default())?;
        let frame = scene().render(0);
        detector.process(10, &frame)?;
        let err = detector.process(10, &frame).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(PipelineError::OutOfOrder { index: 10, last: 10 })
        ));
        Ok(())
    }

    fn sampled_store(dir: &std::path::Path, indices: &[u64]) -> Result<FrameStore> {
        let video = scene();
        let mut store = FrameStore::create(dir, ArtifactFormat::Png)?;
        for &index in indices {
            store.write(index, &video.render(index))?;
        }
        Ok(store)
    }

    #[test]
    fn every_input_frame_gets_an_output() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let input = sampled_store(&tmp.path().join("frames"), &[0, 10, 20, 30])?;
        let mut output = FrameStore::create(tmp.path().join("motion"), ArtifactFormat::Jpg)?;

        let mut seen = Vec::new();
        let report = detect_motion(&input, &mut output, &DetectorSettings::default(), |f| {
            seen.push(f.index)
        })?;

        assert_eq!(seen, vec![0, 10, 20, 30]);
        assert_eq!(report.processed(), 4);
        assert!(report.skipped.is_empty());
        let names: Vec<String> = output
            .entries()?
            .iter()
            .map(|e| e.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["frame0000.png", "frame0010.png", "frame0020.png", "frame0030.png"]
        );
        Ok(())
    }

    #[test]
    fn unreadable_frame_is_skipped_by_default() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let input = sampled_store(&tmp.path().join("frames"), &[0, 10, 20])?;
        fs::write(input.dir().join("frame0015.png"), b"truncated")?;
        let mut output = FrameStore::create(tmp.path().join("motion"), ArtifactFormat::Png)?;

        let report = detect_motion(&input, &mut output, &DetectorSettings::default(), |_| {})?;
        assert_eq!(report.skipped, vec![15]);
        let indices: Vec<u64> = report.frames.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 10, 20]);
        assert_eq!(output.entries()?.len(), 3);
        Ok(())
    }

    #[test]
    fn unreadable_frame_aborts_when_configured() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let input = sampled_store(&tmp.path().join("frames"), &[0, 10])?;
        fs::write(input.dir().join("frame0005.png"), b"truncated")?;
        let mut output = FrameStore::create(tmp.path().join("motion"), ArtifactFormat::Png)?;
        let settings = DetectorSettings {
            on_unreadable_frame: UnreadableFramePolicy::Abort,
            ..DetectorSettings::default()
        };

        let err = detect_motion(&input, &mut output, &settings, |_| {}).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(PipelineError::DecodeFailure { index: 5, .. })
        ));
        assert_eq!(output.entries()?.len(), 1);
        Ok(())
    }
}
