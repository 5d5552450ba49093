//! motionsift
//!
//! Offline motion review for recorded video. A video is reduced to still
//! frames taken at a fixed time interval, and every still is run through an
//! adaptive background model; moving regions large enough to matter are boxed
//! on a copy of the frame for a human to review.
//!
//! # Pipeline
//!
//! ```text
//! video ──> FrameSampler ──> FrameStore (frames/) ──> MotionDetector ──> FrameStore (motion_detected_frames/)
//! ```
//!
//! The two phases communicate only through the frame store on disk. The
//! detector depends on the store's index order: background models are
//! stateful, so frames are processed in strictly increasing index order.
//!
//! # Module Structure
//!
//! - `config`: layered configuration (file, environment, validation)
//! - `ingest`: video sources (synthetic `stub://` clips, FFmpeg-decoded files)
//! - `sampler`: drift-corrected interval sampling
//! - `storage`: index-ordered still-image stores
//! - `detect`: background subtraction, morphology, contours, annotation
//! - `pipeline`: the two phases wired together, plus JSON reports

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod sampler;
pub mod storage;
pub mod ui;

pub use config::{DetectorSettings, PipelineConfig, SamplerSettings, UnreadableFramePolicy};
pub use detect::{
    detect_motion, BoundingBox, Detection, DetectionPhase, DetectionReport, FrameDetections,
    MotionDetector,
};
pub use error::{classify, PipelineError};
pub use frame::{ArtifactFormat, SampledFrame};
pub use ingest::{VideoFile, VideoSource};
pub use pipeline::{run_pipeline, PipelineReport};
pub use sampler::{FrameSampler, SamplingReport, StopReason};
pub use storage::{FrameEntry, FrameStore};
