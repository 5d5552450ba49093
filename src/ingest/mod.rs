//! Video sources.
//!
//! This module provides the read handle the sampler consumes:
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic `stub://` sources (testing, demos)
//!
//! A source is an ordered, finite, seekable sequence of frames with a nominal
//! frame rate. The sampler owns the handle for the duration of a run and drops
//! it on completion or on the first read failure.

use anyhow::Result;
use image::RgbImage;

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
pub mod synthetic;

pub use file::VideoFile;
pub use synthetic::{SyntheticConfig, SyntheticVideo};

/// Read handle over a decoded video stream.
pub trait VideoSource {
    /// Nominal frames per second reported by the container.
    fn frame_rate(&self) -> f64;

    /// Total number of frames reported by the container.
    fn frame_count(&self) -> u64;

    /// Position the source so the next `read`/`grab` returns frame `index`.
    fn seek(&mut self, index: u64) -> Result<()>;

    /// Decode the next frame. `Ok(None)` marks the end of the source.
    fn read(&mut self) -> Result<Option<RgbImage>>;

    /// Advance past the next frame without converting it. Returns false at the end.
    fn grab(&mut self) -> Result<bool>;

    /// Index of the frame the next `read`/`grab` will return.
    fn position(&self) -> u64;

    /// Source clock, in seconds, after the most recently consumed frame.
    fn elapsed_secs(&self) -> f64;
}

impl<S: VideoSource + ?Sized> VideoSource for Box<S> {
    fn frame_rate(&self) -> f64 {
        (**self).frame_rate()
    }

    fn frame_count(&self) -> u64 {
        (**self).frame_count()
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        (**self).seek(index)
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        (**self).read()
    }

    fn grab(&mut self) -> Result<bool> {
        (**self).grab()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn elapsed_secs(&self) -> f64 {
        (**self).elapsed_secs()
    }
}
