//! Local video file source.
//!
//! `VideoFile` selects a backend from the path:
//! - `stub://...` paths use the deterministic synthetic source
//! - anything else is decoded with FFmpeg (feature: ingest-file-ffmpeg)
//!
//! Failure to open is reported as `PipelineError::SourceUnavailable`, which
//! aborts the pipeline before any frame is written.

use anyhow::Result;
use image::RgbImage;
use std::path::Path;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegVideo;
use super::synthetic::{SyntheticConfig, SyntheticVideo};
use super::VideoSource;
use crate::error::PipelineError;

pub struct VideoFile {
    path: String,
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticVideo),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegVideo),
}

impl VideoFile {
    pub fn open(path: &str) -> Result<Self> {
        let unavailable = |reason: String| PipelineError::SourceUnavailable {
            path: path.to_string(),
            reason,
        };

        if path.trim().is_empty() {
            return Err(unavailable("no video path configured".to_string()).into());
        }

        if path.starts_with("stub://") {
            let config = SyntheticConfig::from_url(path).map_err(|e| unavailable(e.to_string()))?;
            log::info!("VideoFile: opened {} (synthetic)", path);
            return Ok(Self {
                path: path.to_string(),
                backend: VideoBackend::Synthetic(SyntheticVideo::new(config)),
            });
        }

        if path.contains("://") {
            return Err(unavailable("only local files and stub:// sources are supported".into()).into());
        }
        if !Path::new(path).is_file() {
            return Err(unavailable("file does not exist".to_string()).into());
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let video = FfmpegVideo::open(path).map_err(|e| unavailable(format!("{:#}", e)))?;
            log::info!("VideoFile: opened {} (ffmpeg)", path);
            Ok(Self {
                path: path.to_string(),
                backend: VideoBackend::Ffmpeg(video),
            })
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(unavailable("decoding video files requires the ingest-file-ffmpeg feature".into()).into())
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn source(&self) -> &dyn VideoSource {
        match &self.backend {
            VideoBackend::Synthetic(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source,
        }
    }

    fn source_mut(&mut self) -> &mut dyn VideoSource {
        match &mut self.backend {
            VideoBackend::Synthetic(source) => source,
            #[cfg(feature = "ingest-file-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source,
        }
    }
}

impl VideoSource for VideoFile {
    fn frame_rate(&self) -> f64 {
        self.source().frame_rate()
    }

    fn frame_count(&self) -> u64 {
        self.source().frame_count()
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        self.source_mut().seek(index)
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        self.source_mut().read()
    }

    fn grab(&mut self) -> Result<bool> {
        self.source_mut().grab()
    }

    fn position(&self) -> u64 {
        self.source().position()
    }

    fn elapsed_secs(&self) -> f64 {
        self.source().elapsed_secs()
    }
}
