//! Local file video source using FFmpeg.
//!
//! Decodes the best video stream to RGB24. Seeking by frame index jumps to the
//! preceding keyframe and decodes forward, discarding frames until the
//! requested index is reached. Frame indices and the source clock are derived
//! from presentation timestamps, so variable-rate files report their real time.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::VideoSource;
use crate::error::PipelineError;

pub(crate) struct FfmpegVideo {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    time_base: f64,
    fps: f64,
    frame_count: u64,
    position: u64,
    elapsed: f64,
    skip_until: Option<u64>,
    eof_sent: bool,
}

impl FfmpegVideo {
    pub(crate) fn open(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path))?;

        let (stream_index, time_base, fps, frame_count, parameters) = {
            let stream = input
                .streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| anyhow!("file has no video track"))?;
            let mut rate = f64::from(stream.avg_frame_rate());
            if !rate.is_finite() || rate <= 0.0 {
                rate = f64::from(stream.rate());
            }
            let time_base = f64::from(stream.time_base());
            let frame_count = if stream.frames() > 0 {
                stream.frames() as u64
            } else if stream.duration() > 0 && rate.is_finite() {
                (stream.duration() as f64 * time_base * rate).round() as u64
            } else if input.duration() > 0 && rate.is_finite() {
                (input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE) * rate).round()
                    as u64
            } else {
                0
            };
            (
                stream.index(),
                time_base,
                rate,
                frame_count,
                stream.parameters(),
            )
        };

        let context = ffmpeg::codec::context::Context::from_parameters(parameters)
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::debug!(
            "ffmpeg source {}: {:.3} fps, {} frames, {}x{}",
            path,
            fps,
            frame_count,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            time_base,
            fps,
            frame_count,
            position: 0,
            elapsed: 0.0,
            skip_until: None,
            eof_sent: false,
        })
    }

    /// Decode the next frame at or after any pending seek target.
    /// Returns the frame, its index and its start time in seconds.
    fn next_decoded(&mut self) -> Result<Option<(ffmpeg::frame::Video, u64, f64)>> {
        loop {
            let mut decoded = ffmpeg::frame::Video::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let secs = match decoded.timestamp().or_else(|| decoded.pts()) {
                        Some(ts) => ts as f64 * self.time_base,
                        None => self.position as f64 / self.fps,
                    };
                    let index = (secs * self.fps).round().max(0.0) as u64;
                    if let Some(target) = self.skip_until {
                        if index < target {
                            continue;
                        }
                        self.skip_until = None;
                    }
                    return Ok(Some((decoded, index, secs)));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                // Anything else means the decoder wants more input.
                Err(_) => {}
            }

            if self.eof_sent {
                return Ok(None);
            }
            self.feed_packet()?;
        }
    }

    fn feed_packet(&mut self) -> Result<()> {
        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            return self.decoder.send_packet(&packet).map_err(|e| {
                anyhow::Error::from(PipelineError::DecodeFailure {
                    index: self.position,
                    reason: e.to_string(),
                })
            });
        }
        self.decoder.send_eof().context("flush ffmpeg decoder")?;
        self.eof_sent = true;
        Ok(())
    }

    fn consume(&mut self, index: u64, secs: f64) {
        self.position = index + 1;
        self.elapsed = secs + 1.0 / self.fps;
    }
}

impl VideoSource for FfmpegVideo {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        if index == self.position && self.skip_until.is_none() {
            return Ok(());
        }
        let micros = (index as f64 / self.fps * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        self.input
            .seek(micros, ..micros)
            .with_context(|| format!("seek to frame {}", index))?;
        self.decoder.flush();
        self.eof_sent = false;
        self.skip_until = Some(index);
        self.position = index;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let Some((decoded, index, secs)) = self.next_decoded()? else {
            return Ok(None);
        };
        let mut rgb = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb)
            .map_err(|e| PipelineError::DecodeFailure {
                index,
                reason: format!("scale frame to RGB: {}", e),
            })?;
        let image = frame_to_image(&rgb).map_err(|e| PipelineError::DecodeFailure {
            index,
            reason: e.to_string(),
        })?;
        self.consume(index, secs);
        Ok(Some(image))
    }

    fn grab(&mut self) -> Result<bool> {
        match self.next_decoded()? {
            Some((_, index, secs)) => {
                self.consume(index, secs);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn elapsed_secs(&self) -> f64 {
        self.elapsed
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| anyhow!("decoded frame buffer does not match {}x{}", width, height))
}
