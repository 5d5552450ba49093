//! Deterministic synthetic video (`stub://` paths).
//!
//! Renders a flat, lightly textured background with a bright square sliding
//! left to right. Query parameters shape the stream:
//!
//! `stub://scene?fps=10&frames=100&width=160&height=120&clock=10&corrupt=40&stall=60`
//!
//! - `clock`: rate at which the source's own timestamps advance. Differs from
//!   `fps` to simulate containers whose nominal rate is not the real one.
//! - `corrupt`: index whose decode fails.
//! - `stall`: index after which the reported clock stops advancing.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};

use super::VideoSource;
use crate::error::PipelineError;

const BACKGROUND_LEVEL: u8 = 60;
const OBJECT_COLOR: Rgb<u8> = Rgb([230, 200, 40]);
const OBJECT_STEP_PX: u32 = 2;

#[derive(Clone, Debug, PartialEq)]
pub struct SyntheticConfig {
    pub name: String,
    pub fps: f64,
    pub frames: u64,
    pub width: u32,
    pub height: u32,
    pub clock: Option<f64>,
    pub corrupt: Option<u64>,
    pub stall: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "scene".to_string(),
            fps: 10.0,
            frames: 100,
            width: 160,
            height: 120,
            clock: None,
            corrupt: None,
            stall: None,
        }
    }
}

impl SyntheticConfig {
    /// Parse a `stub://name?key=value&...` path.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("stub://")
            .ok_or_else(|| anyhow!("synthetic sources use the stub:// scheme"))?;
        let (name, query) = rest.split_once('?').unwrap_or((rest, ""));

        let mut config = Self {
            name: name.to_string(),
            ..Self::default()
        };
        for pair in query.split('&').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("malformed stub parameter '{}'", pair))?;
            match key {
                "fps" => config.fps = parse_value(key, value)?,
                "frames" => config.frames = parse_value(key, value)?,
                "width" => config.width = parse_value(key, value)?,
                "height" => config.height = parse_value(key, value)?,
                "clock" => config.clock = Some(parse_value(key, value)?),
                "corrupt" => config.corrupt = Some(parse_value(key, value)?),
                "stall" => config.stall = Some(parse_value(key, value)?),
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid value '{}' for stub parameter '{}'", value, key))
}

pub struct SyntheticVideo {
    config: SyntheticConfig,
    position: u64,
}

impl SyntheticVideo {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            position: 0,
        }
    }

    pub fn config(&self) -> &SyntheticConfig {
        &self.config
    }

    /// Top-left corner of the moving square in frame `index`.
    pub fn object_origin(&self, index: u64) -> (u32, u32) {
        let size = self.object_size();
        let travel = self.config.width.saturating_sub(size).max(1) as u64;
        let x = ((index * OBJECT_STEP_PX as u64) % travel) as u32;
        let y = (self.config.height.saturating_sub(size)) / 2;
        (x, y)
    }

    pub fn object_size(&self) -> u32 {
        (self.config.width.min(self.config.height) / 8).max(4)
    }

    /// Render frame `index` without touching the read position.
    pub fn render(&self, index: u64) -> RgbImage {
        let (width, height) = (self.config.width, self.config.height);
        let mut image = RgbImage::from_fn(width, height, |x, y| {
            let texture = ((x * 7 + y * 13) % 16) as u8;
            let level = BACKGROUND_LEVEL + texture;
            Rgb([level, level, level.saturating_add(8)])
        });

        let size = self.object_size();
        let (ox, oy) = self.object_origin(index);
        for y in oy..(oy + size).min(height) {
            for x in ox..(ox + size).min(width) {
                image.put_pixel(x, y, OBJECT_COLOR);
            }
        }
        image
    }

    fn clock(&self) -> f64 {
        self.config.clock.unwrap_or(self.config.fps)
    }
}

impl VideoSource for SyntheticVideo {
    fn frame_rate(&self) -> f64 {
        self.config.fps
    }

    fn frame_count(&self) -> u64 {
        self.config.frames
    }

    fn seek(&mut self, index: u64) -> Result<()> {
        self.position = index.min(self.config.frames);
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let index = self.position;
        if index >= self.config.frames {
            return Ok(None);
        }
        if self.config.corrupt == Some(index) {
            return Err(PipelineError::DecodeFailure {
                index,
                reason: format!("synthetic corruption in stub://{}", self.config.name),
            }
            .into());
        }
        self.position += 1;
        Ok(Some(self.render(index)))
    }

    fn grab(&mut self) -> Result<bool> {
        if self.position >= self.config.frames {
            return Ok(false);
        }
        self.position += 1;
        Ok(true)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn elapsed_secs(&self) -> f64 {
        let clock = self.clock();
        if clock <= 0.0 {
            return 0.0;
        }
        let consumed = match self.config.stall {
            Some(stall) => self.position.min(stall + 1),
            None => self.position,
        };
        consumed as f64 / clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_parameters() -> Result<()> {
        let cfg = SyntheticConfig::from_url("stub://yard?fps=25&frames=250&clock=24.5&corrupt=7")?;
        assert_eq!(cfg.name, "yard");
        assert_eq!(cfg.fps, 25.0);
        assert_eq!(cfg.frames, 250);
        assert_eq!(cfg.clock, Some(24.5));
        assert_eq!(cfg.corrupt, Some(7));
        assert_eq!(cfg.stall, None);
        assert_eq!(cfg.width, 160);
        Ok(())
    }

    #[test]
    fn rejects_unknown_or_malformed_parameters() {
        assert!(SyntheticConfig::from_url("stub://x?speed=3").is_err());
        assert!(SyntheticConfig::from_url("stub://x?fps").is_err());
        assert!(SyntheticConfig::from_url("stub://x?fps=fast").is_err());
        assert!(SyntheticConfig::from_url("stub://x?width=0").is_err());
        assert!(SyntheticConfig::from_url("file:///x.mp4").is_err());
    }

    #[test]
    fn read_grab_and_seek_track_position() -> Result<()> {
        let mut video = SyntheticVideo::new(SyntheticConfig {
            frames: 5,
            ..SyntheticConfig::default()
        });
        assert!(video.read()?.is_some());
        assert!(video.grab()?);
        assert_eq!(video.position(), 2);
        assert!((video.elapsed_secs() - 0.2).abs() < 1e-9);

        video.seek(4)?;
        assert!(video.read()?.is_some());
        assert!(video.read()?.is_none());
        assert!(!video.grab()?);

        video.seek(99)?;
        assert_eq!(video.position(), 5);
        Ok(())
    }

    #[test]
    fn stalled_clock_stops_advancing() -> Result<()> {
        let mut video = SyntheticVideo::new(SyntheticConfig {
            stall: Some(2),
            ..SyntheticConfig::default()
        });
        for _ in 0..10 {
            video.grab()?;
        }
        assert!((video.elapsed_secs() - 0.3).abs() < 1e-9);
        Ok(())
    }

    #[test]
    fn object_moves_between_frames() {
        let video = SyntheticVideo::new(SyntheticConfig::default());
        assert_ne!(video.object_origin(0), video.object_origin(10));
        assert_eq!(video.render(3), video.render(3));
        assert_ne!(video.render(0), video.render(10));
    }

    #[test]
    fn corrupt_frame_fails_to_decode() -> Result<()> {
        let mut video = SyntheticVideo::new(SyntheticConfig {
            corrupt: Some(1),
            ..SyntheticConfig::default()
        });
        video.read()?;
        assert!(video.read().is_err());
        Ok(())
    }
}
