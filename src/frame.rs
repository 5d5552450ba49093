//! Sampled frames and the artifact naming scheme shared by both stores.
//!
//! Artifacts are named `frame{index:04}.{ext}`. The index is the frame's
//! position in the source video, so the name alone carries the ordering.

use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Prefix shared by every frame artifact.
pub const FRAME_PREFIX: &str = "frame";

/// Minimum number of digits in the encoded index.
pub const INDEX_WIDTH: usize = 4;

/// A decoded frame plus the source index it came from.
///
/// Only lives between decode and persistence; the store copy is authoritative.
pub struct SampledFrame {
    pub index: u64,
    pub image: RgbImage,
}

impl SampledFrame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }
}

/// Still-image encoding used for artifacts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Jpg,
    Png,
}

impl ArtifactFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    pub(crate) fn image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
        }
    }
}

/// Artifact file name for a frame index, e.g. `frame0042.jpg`.
pub fn artifact_name(index: u64, format: ArtifactFormat) -> String {
    format!(
        "{}{:0width$}.{}",
        FRAME_PREFIX,
        index,
        format.extension(),
        width = INDEX_WIDTH
    )
}

/// Parse `frame<digits>.<ext>` back into its index and format.
///
/// Indices past 9999 simply use more digits, so names are not assumed to be
/// fixed-width.
pub fn parse_artifact_name(name: &str) -> Option<(u64, ArtifactFormat)> {
    let rest = name.strip_prefix(FRAME_PREFIX)?;
    let (digits, ext) = rest.rsplit_once('.')?;
    if digits.len() < INDEX_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index = digits.parse().ok()?;
    let format = ArtifactFormat::from_extension(ext)?;
    Some((index, format))
}
