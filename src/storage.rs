//! Flat, index-ordered still-image stores.
//!
//! A `FrameStore` is a directory of `frame{index:04}.{ext}` artifacts. It is
//! append-only while the sampler (or detector) writes it and read-only while
//! the next phase consumes it. There is no metadata beyond the file name, so a
//! store opened for writing starts empty and each index has one artifact.

use anyhow::Result;
use image::RgbImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::frame::{artifact_name, parse_artifact_name, ArtifactFormat};

/// One artifact found in a store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameEntry {
    pub index: u64,
    pub format: ArtifactFormat,
    pub path: PathBuf,
}

pub struct FrameStore {
    dir: PathBuf,
    format: ArtifactFormat,
    last_written: Option<u64>,
    written: u64,
}

impl FrameStore {
    /// Open a store for writing, creating its directory if absent.
    ///
    /// Artifacts left by an earlier run are removed; other files are kept.
    pub fn create(dir: impl Into<PathBuf>, format: ArtifactFormat) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PipelineError::StorageUnavailable {
            path: dir.clone(),
            reason: e.to_string(),
        })?;
        clear_artifacts(&dir)?;
        Ok(Self {
            dir,
            format,
            last_written: None,
            written: 0,
        })
    }

    /// Open an existing store for reading.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(PipelineError::StorageUnavailable {
                path: dir,
                reason: "directory does not exist".to_string(),
            }
            .into());
        }
        Ok(Self {
            dir,
            format: ArtifactFormat::default(),
            last_written: None,
            written: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of artifacts written through this handle.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Persist a frame under its index. Indices must be strictly increasing.
    pub fn write(&mut self, index: u64, image: &RgbImage) -> Result<PathBuf> {
        self.write_as(index, self.format, image)
    }

    /// Like `write`, but with an explicit encoding. Used to mirror the
    /// extension of an input artifact.
    pub fn write_as(
        &mut self,
        index: u64,
        format: ArtifactFormat,
        image: &RgbImage,
    ) -> Result<PathBuf> {
        if let Some(last) = self.last_written {
            if index <= last {
                return Err(PipelineError::OutOfOrder { index, last }.into());
            }
        }
        let path = self.dir.join(artifact_name(index, format));
        image
            .save_with_format(&path, format.image_format())
            .map_err(|e| PipelineError::StorageUnavailable {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        self.last_written = Some(index);
        self.written += 1;
        log::debug!("wrote {}", path.display());
        Ok(path)
    }

    /// List artifacts sorted by their numeric index. Unrelated files are ignored.
    ///
    /// Two artifacts with the same index (say `frame0010.png` and
    /// `frame0010.jpg`) make the store ambiguous and fail the listing.
    pub fn entries(&self) -> Result<Vec<FrameEntry>> {
        let mut entries = scan(&self.dir)?;
        entries.sort_by_key(|entry| entry.index);
        if let Some(pair) = entries.windows(2).find(|w| w[0].index == w[1].index) {
            log::warn!(
                "{} and {} share frame index {}",
                pair[0].path.display(),
                pair[1].path.display(),
                pair[0].index
            );
            return Err(PipelineError::StorageUnavailable {
                path: self.dir.clone(),
                reason: format!(
                    "frame {} is stored more than once ({} and {})",
                    pair[0].index,
                    pair[0].path.display(),
                    pair[1].path.display()
                ),
            }
            .into());
        }
        Ok(entries)
    }

    /// Decode one artifact.
    pub fn read(&self, entry: &FrameEntry) -> Result<RgbImage> {
        let image = image::open(&entry.path).map_err(|e| PipelineError::DecodeFailure {
            index: entry.index,
            reason: format!("{}: {}", entry.path.display(), e),
        })?;
        Ok(image.to_rgb8())
    }
}

fn scan(dir: &Path) -> Result<Vec<FrameEntry>> {
    let unavailable = |e: std::io::Error| PipelineError::StorageUnavailable {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    };

    let mut entries = Vec::new();
    for item in fs::read_dir(dir).map_err(unavailable)? {
        let item = item.map_err(unavailable)?;
        let name = item.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some((index, format)) = parse_artifact_name(name) else {
            log::debug!("ignoring {} in {}", name, dir.display());
            continue;
        };
        entries.push(FrameEntry {
            index,
            format,
            path: item.path(),
        });
    }
    Ok(entries)
}

fn clear_artifacts(dir: &Path) -> Result<()> {
    let stale = scan(dir)?;
    for entry in &stale {
        fs::remove_file(&entry.path).map_err(|e| PipelineError::StorageUnavailable {
            path: entry.path.clone(),
            reason: e.to_string(),
        })?;
        log::debug!("removed stale {}", entry.path.display());
    }
    if !stale.is_empty() {
        log::info!(
            "cleared {} frame(s) left in {} by an earlier run",
            stale.len(),
            dir.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::classify;
    use image::Rgb;

    fn solid(value: u8) -> RgbImage {
        RgbImage::from_pixel(8, 6, Rgb([value, value, value]))
    }

    #[test]
    fn create_makes_missing_directory() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let dir = tmp.path().join("nested").join("frames");
        let store = FrameStore::create(&dir, ArtifactFormat::Png)?;
        assert!(dir.is_dir());
        assert_eq!(store.written(), 0);
        Ok(())
    }

    #[test]
    fn entries_follow_numeric_index_order() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut store = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        for index in [0, 10, 9990, 10000] {
            store.write(index, &solid(index as u8))?;
        }
        fs::write(tmp.path().join("notes.txt"), b"not a frame")?;

        let reader = FrameStore::open(tmp.path())?;
        let indices: Vec<u64> = reader.entries()?.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 10, 9990, 10000]);
        Ok(())
    }

    #[test]
    fn write_rejects_repeated_or_decreasing_index() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut store = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        store.write(5, &solid(1))?;
        let err = store.write(5, &solid(2)).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(PipelineError::OutOfOrder { index: 5, last: 5 })
        ));
        assert!(store.write(3, &solid(2)).is_err());
        assert_eq!(store.written(), 1);
        Ok(())
    }

    #[test]
    fn png_round_trip_is_lossless() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut store = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        let mut image = solid(40);
        image.put_pixel(3, 2, Rgb([200, 10, 90]));
        store.write(7, &image)?;

        let entries = store.entries()?;
        assert_eq!(entries.len(), 1);
        assert_eq!(store.read(&entries[0])?, image);
        Ok(())
    }

    #[test]
    fn write_as_keeps_requested_extension() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut store = FrameStore::create(tmp.path(), ArtifactFormat::Jpg)?;
        let path = store.write_as(2, ArtifactFormat::Png, &solid(9))?;
        assert_eq!(path, tmp.path().join("frame0002.png"));
        let entries = store.entries()?;
        assert_eq!(entries[0].format, ArtifactFormat::Png);
        Ok(())
    }

    #[test]
    fn create_clears_artifacts_from_an_earlier_run() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut first = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        for index in [0, 5, 10] {
            first.write(index, &solid(1))?;
        }
        fs::write(tmp.path().join("frame0020.jpg"), b"stale")?;
        fs::write(tmp.path().join("notes.txt"), b"keep me")?;

        let mut second = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        assert!(second.entries()?.is_empty());
        second.write(0, &solid(2))?;
        let indices: Vec<u64> = second.entries()?.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0]);
        assert!(tmp.path().join("notes.txt").is_file());
        Ok(())
    }

    #[test]
    fn duplicate_index_makes_the_store_ambiguous() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let mut png = FrameStore::create(tmp.path(), ArtifactFormat::Png)?;
        png.write(10, &solid(3))?;
        let mut jpg = FrameStore::open(tmp.path())?;
        jpg.write_as(10, ArtifactFormat::Jpg, &solid(3))?;
        assert!(tmp.path().join("frame0010.png").is_file());
        assert!(tmp.path().join("frame0010.jpg").is_file());

        let err = FrameStore::open(tmp.path())?.entries().unwrap_err();
        match classify(&err) {
            Some(PipelineError::StorageUnavailable { reason, .. }) => {
                assert!(reason.contains("frame 10"), "{reason}");
                assert!(reason.contains("frame0010.png"), "{reason}");
                assert!(reason.contains("frame0010.jpg"), "{reason}");
            }
            other => panic!("expected StorageUnavailable, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn corrupt_artifact_is_a_decode_failure() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        fs::write(tmp.path().join("frame0003.jpg"), b"definitely not a jpeg")?;
        let store = FrameStore::open(tmp.path())?;
        let entries = store.entries()?;
        let err = store.read(&entries[0]).unwrap_err();
        assert!(matches!(
            classify(&err),
            Some(PipelineError::DecodeFailure { index: 3, .. })
        ));
        Ok(())
    }

    #[test]
    fn open_missing_directory_is_storage_unavailable() {
        let err = FrameStore::open("/nonexistent/motionsift/frames")
            .err()
            .expect("missing dir");
        assert!(matches!(
            classify(&err),
            Some(PipelineError::StorageUnavailable { .. })
        ));
    }
}
