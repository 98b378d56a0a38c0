//! Still-image evidence written next to the operator's logs.

use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use warden_hw::{Frame, FrameError};

const JPEG_QUALITY: u8 = 90;
/// Highest `_N` suffix tried before giving up on a timestamp.
const MAX_COLLISION_SUFFIX: u32 = 999;

#[derive(Error, Debug)]
pub enum EvidenceError {
    #[error("failed to write evidence {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode JPEG: {0}")]
    Encode(#[from] image::ImageError),
    #[error("failed to read frame pixels: {0}")]
    Frame(#[from] FrameError),
    #[error("no free file name for {0} after {MAX_COLLISION_SUFFIX} attempts")]
    Exhausted(String),
}

/// Wall-clock stamp used in evidence file names: `YYYYMMDD_HHMMSS`.
pub fn timestamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Writes annotated frames as JPEGs under `<logs>/intruder_images/`.
pub struct EvidenceStore {
    images_dir: PathBuf,
}

impl EvidenceStore {
    pub fn new(log_dir: &Path) -> Self {
        Self {
            images_dir: log_dir.join("intruder_images"),
        }
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    /// Save `frame` as `intruder_<ts>.jpg`.
    ///
    /// Two captures in the same second never overwrite each other: the later
    /// one gets `_1`, `_2`, ... appended, and each name is claimed atomically.
    pub fn capture_still(&self, frame: &Frame, at: DateTime<Local>) -> Result<PathBuf, EvidenceError> {
        std::fs::create_dir_all(&self.images_dir).map_err(|e| EvidenceError::Io {
            path: self.images_dir.clone(),
            source: e,
        })?;

        let stem = format!("intruder_{}", timestamp(at));
        let (path, file) = self.claim(&stem)?;

        if let Err(e) = write_jpeg(file, &path, frame) {
            // Don't leave a truncated image behind.
            let _ = std::fs::remove_file(&path);
            return Err(e);
        }

        tracing::info!(path = %path.display(), "intruder image saved");
        Ok(path)
    }

    fn claim(&self, stem: &str) -> Result<(PathBuf, File), EvidenceError> {
        for n in 0..=MAX_COLLISION_SUFFIX {
            let name = if n == 0 {
                format!("{stem}.jpg")
            } else {
                format!("{stem}_{n}.jpg")
            };
            let path = self.images_dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(EvidenceError::Io { path, source: e }),
            }
        }
        Err(EvidenceError::Exhausted(stem.to_string()))
    }
}

fn write_jpeg(file: File, path: &Path, frame: &Frame) -> Result<(), EvidenceError> {
    let rgb = frame.to_rgb()?;
    let mut writer = BufWriter::new(file);
    JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode(
        &rgb,
        frame.width,
        frame.height,
        ExtendedColorType::Rgb8,
    )?;
    writer.flush().map_err(|e| EvidenceError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
