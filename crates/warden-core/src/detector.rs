//! Haar cascade face locator.
//!
//! Wraps OpenCV's `CascadeClassifier` loaded from a cascade XML such as
//! `haarcascade_frontalface_default.xml`.

use crate::types::FaceRegion;
use opencv::core::{Mat, Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const DEFAULT_SCALE_FACTOR: f64 = 1.3;
const DEFAULT_MIN_NEIGHBORS: usize = 5;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("cascade file not found: {0}")]
    CascadeNotFound(PathBuf),
    #[error("cascade path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),
    #[error("cascade did not load: {0}")]
    EmptyCascade(PathBuf),
    #[error("invalid detector parameters: {0}")]
    InvalidParams(String),
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// Anything that finds face rectangles in a grayscale frame.
pub trait FaceLocator {
    fn locate(&mut self, gray: &Mat) -> Result<Vec<FaceRegion>, DetectorError>;
}

/// Tuning knobs trading recall against false positives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorParams {
    /// Pyramid step; each level shrinks the image by this factor. Must be > 1.
    pub scale_factor: f64,
    /// Overlapping hits a face needs before it is reported.
    pub min_neighbors: usize,
    /// Smallest face considered, in frame pixels. (0, 0) means no limit.
    pub min_size: (u32, u32),
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: (0, 0),
        }
    }
}

impl DetectorParams {
    fn validate(&self) -> Result<(), DetectorError> {
        if !(self.scale_factor > 1.0) || !self.scale_factor.is_finite() {
            return Err(DetectorError::InvalidParams(format!(
                "scale factor must be greater than 1, got {}",
                self.scale_factor
            )));
        }
        if i32::try_from(self.min_neighbors).is_err() {
            return Err(DetectorError::InvalidParams(format!(
                "min neighbors out of range: {}",
                self.min_neighbors
            )));
        }
        Ok(())
    }
}

/// Open a cascade file, rejecting paths OpenCV could not turn into a classifier.
pub fn load_cascade(path: &Path) -> Result<CascadeClassifier, DetectorError> {
    if !path.exists() {
        return Err(DetectorError::CascadeNotFound(path.to_path_buf()));
    }
    let path_str = path
        .to_str()
        .ok_or_else(|| DetectorError::InvalidPath(path.to_path_buf()))?;
    let classifier = CascadeClassifier::new(path_str)?;
    if classifier.empty()? {
        return Err(DetectorError::EmptyCascade(path.to_path_buf()));
    }
    Ok(classifier)
}

/// Viola-Jones face locator over one loaded cascade.
pub struct CascadeDetector {
    classifier: CascadeClassifier,
    params: DetectorParams,
    hits: Vector<Rect>,
}

impl CascadeDetector {
    pub fn load(path: &Path, params: DetectorParams) -> Result<Self, DetectorError> {
        params.validate()?;
        let classifier = load_cascade(path)?;
        tracing::info!(
            path = %path.display(),
            scale_factor = params.scale_factor,
            min_neighbors = params.min_neighbors,
            "loaded face cascade"
        );
        Ok(Self {
            classifier,
            params,
            hits: Vector::new(),
        })
    }
}

impl FaceLocator for CascadeDetector {
    fn locate(&mut self, gray: &Mat) -> Result<Vec<FaceRegion>, DetectorError> {
        if gray.empty() {
            return Ok(Vec::new());
        }
        let (min_w, min_h) = self.params.min_size;
        self.hits.clear();
        self.classifier.detect_multi_scale(
            gray,
            &mut self.hits,
            self.params.scale_factor,
            self.params.min_neighbors as i32,
            0,
            Size::new(min_w as i32, min_h as i32),
            Size::default(),
        )?;
        Ok(regions_from_rects(self.hits.iter(), gray.cols(), gray.rows()))
    }
}

/// Convert raw detections into regions clipped to a `cols` x `rows` frame,
/// numbered in detection order. Rectangles with no area left are dropped.
pub fn regions_from_rects(rects: impl IntoIterator<Item = Rect>, cols: i32, rows: i32) -> Vec<FaceRegion> {
    rects
        .into_iter()
        .filter_map(|r| {
            let x0 = r.x.clamp(0, cols);
            let y0 = r.y.clamp(0, rows);
            let x1 = (r.x + r.width).clamp(0, cols);
            let y1 = (r.y + r.height).clamp(0, rows);
            (x1 > x0 && y1 > y0).then(|| (x0, y0, x1 - x0, y1 - y0))
        })
        .enumerate()
        .map(|(index, (x, y, w, h))| FaceRegion {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
            index,
        })
        .collect()
}
