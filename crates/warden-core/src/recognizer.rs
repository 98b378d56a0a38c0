//! LBPH identity classifier.
//!
//! The model is the one the training job saves with OpenCV's
//! `LBPHFaceRecognizer` (FileStorage YAML, `opencv_lbphfaces` node), so the
//! same distances come out here as during training.

use crate::types::{FaceRegion, IdentityResult, LabelMapping};
use opencv::core::{Mat, Ptr, Rect};
use opencv::face::{FaceRecognizerTrait, LBPHFaceRecognizer};
use opencv::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Confidence below which a face counts as a match.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 50.0;

#[derive(Error, Debug)]
pub enum RecognizerError {
    #[error("recognition model not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("model path is not valid UTF-8: {0}")]
    InvalidPath(PathBuf),
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("face crop {width}x{height} too small for LBP radius {radius}")]
    FaceTooSmall { width: i32, height: i32, radius: i32 },
    #[error("face region lies outside the frame")]
    EmptyRegion,
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}

/// What a loaded model holds, for reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub radius: i32,
    pub neighbors: i32,
    pub grid_x: i32,
    pub grid_y: i32,
    /// One label per training sample, in training order.
    pub labels: Vec<i32>,
}

/// Nearest-neighbour LBPH recognizer backed by OpenCV.
pub struct LbphRecognizer {
    inner: Ptr<LBPHFaceRecognizer>,
    radius: i32,
}

impl LbphRecognizer {
    /// Load a model saved by `LBPHFaceRecognizer::save` (YAML or XML).
    ///
    /// A missing file is `ModelNotFound`; a file that holds no samples, or
    /// whose histogram and label counts disagree, is `InvalidModel`.
    pub fn load(path: &Path) -> Result<Self, RecognizerError> {
        if !path.exists() {
            return Err(RecognizerError::ModelNotFound(path.to_path_buf()));
        }
        let path_str = path
            .to_str()
            .ok_or_else(|| RecognizerError::InvalidPath(path.to_path_buf()))?;

        let mut inner = LBPHFaceRecognizer::create_def()?;
        FaceRecognizerTrait::read(&mut inner, path_str)?;

        let recognizer = Self {
            radius: inner.get_radius()?,
            inner,
        };
        let summary = recognizer.summary()?;
        let samples = recognizer.inner.get_histograms()?.len();
        if samples == 0 {
            return Err(RecognizerError::InvalidModel("model holds no samples".into()));
        }
        if samples != summary.labels.len() {
            return Err(RecognizerError::InvalidModel(format!(
                "{samples} histograms but {} labels",
                summary.labels.len()
            )));
        }

        tracing::info!(
            path = %path.display(),
            samples,
            radius = summary.radius,
            neighbors = summary.neighbors,
            grid = ?(summary.grid_x, summary.grid_y),
            "loaded LBPH model"
        );
        Ok(recognizer)
    }

    pub fn summary(&self) -> Result<ModelSummary, RecognizerError> {
        let labels = self.inner.get_labels()?;
        let labels = if labels.empty() {
            Vec::new()
        } else {
            labels.data_typed::<i32>()?.to_vec()
        };
        Ok(ModelSummary {
            radius: self.inner.get_radius()?,
            neighbors: self.inner.get_neighbors()?,
            grid_x: self.inner.get_grid_x()?,
            grid_y: self.inner.get_grid_y()?,
            labels,
        })
    }

    /// Predict `(label, distance)` for an 8-bit grayscale face crop.
    pub fn predict(&self, face: &Mat) -> Result<(i32, f64), RecognizerError> {
        let (width, height) = (face.cols(), face.rows());
        if width <= 2 * self.radius || height <= 2 * self.radius {
            return Err(RecognizerError::FaceTooSmall {
                width,
                height,
                radius: self.radius,
            });
        }
        let mut label = -1;
        let mut confidence = 0.0;
        self.inner.predict(face, &mut label, &mut confidence)?;
        Ok((label, confidence))
    }
}

/// Anything that decides whose face a region of a grayscale frame shows.
pub trait IdentityClassifier {
    fn classify(&mut self, gray: &Mat, region: &FaceRegion) -> Result<IdentityResult, RecognizerError>;
}

/// LBPH recognizer plus label names and the match threshold.
pub struct FaceClassifier {
    recognizer: LbphRecognizer,
    mapping: LabelMapping,
    threshold: f64,
}

impl FaceClassifier {
    pub fn new(recognizer: LbphRecognizer, mapping: LabelMapping, threshold: f64) -> Self {
        Self {
            recognizer,
            mapping,
            threshold,
        }
    }
}

impl IdentityClassifier for FaceClassifier {
    fn classify(&mut self, gray: &Mat, region: &FaceRegion) -> Result<IdentityResult, RecognizerError> {
        let rect = clip(region, gray.cols(), gray.rows()).ok_or(RecognizerError::EmptyRegion)?;
        let face = Mat::roi(gray, rect)?.try_clone()?;
        let (label, confidence) = self.recognizer.predict(&face)?;
        let result = IdentityResult::resolve(label, confidence, self.threshold, &self.mapping);
        tracing::debug!(
            face = region.index,
            label,
            confidence,
            known = result.is_known(),
            "classified face"
        );
        Ok(result)
    }
}

/// The part of `region` inside a `cols` x `rows` frame, if any.
fn clip(region: &FaceRegion, cols: i32, rows: i32) -> Option<Rect> {
    let x0 = (region.x as i64).min(cols as i64);
    let y0 = (region.y as i64).min(rows as i64);
    let x1 = (region.x as i64 + region.width as i64).min(cols as i64);
    let y1 = (region.y as i64 + region.height as i64).min(rows as i64);
    (x1 > x0 && y1 > y0).then(|| Rect::new(x0 as i32, y0 as i32, (x1 - x0) as i32, (y1 - y0) as i32))
}
