//! warden-core: face location, identity classification and alert gating.
//!
//! OpenCV does the vision work: a Haar `CascadeClassifier` finds faces, an
//! `LBPHFaceRecognizer` decides who they belong to, and `imgproc` draws the
//! result. A cooldown tracker limits how often an unknown face may raise an
//! alert. Everything here is synchronous and CPU-only.

pub mod annotate;
pub mod cooldown;
pub mod detector;
pub mod paths;
pub mod recognizer;
pub mod types;

pub use cooldown::{CooldownPolicy, CooldownTracker, IdentityKey};
pub use detector::{CascadeDetector, DetectorError, DetectorParams, FaceLocator};
pub use recognizer::{FaceClassifier, IdentityClassifier, LbphRecognizer, ModelSummary, RecognizerError};
pub use types::{FaceRegion, Identity, IdentityResult, LabelMapping, LabelMappingError};
