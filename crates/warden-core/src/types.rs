use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Display name used when a matched label has no entry in the mapping.
pub const UNKNOWN_NAME: &str = "Unknown";

/// Rectangle around a located face, in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Ordinal of this region within its frame. Not stable across frames.
    pub index: usize,
}

/// Outcome of the known/unknown decision for one face.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Identity {
    Known { name: String },
    Unknown,
}

/// Classification of one face region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IdentityResult {
    pub identity: Identity,
    /// Nearest label reported by the recognizer, whether or not it matched.
    pub label: i32,
    /// Distance to the nearest label. Lower = closer.
    pub confidence: f64,
}

impl IdentityResult {
    /// Apply the match threshold to a raw `(label, confidence)` prediction.
    ///
    /// Below `threshold` is a match regardless of the label; the name comes from
    /// `mapping`, falling back to [`UNKNOWN_NAME`]. At or above is unknown
    /// regardless of the label.
    pub fn resolve(label: i32, confidence: f64, threshold: f64, mapping: &LabelMapping) -> Self {
        let identity = if confidence < threshold {
            Identity::Known {
                name: mapping.name_for(label).unwrap_or(UNKNOWN_NAME).to_string(),
            }
        } else {
            Identity::Unknown
        };
        Self {
            identity,
            label,
            confidence,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self.identity, Identity::Known { .. })
    }

    /// Annotation text: the person's name, or "Intruder".
    pub fn display_name(&self) -> &str {
        match &self.identity {
            Identity::Known { name } => name,
            Identity::Unknown => "Intruder",
        }
    }
}

#[derive(Error, Debug)]
pub enum LabelMappingError {
    #[error("label mapping file not found: {0}")]
    NotFound(String),
    #[error("failed to read label mapping: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid label mapping JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("label mapping key is not an integer: {0:?}")]
    InvalidKey(String),
}

/// Numeric label → display name, as written by the training job.
///
/// On disk this is a JSON object keyed by string-encoded integers:
/// `{"0": "alice", "1": "bob"}`.
#[derive(Debug, Clone, Default)]
pub struct LabelMapping {
    names: BTreeMap<i32, String>,
}

impl LabelMapping {
    /// Load a mapping file. A missing file is reported as `NotFound`.
    pub fn load(path: &Path) -> Result<Self, LabelMappingError> {
        if !path.exists() {
            return Err(LabelMappingError::NotFound(path.display().to_string()));
        }
        let raw = std::fs::read_to_string(path)?;
        let mapping = Self::from_json(&raw)?;
        tracing::info!(path = %path.display(), labels = mapping.len(), "loaded label mapping");
        Ok(mapping)
    }

    pub fn from_json(raw: &str) -> Result<Self, LabelMappingError> {
        let entries: BTreeMap<String, String> = serde_json::from_str(raw)?;
        let mut names = BTreeMap::new();
        for (key, name) in entries {
            let Ok(label) = key.trim().parse::<i32>() else {
                return Err(LabelMappingError::InvalidKey(key));
            };
            names.insert(label, name);
        }
        Ok(Self { names })
    }

    pub fn name_for(&self, label: i32) -> Option<&str> {
        self.names.get(&label).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl FromIterator<(i32, String)> for LabelMapping {
    fn from_iter<T: IntoIterator<Item = (i32, String)>>(iter: T) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}
