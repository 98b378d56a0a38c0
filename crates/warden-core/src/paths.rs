//! Default on-disk locations shared by the daemon and the CLI.

use std::path::PathBuf;

/// Frontal-face cascade shipped with the distribution OpenCV packages.
pub const DEFAULT_CASCADE_PATH: &str = "/usr/share/opencv4/haarcascades/haarcascade_frontalface_default.xml";

/// LBPH model written by the training job (OpenCV FileStorage YAML).
pub const MODEL_FILE: &str = "face_model.yml";

/// Label id to name mapping written next to the model.
pub const LABEL_MAPPING_FILE: &str = "label_mapping.json";

/// Data root: `WARDEN_DATA_DIR`, else `$XDG_DATA_HOME/warden`, else
/// `$HOME/.local/share/warden`. Blank variables count as unset.
pub fn default_data_dir(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());
    if let Some(dir) = var("WARDEN_DATA_DIR") {
        return PathBuf::from(dir);
    }
    var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = var("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("warden")
}
