use crate::notify::email::{DEFAULT_SMTP_HOST, DEFAULT_SMTP_PORT};
use crate::notify::messaging::{DEFAULT_TWILIO_API_BASE, DEFAULT_WHATSAPP_FROM};
use crate::notify::{EmailConfig, MessagingConfig};
use crate::recorder::RecorderConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use warden_core::paths::{default_data_dir, DEFAULT_CASCADE_PATH, LABEL_MAPPING_FILE, MODEL_FILE};
use warden_core::{CooldownPolicy, DetectorParams};

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root for the model, label mapping and logs (default: $XDG_DATA_HOME/warden).
    pub data_dir: PathBuf,
    pub model_path: PathBuf,
    pub label_mapping_path: PathBuf,
    pub cascade_path: PathBuf,
    /// Evidence lands under `<log_dir>/intruder_images` and `<log_dir>/screen_recordings`.
    pub log_dir: PathBuf,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Frames discarded after opening the camera (auto-exposure settling).
    pub warmup_frames: usize,
    pub scale_factor: f64,
    pub min_neighbors: usize,
    /// Smallest face edge in pixels; 0 disables the limit.
    pub min_face_size: u32,
    /// Recognizer distance below which a face is known.
    pub confidence_threshold: f64,
    pub alert_cooldown_secs: u64,
    pub cooldown_policy: CooldownPolicy,
    /// Consecutive frame read failures tolerated before the loop gives up.
    pub max_frame_failures: usize,
    /// Per-channel delivery timeout.
    pub notify_timeout_secs: u64,
    /// `None` unless `WARDEN_SCREEN_RECORDING` is enabled.
    pub screen_recording: Option<RecorderConfig>,
    /// `None` unless sender, receiver and password are all set.
    pub email: Option<EmailConfig>,
    /// `None` unless SID, token, recipient and evidence URL are all set.
    pub messaging: Option<MessagingConfig>,
}

impl Config {
    /// Load configuration from `WARDEN_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let data_dir = default_data_dir(&var);

        let path_or = |key: &str, default: PathBuf| var(key).map(PathBuf::from).unwrap_or(default);

        let cooldown_policy = match var("WARDEN_COOLDOWN_POLICY") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "invalid WARDEN_COOLDOWN_POLICY; using global");
                CooldownPolicy::default()
            }),
            None => CooldownPolicy::default(),
        };

        let recorder_defaults = RecorderConfig::default();
        let screen_recording = env_bool(&var, "WARDEN_SCREEN_RECORDING", false).then(|| RecorderConfig {
            duration: Duration::from_secs(env_or(&var, "WARDEN_SCREEN_RECORDING_SECS", 10)),
            fps: env_or(&var, "WARDEN_SCREEN_RECORDING_FPS", recorder_defaults.fps),
            input_format: var("WARDEN_SCREEN_INPUT_FORMAT").unwrap_or(recorder_defaults.input_format),
            input: var("WARDEN_SCREEN_INPUT").unwrap_or(recorder_defaults.input),
            ffmpeg: var("WARDEN_FFMPEG").map(PathBuf::from).unwrap_or(recorder_defaults.ffmpeg),
        });

        let email = match (
            var("WARDEN_EMAIL_SENDER"),
            var("WARDEN_EMAIL_RECEIVER"),
            var("WARDEN_EMAIL_PASSWORD"),
        ) {
            (Some(sender), Some(receiver), Some(password)) => Some(EmailConfig {
                sender,
                receiver,
                password,
                smtp_host: var("WARDEN_SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port: env_or(&var, "WARDEN_SMTP_PORT", DEFAULT_SMTP_PORT),
            }),
            _ => None,
        };

        let messaging = match (
            var("WARDEN_TWILIO_ACCOUNT_SID"),
            var("WARDEN_TWILIO_AUTH_TOKEN"),
            var("WARDEN_WHATSAPP_TO"),
            var("WARDEN_EVIDENCE_BASE_URL"),
        ) {
            (Some(account_sid), Some(auth_token), Some(to), Some(evidence_base_url)) => Some(MessagingConfig {
                account_sid,
                auth_token,
                from: var("WARDEN_WHATSAPP_FROM").unwrap_or_else(|| DEFAULT_WHATSAPP_FROM.to_string()),
                to,
                evidence_base_url,
                api_base: var("WARDEN_TWILIO_API_BASE").unwrap_or_else(|| DEFAULT_TWILIO_API_BASE.to_string()),
            }),
            _ => None,
        };

        Self {
            model_path: path_or("WARDEN_MODEL_PATH", data_dir.join(MODEL_FILE)),
            label_mapping_path: path_or("WARDEN_LABEL_MAPPING_PATH", data_dir.join(LABEL_MAPPING_FILE)),
            cascade_path: path_or("WARDEN_CASCADE_PATH", PathBuf::from(DEFAULT_CASCADE_PATH)),
            log_dir: path_or("WARDEN_LOG_DIR", data_dir.join("logs")),
            camera_device: var("WARDEN_CAMERA_DEVICE").unwrap_or_else(|| "/dev/video0".to_string()),
            warmup_frames: env_or(&var, "WARDEN_WARMUP_FRAMES", 4),
            scale_factor: env_or(&var, "WARDEN_SCALE_FACTOR", DetectorParams::default().scale_factor),
            min_neighbors: env_or(&var, "WARDEN_MIN_NEIGHBORS", DetectorParams::default().min_neighbors),
            min_face_size: env_or(&var, "WARDEN_MIN_FACE_SIZE", 0),
            confidence_threshold: env_or(
                &var,
                "WARDEN_CONFIDENCE_THRESHOLD",
                warden_core::recognizer::DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            alert_cooldown_secs: env_or(&var, "WARDEN_ALERT_COOLDOWN_SECS", 30),
            cooldown_policy,
            max_frame_failures: env_or(&var, "WARDEN_MAX_FRAME_FAILURES", 3),
            notify_timeout_secs: env_or(&var, "WARDEN_NOTIFY_TIMEOUT_SECS", 30),
            screen_recording,
            email,
            messaging,
            data_dir,
        }
    }

    pub fn detector_params(&self) -> DetectorParams {
        DetectorParams {
            scale_factor: self.scale_factor,
            min_neighbors: self.min_neighbors,
            min_size: (self.min_face_size, self.min_face_size),
        }
    }

    pub fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

fn env_or<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    var(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn env_bool(var: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    var(key)
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
        .unwrap_or(default)
}
