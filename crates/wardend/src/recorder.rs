//! Screen recording evidence, captured by an `ffmpeg` child process.

use crate::evidence::timestamp;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Extra time ffmpeg gets past the requested duration before it is killed.
const FINALIZE_GRACE: Duration = Duration::from_secs(5);
const STDERR_TAIL_LINES: usize = 5;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("recording I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ffmpeg exited with {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("recording did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("recording task aborted: {0}")]
    Join(String),
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub duration: Duration,
    pub fps: u32,
    /// ffmpeg input device format, e.g. `x11grab`.
    pub input_format: String,
    /// ffmpeg input, e.g. the X display `:0.0`.
    pub input: String,
    pub ffmpeg: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(10),
            fps: 10,
            input_format: "x11grab".to_string(),
            input: ":0.0".to_string(),
            ffmpeg: PathBuf::from("ffmpeg"),
        }
    }
}

/// Starts background screen recordings, at most one at a time.
pub struct ScreenRecorder {
    config: RecorderConfig,
    output_dir: PathBuf,
    active: Arc<AtomicBool>,
}

/// Clears the "recording active" flag however the task ends.
struct ActiveGuard(Arc<AtomicBool>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A recording running on the tokio runtime.
pub struct RecordingHandle {
    path: PathBuf,
    task: JoinHandle<Result<(), RecorderError>>,
}

impl RecordingHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn wait(self) -> Result<PathBuf, RecorderError> {
        self.task.await.map_err(|e| RecorderError::Join(e.to_string()))??;
        Ok(self.path)
    }
}

impl ScreenRecorder {
    pub fn new(config: RecorderConfig, log_dir: &Path) -> Self {
        Self {
            config,
            output_dir: log_dir.join("screen_recordings"),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn output_path(&self, at: DateTime<Local>) -> PathBuf {
        self.output_dir.join(format!("screen_{}.avi", timestamp(at)))
    }

    fn command_args(&self, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            self.config.input_format.clone(),
            "-framerate".into(),
            self.config.fps.to_string(),
            "-t".into(),
            self.config.duration.as_secs().to_string(),
            "-i".into(),
            self.config.input.clone(),
            output.to_string_lossy().into_owned(),
        ]
    }

    /// Start recording on the current tokio runtime.
    ///
    /// Returns `None` when a recording is already running; the trigger is
    /// dropped, not queued.
    pub fn start(&self, at: DateTime<Local>) -> Option<RecordingHandle> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("screen recording already in progress; skipping");
            return None;
        }
        let guard = ActiveGuard(Arc::clone(&self.active));

        let path = self.output_path(at);
        let args = self.command_args(&path);
        let program = self.config.ffmpeg.clone();
        let dir = self.output_dir.clone();
        let limit = self.config.duration + FINALIZE_GRACE;
        let output = path.clone();

        tracing::info!(path = %path.display(), secs = self.config.duration.as_secs(), "screen recording started");

        let task = tokio::spawn(async move {
            let _guard = guard;
            tokio::fs::create_dir_all(&dir).await?;

            let child = Command::new(&program)
                .args(&args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|e| RecorderError::Spawn {
                    program: program.display().to_string(),
                    source: e,
                })?;

            // Dropping the child on timeout kills it and releases the output file.
            let result = tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| RecorderError::TimedOut(limit))??;

            if !result.status.success() {
                let stderr = String::from_utf8_lossy(&result.stderr);
                let lines: Vec<&str> = stderr.lines().collect();
                let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
                return Err(RecorderError::Failed {
                    status: result.status.code(),
                    stderr: tail,
                });
            }

            tracing::info!(path = %output.display(), "screen recording saved");
            Ok::<(), RecorderError>(())
        });

        Some(RecordingHandle { path, task })
    }
}
