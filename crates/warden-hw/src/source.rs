//! Sequential frame source abstraction.

use crate::camera::CameraError;
use crate::frame::Frame;

/// Anything that yields camera frames one at a time.
///
/// `next_frame` blocks until a frame is available. An error means this read
/// failed; callers decide whether to retry or give up.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Human-readable description for logs.
    fn describe(&self) -> String {
        "frame source".to_string()
    }
}
