//! warden-hw: Camera capture and frame handling.
//!
//! Provides V4L2-based camera access, pixel format conversion into
//! OpenCV BGR + grayscale frames, and the `FrameSource` trait the detection
//! loop consumes.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::FrameSource;
