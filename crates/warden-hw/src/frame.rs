//! Frame type and pixel format conversion into OpenCV matrices.

use opencv::core::{Mat, Scalar, CV_8UC1, CV_8UC2, CV_8UC3};
use opencv::imgproc;
use opencv::prelude::*;
use std::time::Instant;

/// A captured camera frame: a BGR image plus a grayscale copy.
pub struct Frame {
    /// 8-bit BGR image. The detection loop draws annotations into it.
    pub image: Mat,
    /// 8-bit grayscale taken at capture, before any annotation.
    pub gray: Mat,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
}

impl Frame {
    /// Wrap an 8-bit BGR matrix, deriving the grayscale copy.
    pub fn from_bgr(image: Mat, sequence: u32) -> Result<Self, FrameError> {
        if image.typ() != CV_8UC3 {
            return Err(FrameError::UnsupportedType(image.typ()));
        }
        let mut gray = Mat::default();
        imgproc::cvt_color_def(&image, &mut gray, imgproc::COLOR_BGR2GRAY)?;
        Ok(Self {
            width: image.cols() as u32,
            height: image.rows() as u32,
            image,
            gray,
            timestamp: Instant::now(),
            sequence,
        })
    }

    /// Build a frame from packed RGB24 pixels.
    pub fn from_rgb(rgb: &[u8], width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let packed = mat_from_bytes(rgb, width, height, CV_8UC3)?;
        let mut image = Mat::default();
        imgproc::cvt_color_def(&packed, &mut image, imgproc::COLOR_RGB2BGR)?;
        Self::from_bgr(image, sequence)
    }

    /// Build a frame from 8-bit grayscale pixels; the image replicates luma.
    pub fn from_gray(gray: &[u8], width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let gray = mat_from_bytes(gray, width, height, CV_8UC1)?;
        let mut image = Mat::default();
        imgproc::cvt_color_def(&gray, &mut image, imgproc::COLOR_GRAY2BGR)?;
        Ok(Self {
            image,
            gray,
            width,
            height,
            timestamp: Instant::now(),
            sequence,
        })
    }

    /// Build a frame from packed YUYV 4:2:2 ([Y0, U, Y1, V] per pixel pair).
    ///
    /// Trailing driver padding past `width * height * 2` bytes is ignored.
    pub fn from_yuyv(yuyv: &[u8], width: u32, height: u32, sequence: u32) -> Result<Self, FrameError> {
        let expected = (width as usize) * (height as usize) * 2;
        if yuyv.len() < expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: yuyv.len(),
            });
        }
        let packed = mat_from_bytes(&yuyv[..expected], width, height, CV_8UC2)?;
        let mut image = Mat::default();
        imgproc::cvt_color_def(&packed, &mut image, imgproc::COLOR_YUV2BGR_YUYV)?;
        Self::from_bgr(image, sequence)
    }

    /// Packed RGB24 copy of the (possibly annotated) image, for encoders.
    pub fn to_rgb(&self) -> Result<Vec<u8>, FrameError> {
        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&self.image, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        Ok(rgb.data_bytes()?.to_vec())
    }
}

fn mat_from_bytes(bytes: &[u8], width: u32, height: u32, typ: i32) -> Result<Mat, FrameError> {
    let channels = match typ {
        CV_8UC1 => 1,
        CV_8UC2 => 2,
        _ => 3,
    };
    let expected = (width as usize) * (height as usize) * channels;
    if bytes.len() != expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: bytes.len(),
        });
    }
    let mut mat = Mat::new_rows_cols_with_default(height as i32, width as i32, typ, Scalar::all(0.0))?;
    mat.data_bytes_mut()?.copy_from_slice(bytes);
    Ok(mat)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("unsupported matrix type {0} (need 8-bit BGR)")]
    UnsupportedType(i32),
    #[error("opencv: {0}")]
    OpenCv(#[from] opencv::Error),
}
