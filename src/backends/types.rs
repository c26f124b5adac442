// SPDX-License-Identifier: GPL-3.0-only

//! Shared types for capture backends

use image::RgbaImage;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// One orientation reading from the sensor feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttitudeSample {
    /// Rotation about the vertical axis (radians)
    pub yaw: f64,
    /// Time since the feed was started
    pub timestamp: Duration,
}

impl AttitudeSample {
    pub fn new(yaw: f64) -> Self {
        Self {
            yaw,
            timestamp: Duration::ZERO,
        }
    }
}

/// A still image as delivered by the camera
///
/// Pixel data is tightly packed RGBA8 and shared via `Arc`, so cloning a
/// frame (e.g. to show it as a preview while it sits in the batch) does
/// not copy pixels.
#[derive(Clone)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub captured_at: Instant,
}

impl RawImage {
    /// Wrap an RGBA buffer without copying
    pub fn from_rgba(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            data: Arc::from(image.into_raw()),
            captured_at: Instant::now(),
        }
    }

    /// Copy back into an `image` buffer
    ///
    /// Returns `None` if the byte count does not match the dimensions.
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data.to_vec())
    }

    /// Luma plane (BT.601 weights, 0..255) in row-major order
    pub fn luma(&self) -> Vec<f32> {
        self.data
            .chunks_exact(4)
            .map(|px| 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32)
            .collect()
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the buffer holds exactly `width * height` RGBA pixels
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.pixel_count() * 4
    }
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RawImage({}x{}, {} bytes)",
            self.width,
            self.height,
            self.data.len()
        )
    }
}

/// A sharpness-scored capture, as handed to the focus gate
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub image: RawImage,
    /// Score from the blur detector; higher is sharper
    pub sharpness: f64,
}

/// Output of a successful stitch
#[derive(Debug, Clone)]
pub struct PanoramaImage {
    pub image: RgbaImage,
    /// Number of source frames combined
    pub frame_count: usize,
}

impl PanoramaImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Result type for backend lifecycle operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Error types for backend lifecycle operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Sensor or device is not present on this system
    NotAvailable(String),
    /// `start` called on a source that is already delivering
    AlreadyRunning,
    /// Other errors
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotAvailable(msg) => write!(f, "Backend not available: {}", msg),
            BackendError::AlreadyRunning => write!(f, "Backend already running"),
            BackendError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for BackendError {}
