// SPDX-License-Identifier: GPL-3.0-only

//! Error types for guided panorama capture

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera capture errors
    Capture(CaptureError),
    /// Stitching errors
    Stitch(StitchError),
    /// A guided session ended without a panorama
    Session(SessionFailure),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Errors reported by the camera for a single capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Camera access refused by the user or the platform
    PermissionDenied,
    /// Device is busy with another request
    DeviceBusy,
    /// Hardware or driver fault
    Hardware(String),
    /// The request did not complete before its deadline
    TimedOut,
    /// Anything else the device reports
    Other(String),
}

/// Errors reported by the stitching service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StitchError {
    /// Frame set unusable as given (too few frames, mismatched sizes)
    InvalidInput(String),
    /// Frames were valid but could not be combined
    StitchingFailed(String),
}

/// Why a guided session ended without a panorama
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    /// Camera access refused; fatal, never retried
    PermissionDenied,
    /// Orientation sensor could not be started
    OrientationUnavailable(String),
    /// The batch hand-off failed; a fresh rotation is required
    StitchFailed(StitchError),
    /// Too many targets were skipped to leave a stitchable batch
    InsufficientFrames {
        /// Frames that passed the focus gate
        accepted: usize,
        /// Minimum the stitcher needs
        required: usize,
    },
}

/// Why a capture at the current target is being repeated or dropped
#[derive(Debug, Clone, PartialEq)]
pub enum FrameRejection {
    /// The camera did not deliver a frame
    CaptureFailed(CaptureError),
    /// The frame scored below the sharpness threshold
    BlurRejected {
        /// Score reported by the detector
        score: f64,
        /// Threshold in force
        threshold: f64,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Capture(e) => write!(f, "Capture error: {}", e),
            AppError::Stitch(e) => write!(f, "Stitch error: {}", e),
            AppError::Session(e) => write!(f, "Session failed: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::PermissionDenied => write!(f, "Camera permission denied"),
            CaptureError::DeviceBusy => write!(f, "Camera is busy"),
            CaptureError::Hardware(msg) => write!(f, "Camera hardware fault: {}", msg),
            CaptureError::TimedOut => write!(f, "Capture timed out"),
            CaptureError::Other(msg) => write!(f, "Capture failed: {}", msg),
        }
    }
}

impl fmt::Display for StitchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StitchError::InvalidInput(msg) => write!(f, "Invalid stitch input: {}", msg),
            StitchError::StitchingFailed(msg) => write!(f, "Stitching failed: {}", msg),
        }
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailure::PermissionDenied => write!(f, "Camera permission denied"),
            SessionFailure::OrientationUnavailable(msg) => {
                write!(f, "Orientation sensor unavailable: {}", msg)
            }
            SessionFailure::StitchFailed(e) => write!(f, "Could not create panorama: {}", e),
            SessionFailure::InsufficientFrames { accepted, required } => write!(
                f,
                "Only {} sharp frames captured, at least {} required",
                accepted, required
            ),
        }
    }
}

impl fmt::Display for FrameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameRejection::CaptureFailed(e) => write!(f, "{}", e),
            FrameRejection::BlurRejected { score, threshold } => write!(
                f,
                "Frame too blurry (score {:.1} < {:.1})",
                score, threshold
            ),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CaptureError {}
impl std::error::Error for StitchError {}
impl std::error::Error for SessionFailure {}
impl std::error::Error for FrameRejection {}

impl From<CaptureError> for AppError {
    fn from(err: CaptureError) -> Self {
        AppError::Capture(err)
    }
}

impl From<StitchError> for AppError {
    fn from(err: StitchError) -> Self {
        AppError::Stitch(err)
    }
}

impl From<SessionFailure> for AppError {
    fn from(err: SessionFailure) -> Self {
        AppError::Session(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Storage(err.to_string())
    }
}
