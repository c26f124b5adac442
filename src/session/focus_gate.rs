// SPDX-License-Identifier: GPL-3.0-only

//! Focus-quality gate with bounded retries

use crate::errors::{CaptureError, FrameRejection};

/// What to do with a capture outcome
#[derive(Debug, Clone, PartialEq)]
pub enum GateVerdict {
    /// Keep the frame
    Accept,
    /// Capture again at the same target
    Retry(FrameRejection),
    /// Retries used up; drop the frame
    Discard(FrameRejection),
}

/// Accepts frames at or above a sharpness threshold
///
/// Blurry frames and camera errors share one retry budget per target:
/// with `max_retries = 2` a target sees at most three capture attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FocusGate {
    threshold: f64,
    max_retries: u32,
}

impl FocusGate {
    pub fn new(threshold: f64, max_retries: u32) -> Self {
        Self {
            threshold,
            max_retries,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Judge a captured frame's sharpness given the retries already spent
    pub fn check_frame(&self, score: f64, retries: u32) -> GateVerdict {
        // NaN scores never pass
        if score >= self.threshold {
            return GateVerdict::Accept;
        }
        self.reject(
            FrameRejection::BlurRejected {
                score,
                threshold: self.threshold,
            },
            retries,
        )
    }

    /// Judge a failed capture given the retries already spent
    pub fn check_error(&self, error: CaptureError, retries: u32) -> GateVerdict {
        self.reject(FrameRejection::CaptureFailed(error), retries)
    }

    fn reject(&self, rejection: FrameRejection, retries: u32) -> GateVerdict {
        if retries < self.max_retries {
            GateVerdict::Retry(rejection)
        } else {
            GateVerdict::Discard(rejection)
        }
    }
}
