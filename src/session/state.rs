// SPDX-License-Identifier: GPL-3.0-only

//! Session state owned by the orchestrator

use super::accumulator::SessionAccumulator;
use crate::angle;
use std::fmt;
use uuid::Uuid;

/// Identifier of one capture request
///
/// Monotonic for the lifetime of an orchestrator, so a completion that
/// arrives after its request was superseded can always be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the guided capture currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapturePhase {
    /// No session
    #[default]
    Inactive,
    /// Waiting for the camera permission check
    AwaitingPermission,
    /// Feed running, waiting for the first sample to set the reference
    Idle,
    /// Watching the yaw for the next target
    Tracking,
    /// One capture request in flight
    Requesting { request: RequestId, attempt: u32 },
    /// Batch handed to the stitcher
    Stitching,
    /// Panorama delivered
    Complete,
    /// Session ended with a failure; a new start is required
    Failed,
}

impl CapturePhase {
    /// Whether a session is in progress (start requests are ignored)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CapturePhase::AwaitingPermission
                | CapturePhase::Idle
                | CapturePhase::Tracking
                | CapturePhase::Requesting { .. }
                | CapturePhase::Stitching
        )
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, CapturePhase::Requesting { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            CapturePhase::Inactive => "inactive",
            CapturePhase::AwaitingPermission => "awaiting-permission",
            CapturePhase::Idle => "idle",
            CapturePhase::Tracking => "tracking",
            CapturePhase::Requesting { .. } => "requesting",
            CapturePhase::Stitching => "stitching",
            CapturePhase::Complete => "complete",
            CapturePhase::Failed => "failed",
        }
    }
}

/// One guided capture run
#[derive(Debug)]
pub struct CaptureSession {
    /// Correlates log lines of one run
    pub id: Uuid,
    pub epoch: u64,
    /// Yaw of the first sample; unset until the feed delivers
    pub reference_yaw: Option<f64>,
    /// Always within (−π, π]
    pub next_target_angle: f64,
    pub retry_count: u32,
    /// Frames dropped after exhausting their retries
    pub discarded: usize,
    /// Last progress value reported to observers
    pub last_progress: Option<f64>,
    pub accumulator: SessionAccumulator,
}

impl CaptureSession {
    pub fn new(epoch: u64, expected_shots: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            reference_yaw: None,
            next_target_angle: 0.0,
            retry_count: 0,
            discarded: 0,
            last_progress: None,
            accumulator: SessionAccumulator::new(expected_shots),
        }
    }

    /// Record the reference yaw and aim at the first target
    pub fn anchor(&mut self, yaw: f64, step: f64) {
        let reference = angle::normalize(yaw);
        self.reference_yaw = Some(reference);
        self.next_target_angle = angle::normalize(reference + step);
    }

    /// Move the target one step forward
    pub fn advance_target(&mut self, step: f64) {
        self.next_target_angle = angle::normalize(self.next_target_angle + step);
    }

    /// Drop the reference and every buffered frame
    pub fn reset(&mut self) {
        self.reference_yaw = None;
        self.next_target_angle = 0.0;
        self.retry_count = 0;
        self.last_progress = None;
        self.accumulator.clear();
    }
}
