// SPDX-License-Identifier: GPL-3.0-only

//! Messages into and out of the orchestrator

use super::accumulator::ShotCounter;
use super::state::RequestId;
use crate::backends::{AttitudeSample, CapturedFrame, PanoramaImage, RawImage};
use crate::errors::{CaptureError, FrameRejection, SessionFailure, StitchError};
use std::time::Duration;

/// Everything that can happen to a session
///
/// Sensor, camera, timer and stitcher callbacks are all turned into one of
/// these and processed in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Caller asked for a new session
    Start,
    /// Caller asked to abandon the session
    Cancel,
    /// Outcome of the camera permission check
    PermissionResolved {
        epoch: u64,
        result: Result<(), CaptureError>,
    },
    /// Orientation reading from the feed started for `epoch`
    Attitude { epoch: u64, sample: AttitudeSample },
    /// The orientation feed could not be started
    FeedUnavailable { epoch: u64, reason: String },
    /// Camera answered a capture request (already scored when successful)
    CaptureCompleted {
        request: RequestId,
        result: Result<CapturedFrame, CaptureError>,
    },
    /// A capture request passed its deadline
    CaptureTimedOut { request: RequestId },
    /// Stitcher finished the batch submitted for `epoch`
    StitchFinished {
        epoch: u64,
        result: Result<PanoramaImage, StitchError>,
    },
}

impl SessionEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Start => "start",
            SessionEvent::Cancel => "cancel",
            SessionEvent::PermissionResolved { .. } => "permission-resolved",
            SessionEvent::Attitude { .. } => "attitude",
            SessionEvent::FeedUnavailable { .. } => "feed-unavailable",
            SessionEvent::CaptureCompleted { .. } => "capture-completed",
            SessionEvent::CaptureTimedOut { .. } => "capture-timed-out",
            SessionEvent::StitchFinished { .. } => "stitch-finished",
        }
    }
}

/// Side effects requested by the orchestrator
#[derive(Debug)]
pub enum Effect {
    CheckPermission,
    StartFeed { epoch: u64, period: Duration },
    StopFeed,
    /// Call the camera and arm the request's deadline
    RequestCapture { request: RequestId },
    /// Arm the deadline only; the camera still owes an earlier reply
    HoldCapture { request: RequestId },
    /// Hand the ordered batch to the stitcher; ownership moves with it
    SubmitBatch { epoch: u64, frames: Vec<RawImage> },
    Notify(SessionUpdate),
}

/// Notifications for the surrounding UI
#[derive(Debug, Clone)]
pub enum SessionUpdate {
    Progress(f64),
    FrameCountChanged(ShotCounter),
    FrameAccepted(RawImage),
    FrameRejected {
        rejection: FrameRejection,
        retrying: bool,
    },
    Completed(PanoramaImage),
    Failed(SessionFailure),
}
