// SPDX-License-Identifier: GPL-3.0-only

//! Device ports consumed by the capture orchestrator
//!
//! ```text
//! ┌──────────────────────┐        ┌───────────────────────┐
//! │  OrientationSource   │ ─────▶ │                       │
//! │  (yaw @ fixed rate)  │ sample │    SessionRunner      │
//! └──────────────────────┘        │  (single event queue) │
//! ┌──────────────────────┐        │                       │
//! │  CameraCapturePort   │ ◀────▶ │                       │
//! │  (one shot at a time)│ reply  └───────────────────────┘
//! └──────────────────────┘
//! ```
//!
//! Both ports deliver through callbacks that may run on any thread; the
//! runner turns every callback into an event on its own queue before any
//! session state is touched.
//!
//! Concrete adapters in this module ([`ScriptedOrientation`],
//! [`VirtualCamera`]) drive the whole pipeline without hardware.

pub mod orientation;
pub mod sample_loop;
pub mod types;
pub mod virtual_camera;

pub use orientation::{ScriptedOrientation, SharedHeading, YawScript};
pub use types::*;
pub use virtual_camera::VirtualCamera;

use crate::errors::CaptureError;
use std::time::Duration;

/// Callback receiving orientation samples
pub type AttitudeSink = Box<dyn Fn(AttitudeSample) + Send + 'static>;

/// Callback receiving the outcome of one capture request
pub type CaptureReply = Box<dyn FnOnce(Result<RawImage, CaptureError>) + Send + 'static>;

/// Periodic attitude sensor
pub trait OrientationSource: Send {
    /// Begin delivering samples every `period`
    ///
    /// # Returns
    /// * `Ok(())` - Feed started
    /// * `Err(BackendError::AlreadyRunning)` - `start` without a matching `stop`
    /// * `Err(BackendError)` - Sensor unavailable
    fn start(&mut self, period: Duration, sink: AttitudeSink) -> BackendResult<()>;

    /// Stop the feed
    ///
    /// When this returns the sink will not be called again. Calling it on
    /// a stopped source is a no-op.
    fn stop(&mut self);

    /// Whether samples are currently being delivered
    fn is_running(&self) -> bool;
}

/// Still-capture camera
pub trait CameraCapturePort: Send + Sync {
    /// Check (or request) permission to use the camera
    ///
    /// Called once per session before the orientation feed starts.
    fn check_access(&self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Take one photo and report through `reply`
    ///
    /// `reply` must be called exactly once, from any thread. At most one
    /// call is outstanding: after a request times out, the next one is
    /// not made until the late reply has arrived.
    fn capture_one_photo(&self, reply: CaptureReply);
}
