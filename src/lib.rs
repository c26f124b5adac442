// SPDX-License-Identifier: GPL-3.0-only

//! Pano Capture - guided panoramic capture
//!
//! This library turns a stream of device-orientation samples into a full
//! turn of sharply focused photos and hands them to a stitcher in one
//! batch.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`angle`]: Yaw normalization and shortest-difference arithmetic
//! - [`backends`]: Orientation and camera ports plus simulated adapters
//! - [`pipelines`]: Sharpness scoring, stitching and panorama encoding
//! - [`session`]: Capture state machine and its async runner
//! - [`config`]: User configuration handling
//! - [`storage`]: Output directory and panorama saving
//!
//! # Example
//!
//! ```ignore
//! let (observer, mut updates) = ChannelObserver::channel();
//! let (runner, handle) = SessionRunner::new(config.capture.clone(), ports, observer);
//! let task = runner.spawn();
//! handle.start_session()?;
//! ```

pub mod angle;
pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipelines;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use backends::{CameraCapturePort, OrientationSource, PanoramaImage, RawImage};
pub use config::{CaptureSettings, Config, StitcherSettings};
pub use errors::{AppError, AppResult, CaptureError, SessionFailure, StitchError};
pub use pipelines::{BlurDetector, Stitcher};
pub use session::{
    ChannelObserver, SessionHandle, SessionObserver, SessionPorts, SessionRunner, SessionUpdate,
};
