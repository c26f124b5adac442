// SPDX-License-Identifier: GPL-3.0-only

//! Guided panoramic capture session
//!
//! Orientation samples drive a capture trigger; every shot passes a focus
//! gate with bounded retries; accepted frames are buffered in order and
//! handed to the stitcher once as a batch.
//!
//! ```text
//! OrientationSource ─▶ CaptureTrigger ─▶ Camera ─▶ FocusGate ─▶ SessionAccumulator ─▶ Stitcher
//!                           ▲                          │
//!                           └──────── retry ───────────┘
//! ```
//!
//! [`Orchestrator`] is the pure state machine; [`SessionRunner`] wires it
//! to real ports on a tokio runtime and reports through a
//! [`SessionObserver`].

pub mod accumulator;
pub mod events;
pub mod focus_gate;
pub mod observer;
pub mod orchestrator;
pub mod runner;
pub mod state;
pub mod trigger;

pub use accumulator::{SessionAccumulator, ShotCounter};
pub use events::{Effect, SessionEvent, SessionUpdate};
pub use focus_gate::{FocusGate, GateVerdict};
pub use observer::{ChannelObserver, SessionObserver, dispatch};
pub use orchestrator::Orchestrator;
pub use runner::{SessionHandle, SessionPorts, SessionRunner};
pub use state::{CapturePhase, CaptureSession, RequestId};
pub use trigger::{CaptureTrigger, TriggerDecision};
