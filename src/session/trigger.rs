// SPDX-License-Identifier: GPL-3.0-only

//! Angle-based capture trigger

use crate::angle;

/// Outcome of evaluating one attitude sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerDecision {
    /// Signed shortest rotation from the current yaw to the target
    pub delta: f64,
    /// Closeness to the target for display, 0..=1
    pub progress: f64,
    /// Issue a capture request now
    pub fire: bool,
}

/// Fires when the yaw enters a tolerance window around the target
///
/// Exact-angle matching is unreachable with noisy, discretely sampled
/// sensors; the window must be narrower than half a step so one sample
/// can only ever match a single target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureTrigger {
    step: f64,
    tolerance: f64,
}

impl CaptureTrigger {
    pub fn new(step: f64, tolerance: f64) -> Self {
        Self { step, tolerance }
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    /// Evaluate `yaw` against `target`
    ///
    /// `capturing` suppresses firing while a request is already in flight;
    /// progress is still computed.
    pub fn evaluate(&self, yaw: f64, target: f64, capturing: bool) -> TriggerDecision {
        let delta = angle::difference(yaw, target);
        TriggerDecision {
            delta,
            progress: angle::step_progress(yaw, target, self.step),
            fire: !capturing && delta.abs() < self.tolerance,
        }
    }
}
