// SPDX-License-Identifier: GPL-3.0-only

//! Yaw arithmetic on the circle
//!
//! All angles are radians. Normalized angles live in the half-open
//! interval (−π, π], so +π is kept and −π folds onto it.

use std::f64::consts::{PI, TAU};

/// Map any finite angle into (−π, π].
///
/// Non-finite input is returned unchanged (there is no meaningful
/// representative for NaN or ±∞ on the circle).
pub fn normalize(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }

    // `rem_euclid` brings huge inputs into range in one step, so the
    // correction below runs at most once per direction.
    let mut normalized = angle.rem_euclid(TAU);
    if normalized > PI {
        normalized -= TAU;
    }
    if normalized <= -PI {
        normalized += TAU;
    }
    normalized
}

/// Signed shortest rotation from `a` to `b`, i.e. `normalize(b - a)`.
///
/// The magnitude never exceeds π. Positive values mean `b` lies
/// counter-clockwise of `a`.
pub fn difference(a: f64, b: f64) -> f64 {
    normalize(b - a)
}

/// Fraction of one step still separating `current` from `target`,
/// flipped so that 1.0 means "on target" and 0.0 means "a step or more away".
pub fn step_progress(current: f64, target: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return 0.0;
    }
    let delta = difference(current, target).abs();
    (1.0 - delta / step).clamp(0.0, 1.0)
}
