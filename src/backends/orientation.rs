// SPDX-License-Identifier: GPL-3.0-only

//! Scripted orientation source
//!
//! Replays a yaw trajectory at the requested cadence. Used by the CLI
//! simulation and by tests in place of a real attitude sensor.

use super::sample_loop::{LoopAction, SampleLoopController, tick_offset};
use super::types::{AttitudeSample, BackendError, BackendResult};
use super::{AttitudeSink, OrientationSource};
use crate::angle;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Latest heading shared between a simulated sensor and a simulated camera
///
/// Lets the virtual camera render the view the rig is currently pointing
/// at, so that consecutive frames overlap the way real ones would.
#[derive(Debug, Clone, Default)]
pub struct SharedHeading(Arc<AtomicU64>);

impl SharedHeading {
    pub fn new(yaw: f64) -> Self {
        Self(Arc::new(AtomicU64::new(yaw.to_bits())))
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, yaw: f64) {
        self.0.store(yaw.to_bits(), Ordering::Release);
    }
}

/// Yaw trajectory replayed by [`ScriptedOrientation`]
#[derive(Debug, Clone)]
pub enum YawScript {
    /// Constant-rate rotation starting at `start` (radians, radians per second)
    Sweep { start: f64, rate: f64 },
    /// Fixed list of readings, one per tick; the feed goes quiet afterwards
    Samples(Arc<[f64]>),
}

impl YawScript {
    fn yaw_at(&self, index: u64, period: Duration) -> Option<f64> {
        match self {
            YawScript::Sweep { start, rate } => {
                let elapsed = period.as_secs_f64() * index as f64;
                Some(angle::normalize(start + rate * elapsed))
            }
            YawScript::Samples(samples) => samples.get(index as usize).copied(),
        }
    }
}

/// Orientation source backed by a [`YawScript`]
pub struct ScriptedOrientation {
    script: YawScript,
    heading: Option<SharedHeading>,
    controller: Option<SampleLoopController>,
}

impl ScriptedOrientation {
    pub fn new(script: YawScript) -> Self {
        Self {
            script,
            heading: None,
            controller: None,
        }
    }

    /// Rotate at a constant rate given in degrees per second
    pub fn sweep(start: f64, degrees_per_second: f64) -> Self {
        Self::new(YawScript::Sweep {
            start,
            rate: degrees_per_second.to_radians(),
        })
    }

    pub fn from_samples(samples: impl Into<Arc<[f64]>>) -> Self {
        Self::new(YawScript::Samples(samples.into()))
    }

    /// Publish every delivered yaw to `heading` as well
    pub fn with_heading(mut self, heading: SharedHeading) -> Self {
        self.heading = Some(heading);
        self
    }
}

impl OrientationSource for ScriptedOrientation {
    fn start(&mut self, period: Duration, sink: AttitudeSink) -> BackendResult<()> {
        if self.is_running() {
            return Err(BackendError::AlreadyRunning);
        }
        if period.is_zero() {
            return Err(BackendError::Other("sample period must be non-zero".into()));
        }

        let script = self.script.clone();
        let heading = self.heading.clone();
        info!(script = ?script, "Starting scripted orientation feed");

        let controller = SampleLoopController::start("orientation", period, move |index| {
            let Some(yaw) = script.yaw_at(index, period) else {
                debug!(samples = index, "Orientation script exhausted");
                return LoopAction::Stop;
            };
            if let Some(heading) = &heading {
                heading.set(yaw);
            }
            sink(AttitudeSample {
                yaw,
                timestamp: tick_offset(period, index),
            });
            LoopAction::Continue
        });

        self.controller = Some(controller);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop();
            info!("Scripted orientation feed stopped");
        }
    }

    fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .map(SampleLoopController::is_running)
            .unwrap_or(false)
    }
}

impl Drop for ScriptedOrientation {
    fn drop(&mut self) {
        self.stop();
    }
}
