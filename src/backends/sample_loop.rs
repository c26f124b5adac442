// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-cadence sampling thread
//!
//! Runs a tick closure on a dedicated thread at a fixed period until the
//! closure asks to stop or the controller is stopped. Once `stop()` has
//! returned the closure is guaranteed not to run again, which is what
//! sensor adapters rely on to honour "no samples after stop".

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the tick closure to control the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Keep sampling
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Time from the first tick to tick `index`
///
/// Exact for any tick count; saturates instead of wrapping.
pub fn tick_offset(period: Duration, index: u64) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let nanos = period.as_nanos().saturating_mul(index as u128);
    let secs = u64::try_from(nanos / NANOS_PER_SEC).unwrap_or(u64::MAX);
    Duration::new(secs, (nanos % NANOS_PER_SEC) as u32)
}

/// Controller for a sampling loop running on its own thread
pub struct SampleLoopController {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl SampleLoopController {
    /// Start ticking every `period`
    ///
    /// The closure receives the zero-based tick index. Ticks are scheduled
    /// against the start time, so a slow tick does not push every later
    /// sample back.
    pub fn start<F>(name: &str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut(u64) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop_signal);
        let thread_name = name.to_string();

        info!(name = %name, period_ms = period.as_millis() as u64, "Starting sample loop");

        let thread_handle = thread::spawn(move || {
            let started = Instant::now();
            let mut index: u64 = 0;

            loop {
                if thread_stop.load(Ordering::SeqCst) {
                    debug!(name = %thread_name, "Stop signal received");
                    break;
                }

                if tick(index) == LoopAction::Stop {
                    debug!(name = %thread_name, ticks = index + 1, "Loop requested stop");
                    break;
                }
                index += 1;

                let due = started + tick_offset(period, index);
                // Sleep in short slices so stop() does not wait a whole period
                while !thread_stop.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now >= due {
                        break;
                    }
                    thread::sleep((due - now).min(Duration::from_millis(10)));
                }
            }

            info!(name = %thread_name, "Sample loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop thread is still alive
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop without waiting
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting sample loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Sample loop thread panicked: {:?}", e);
            } else {
                debug!(name = %self.name, "Sample loop thread finished");
            }
        }
    }
}

impl Drop for SampleLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "SampleLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_loop_stops_itself() {
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let mut controller =
            SampleLoopController::start("test-loop", Duration::from_millis(1), move |index| {
                ticks_clone.store(index + 1, Ordering::SeqCst);
                if index >= 4 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            });

        controller.join();
        assert_eq!(ticks.load(Ordering::SeqCst), 5);
        assert!(!controller.is_running());
    }

    #[test]
    fn test_no_ticks_after_stop() {
        let ticks = Arc::new(AtomicU64::new(0));
        let ticks_clone = Arc::clone(&ticks);

        let mut controller =
            SampleLoopController::start("test-loop", Duration::from_millis(5), move |_| {
                ticks_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            });

        thread::sleep(Duration::from_millis(30));
        controller.stop();
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_tick_offset_past_u32_ticks() {
        let period = Duration::from_millis(50);
        let index = u32::MAX as u64 + 1;
        assert_eq!(tick_offset(period, index), Duration::from_millis(50 * index));
        assert!(tick_offset(period, index) > tick_offset(period, index - 1));
        assert_eq!(tick_offset(period, 0), Duration::ZERO);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut controller =
            SampleLoopController::start("test-loop", Duration::from_millis(5), |_| {
                LoopAction::Continue
            });
        controller.stop();
        controller.stop();
        assert!(!controller.is_running());
    }
}
