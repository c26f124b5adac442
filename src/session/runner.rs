// SPDX-License-Identifier: GPL-3.0-only

//! Async driver for the orchestrator
//!
//! The runner owns the device ports and a single unbounded queue. Sensor
//! samples, camera replies, capture deadlines and stitch results all
//! arrive as messages on that queue and are applied one at a time, so the
//! orchestrator is only ever touched from the runner task.
//!
//! Callbacks hold weak senders. The runner stops on
//! [`SessionHandle::shutdown`] or once the last handle is dropped.

use super::events::{Effect, SessionEvent};
use super::observer::{SessionObserver, dispatch};
use super::orchestrator::Orchestrator;
use super::state::RequestId;
use crate::backends::{AttitudeSink, CameraCapturePort, CapturedFrame, OrientationSource, RawImage};
use crate::config::CaptureSettings;
use crate::errors::{AppError, AppResult, StitchError};
use crate::pipelines::{BlurDetector, Stitcher};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The external services a session talks to
pub struct SessionPorts {
    pub orientation: Box<dyn OrientationSource>,
    pub camera: Arc<dyn CameraCapturePort>,
    pub detector: Arc<dyn BlurDetector>,
    pub stitcher: Arc<dyn Stitcher>,
}

enum Command {
    Event(SessionEvent),
    Shutdown,
}

/// Control surface handed to the UI
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Begin a new guided capture; ignored while one is running
    pub fn start_session(&self) -> AppResult<()> {
        self.send(Command::Event(SessionEvent::Start))
    }

    /// Abandon the current session, dropping buffered frames
    ///
    /// Safe to call repeatedly.
    pub fn cancel_session(&self) -> AppResult<()> {
        self.send(Command::Event(SessionEvent::Cancel))
    }

    /// Cancel any session and stop the runner
    pub fn shutdown(&self) {
        // Already gone is fine
        let _ = self.tx.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> AppResult<()> {
        self.tx
            .send(command)
            .map_err(|_| AppError::Other("Session runner has stopped".into()))
    }
}

pub struct SessionRunner {
    orchestrator: Orchestrator,
    ports: SessionPorts,
    observer: Box<dyn SessionObserver>,
    capture_timeout: Option<Duration>,
    capture_timer: Option<JoinHandle<()>>,
    /// Only handles keep the queue open
    events: mpsc::WeakUnboundedSender<Command>,
    rx: mpsc::UnboundedReceiver<Command>,
}

/// Queue an event unless the runner is gone
fn post(events: &mpsc::WeakUnboundedSender<Command>, event: SessionEvent) {
    if let Some(tx) = events.upgrade() {
        let _ = tx.send(Command::Event(event));
    }
}

impl SessionRunner {
    /// Create a runner and the handle that controls it
    pub fn new(
        settings: CaptureSettings,
        ports: SessionPorts,
        observer: impl SessionObserver + 'static,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = tx.downgrade();
        let runner = Self {
            capture_timeout: settings.capture_timeout(),
            orchestrator: Orchestrator::new(settings),
            ports,
            observer: Box::new(observer),
            capture_timer: None,
            events,
            rx,
        };
        (runner, SessionHandle { tx })
    }

    /// Run on the current tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Process commands until shutdown or until every handle is gone
    pub async fn run(mut self) {
        info!("Session runner started");

        loop {
            match self.rx.recv().await {
                Some(Command::Event(event)) => self.process(event),
                Some(Command::Shutdown) => break,
                None => {
                    info!("All session handles dropped");
                    break;
                }
            }
        }

        self.process(SessionEvent::Cancel);
        self.disarm_timeout();
        if self.ports.orientation.is_running() {
            self.ports.orientation.stop();
        }
        info!("Session runner stopped");
    }

    fn process(&mut self, event: SessionEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for effect in self.orchestrator.handle(event) {
                if let Some(follow_up) = self.apply(effect) {
                    pending.push_back(follow_up);
                }
            }
        }

        if !self.orchestrator.is_capturing() {
            self.disarm_timeout();
        }
    }

    /// Perform one effect; synchronous outcomes come back as a follow-up event
    fn apply(&mut self, effect: Effect) -> Option<SessionEvent> {
        match effect {
            Effect::CheckPermission => Some(SessionEvent::PermissionResolved {
                epoch: self.orchestrator.epoch(),
                result: self.ports.camera.check_access(),
            }),
            Effect::StartFeed { epoch, period } => {
                let events = self.events.clone();
                let sink: AttitudeSink = Box::new(move |sample| {
                    post(&events, SessionEvent::Attitude { epoch, sample });
                });
                match self.ports.orientation.start(period, sink) {
                    Ok(()) => {
                        debug!(epoch, period_ms = period.as_millis() as u64, "Orientation feed started");
                        None
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to start orientation feed");
                        Some(SessionEvent::FeedUnavailable {
                            epoch,
                            reason: e.to_string(),
                        })
                    }
                }
            }
            Effect::StopFeed => {
                self.ports.orientation.stop();
                debug!("Orientation feed stopped");
                None
            }
            Effect::RequestCapture { request } => {
                self.request_capture(request);
                None
            }
            Effect::HoldCapture { request } => {
                debug!(%request, "Capture held until the camera answers");
                self.arm_timeout(request);
                None
            }
            Effect::SubmitBatch { epoch, frames } => {
                self.submit_batch(epoch, frames);
                None
            }
            Effect::Notify(update) => {
                dispatch(self.observer.as_mut(), update);
                None
            }
        }
    }

    fn request_capture(&mut self, request: RequestId) {
        let events = self.events.clone();
        let detector = Arc::clone(&self.ports.detector);
        let runtime = tokio::runtime::Handle::current();

        self.ports.camera.capture_one_photo(Box::new(move |result| match result {
            Ok(image) => {
                // Scoring is CPU-bound; keep it off the camera thread and the event loop
                runtime.spawn_blocking(move || {
                    let sharpness = detector.score(&image);
                    debug!(%request, sharpness, "Frame scored");
                    post(
                        &events,
                        SessionEvent::CaptureCompleted {
                            request,
                            result: Ok(CapturedFrame { image, sharpness }),
                        },
                    );
                });
            }
            Err(error) => post(
                &events,
                SessionEvent::CaptureCompleted {
                    request,
                    result: Err(error),
                },
            ),
        }));

        self.arm_timeout(request);
    }

    fn arm_timeout(&mut self, request: RequestId) {
        self.disarm_timeout();
        let Some(timeout) = self.capture_timeout else {
            return;
        };

        let events = self.events.clone();
        self.capture_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            warn!(%request, timeout_ms = timeout.as_millis() as u64, "Capture request timed out");
            post(&events, SessionEvent::CaptureTimedOut { request });
        }));
    }

    fn disarm_timeout(&mut self) {
        if let Some(timer) = self.capture_timer.take() {
            timer.abort();
        }
    }

    fn submit_batch(&self, epoch: u64, frames: Vec<RawImage>) {
        let events = self.events.clone();
        let stitcher = Arc::clone(&self.ports.stitcher);

        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || stitcher.stitch(frames))
                .await
                .unwrap_or_else(|e| {
                    Err(StitchError::StitchingFailed(format!("Stitch task error: {}", e)))
                });
            post(&events, SessionEvent::StitchFinished { epoch, result });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_reports_stopped_runner() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = SessionHandle { tx };
        assert!(handle.start_session().is_err());
        assert!(handle.cancel_session().is_err());
        handle.shutdown();
    }
}
