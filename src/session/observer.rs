// SPDX-License-Identifier: GPL-3.0-only

//! Session callbacks for the surrounding UI

use super::accumulator::ShotCounter;
use super::events::SessionUpdate;
use crate::backends::{PanoramaImage, RawImage};
use crate::errors::{FrameRejection, SessionFailure};
use tokio::sync::mpsc;

/// Receives session notifications
///
/// Called from the runner's event loop; implementations should return
/// quickly and hand heavy work elsewhere.
pub trait SessionObserver: Send {
    /// Closeness to the next target, 0..=1
    fn on_progress(&mut self, fraction: f64);

    fn on_frame_count_changed(&mut self, counter: ShotCounter);

    /// Exactly once per successful session
    fn on_complete(&mut self, panorama: PanoramaImage);

    /// Exactly once per failed session
    fn on_failed(&mut self, reason: SessionFailure);

    /// Latest accepted frame, for a ghost overlay of the previous shot
    fn on_frame_accepted(&mut self, _frame: &RawImage) {}

    fn on_frame_rejected(&mut self, _rejection: &FrameRejection, _retrying: bool) {}
}

/// Route one update to the matching callback
pub fn dispatch(observer: &mut dyn SessionObserver, update: SessionUpdate) {
    match update {
        SessionUpdate::Progress(fraction) => observer.on_progress(fraction),
        SessionUpdate::FrameCountChanged(counter) => observer.on_frame_count_changed(counter),
        SessionUpdate::FrameAccepted(frame) => observer.on_frame_accepted(&frame),
        SessionUpdate::FrameRejected {
            rejection,
            retrying,
        } => observer.on_frame_rejected(&rejection, retrying),
        SessionUpdate::Completed(panorama) => observer.on_complete(panorama),
        SessionUpdate::Failed(reason) => observer.on_failed(reason),
    }
}

/// Forwards every update into a channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionUpdate>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SessionUpdate>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, update: SessionUpdate) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(update);
    }
}

impl SessionObserver for ChannelObserver {
    fn on_progress(&mut self, fraction: f64) {
        self.forward(SessionUpdate::Progress(fraction));
    }

    fn on_frame_count_changed(&mut self, counter: ShotCounter) {
        self.forward(SessionUpdate::FrameCountChanged(counter));
    }

    fn on_complete(&mut self, panorama: PanoramaImage) {
        self.forward(SessionUpdate::Completed(panorama));
    }

    fn on_failed(&mut self, reason: SessionFailure) {
        self.forward(SessionUpdate::Failed(reason));
    }

    fn on_frame_accepted(&mut self, frame: &RawImage) {
        self.forward(SessionUpdate::FrameAccepted(frame.clone()));
    }

    fn on_frame_rejected(&mut self, rejection: &FrameRejection, retrying: bool) {
        self.forward(SessionUpdate::FrameRejected {
            rejection: rejection.clone(),
            retrying,
        });
    }
}
