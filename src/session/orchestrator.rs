// SPDX-License-Identifier: GPL-3.0-only

//! Guided capture state machine
//!
//! [`Orchestrator::handle`] consumes one [`SessionEvent`] and returns the
//! [`Effect`]s the caller must perform. It does no I/O and owns all session
//! state, so every transition can be driven and checked synchronously.
//!
//! ```text
//!  Start ──▶ AwaitingPermission ──▶ Idle ──first sample──▶ Tracking
//!                                                         │      ▲
//!                                          yaw in window  ▼      │ accept / discard
//!                                                      Requesting ◀─┐
//!                                                         │  └──────┘ retry
//!                                            batch full   ▼
//!                                                      Stitching ──▶ Complete | Failed
//! ```

use super::events::{Effect, SessionEvent, SessionUpdate};
use super::focus_gate::{FocusGate, GateVerdict};
use super::state::{CapturePhase, CaptureSession, RequestId};
use super::trigger::CaptureTrigger;
use crate::backends::{AttitudeSample, CapturedFrame, PanoramaImage};
use crate::config::{CaptureSettings, ExhaustedRetryPolicy};
use crate::constants::capture::MIN_STITCH_FRAMES;
use crate::errors::{CaptureError, FrameRejection, SessionFailure, StitchError};
use tracing::{debug, info, trace, warn};

/// Progress changes smaller than this are not reported
const PROGRESS_EPSILON: f64 = 1e-3;

pub struct Orchestrator {
    settings: CaptureSettings,
    trigger: CaptureTrigger,
    gate: FocusGate,
    phase: CapturePhase,
    session: CaptureSession,
    epoch: u64,
    next_request: u64,
    feed_active: bool,
    /// Request the camera has not answered yet, even if it timed out
    camera_busy: Option<RequestId>,
    /// Current request, waiting for the camera to free up
    held: Option<RequestId>,
}

impl Orchestrator {
    pub fn new(settings: CaptureSettings) -> Self {
        let trigger = CaptureTrigger::new(settings.target_step, settings.capture_tolerance);
        let gate = FocusGate::new(settings.sharpness_threshold, settings.max_retries);
        let session = CaptureSession::new(0, settings.expected_shots);
        Self {
            settings,
            trigger,
            gate,
            phase: CapturePhase::Inactive,
            session,
            epoch: 0,
            next_request: 0,
            feed_active: false,
            camera_busy: None,
            held: None,
        }
    }

    pub fn phase(&self) -> CapturePhase {
        self.phase
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Generation of the current session; bumped on every start
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    pub fn is_capturing(&self) -> bool {
        self.phase.is_capturing()
    }

    /// Process one event to completion
    pub fn handle(&mut self, event: SessionEvent) -> Vec<Effect> {
        trace!(event = event.kind(), phase = self.phase.name(), "Handling session event");

        let mut effects = Vec::new();
        match event {
            SessionEvent::Start => self.on_start(&mut effects),
            SessionEvent::Cancel => self.on_cancel(&mut effects),
            SessionEvent::PermissionResolved { epoch, result } => {
                self.on_permission(epoch, result, &mut effects)
            }
            SessionEvent::Attitude { epoch, sample } => {
                self.on_attitude(epoch, sample, &mut effects)
            }
            SessionEvent::FeedUnavailable { epoch, reason } => {
                self.on_feed_unavailable(epoch, reason, &mut effects)
            }
            SessionEvent::CaptureCompleted { request, result } => {
                if self.camera_busy == Some(request) {
                    self.camera_busy = None;
                }
                self.on_capture(request, result, &mut effects);
                self.release_held(&mut effects);
            }
            SessionEvent::CaptureTimedOut { request } => {
                if self.held == Some(request) {
                    self.held = None;
                }
                self.on_capture(request, Err(CaptureError::TimedOut), &mut effects)
            }
            SessionEvent::StitchFinished { epoch, result } => {
                self.on_stitch(epoch, result, &mut effects)
            }
        }
        effects
    }

    fn on_start(&mut self, effects: &mut Vec<Effect>) {
        if self.phase.is_active() {
            warn!(
                session = %self.session.id,
                phase = self.phase.name(),
                "Session already running, ignoring start"
            );
            return;
        }

        self.epoch += 1;
        self.session = CaptureSession::new(self.epoch, self.settings.expected_shots);
        self.phase = CapturePhase::AwaitingPermission;

        info!(
            session = %self.session.id,
            epoch = self.epoch,
            shots = self.settings.expected_shots,
            step = self.settings.target_step,
            "Starting guided capture"
        );
        effects.push(Effect::CheckPermission);
    }

    fn on_cancel(&mut self, effects: &mut Vec<Effect>) {
        if !self.phase.is_active() {
            debug!(phase = self.phase.name(), "No session to cancel");
            return;
        }

        info!(
            session = %self.session.id,
            phase = self.phase.name(),
            buffered = self.session.accumulator.len(),
            "Cancelling guided capture"
        );
        self.stop_feed(effects);
        self.session.reset();
        self.held = None;
        self.phase = CapturePhase::Inactive;
    }

    /// Any failed access check counts as a refusal
    fn on_permission(
        &mut self,
        epoch: u64,
        result: Result<(), CaptureError>,
        effects: &mut Vec<Effect>,
    ) {
        if epoch != self.epoch || self.phase != CapturePhase::AwaitingPermission {
            debug!(epoch, "Ignoring stale permission result");
            return;
        }

        match result {
            Ok(()) => {
                debug!(session = %self.session.id, "Camera access granted");
                self.phase = CapturePhase::Idle;
                self.feed_active = true;
                effects.push(Effect::StartFeed {
                    epoch,
                    period: self.settings.sample_period(),
                });
                effects.push(Effect::Notify(SessionUpdate::FrameCountChanged(
                    self.session.accumulator.counter(),
                )));
            }
            Err(error) => {
                warn!(session = %self.session.id, %error, "Camera access refused");
                self.fail(SessionFailure::PermissionDenied, effects);
            }
        }
    }

    fn on_feed_unavailable(&mut self, epoch: u64, reason: String, effects: &mut Vec<Effect>) {
        if epoch != self.epoch || !self.phase.is_active() {
            return;
        }
        warn!(session = %self.session.id, %reason, "Orientation feed unavailable");
        self.feed_active = false;
        self.fail(SessionFailure::OrientationUnavailable(reason), effects);
    }

    fn on_attitude(&mut self, epoch: u64, sample: AttitudeSample, effects: &mut Vec<Effect>) {
        if epoch != self.epoch {
            trace!(epoch, current = self.epoch, "Dropping sample from an earlier session");
            return;
        }
        if !sample.yaw.is_finite() {
            warn!(yaw = sample.yaw, "Dropping non-finite attitude sample");
            return;
        }

        match self.phase {
            CapturePhase::Idle => {
                self.session.anchor(sample.yaw, self.settings.target_step);
                self.phase = CapturePhase::Tracking;
                info!(
                    session = %self.session.id,
                    reference = self.session.reference_yaw,
                    target = self.session.next_target_angle,
                    "Reference yaw set"
                );
            }
            CapturePhase::Tracking | CapturePhase::Requesting { .. } => {}
            _ => {
                trace!(phase = self.phase.name(), "Sample outside tracking");
                return;
            }
        }

        let decision = self.trigger.evaluate(
            sample.yaw,
            self.session.next_target_angle,
            self.phase.is_capturing(),
        );
        self.report_progress(decision.progress, effects);

        if decision.fire {
            debug!(
                yaw = sample.yaw,
                target = self.session.next_target_angle,
                delta = decision.delta,
                "Target reached"
            );
            self.issue_request(effects);
        }
    }

    fn on_capture(
        &mut self,
        request: RequestId,
        result: Result<CapturedFrame, CaptureError>,
        effects: &mut Vec<Effect>,
    ) {
        let CapturePhase::Requesting {
            request: in_flight, ..
        } = self.phase
        else {
            debug!(%request, phase = self.phase.name(), "Ignoring capture result outside a request");
            return;
        };
        if in_flight != request {
            debug!(%request, %in_flight, "Ignoring superseded capture result");
            return;
        }

        let retries = self.session.retry_count;
        let (verdict, frame) = match result {
            Ok(frame) => (self.gate.check_frame(frame.sharpness, retries), Some(frame)),
            Err(CaptureError::PermissionDenied) => {
                warn!(session = %self.session.id, "Camera access revoked during capture");
                self.fail(SessionFailure::PermissionDenied, effects);
                return;
            }
            Err(error) => (self.gate.check_error(error, retries), None),
        };

        match verdict {
            GateVerdict::Accept => {
                if let Some(frame) = frame {
                    self.accept(frame, effects);
                }
            }
            GateVerdict::Retry(rejection) => self.retry(rejection, effects),
            GateVerdict::Discard(rejection) => self.discard(rejection, effects),
        }
    }

    fn on_stitch(
        &mut self,
        epoch: u64,
        result: Result<PanoramaImage, StitchError>,
        effects: &mut Vec<Effect>,
    ) {
        if epoch != self.epoch || self.phase != CapturePhase::Stitching {
            debug!(epoch, "Ignoring stitch result for an abandoned batch");
            return;
        }

        match result {
            Ok(panorama) => {
                info!(
                    session = %self.session.id,
                    width = panorama.width(),
                    height = panorama.height(),
                    frames = panorama.frame_count,
                    "Panorama complete"
                );
                self.phase = CapturePhase::Complete;
                effects.push(Effect::Notify(SessionUpdate::Completed(panorama)));
            }
            Err(error) => {
                warn!(session = %self.session.id, %error, "Stitching failed");
                self.fail(SessionFailure::StitchFailed(error), effects);
            }
        }
    }

    fn accept(&mut self, frame: CapturedFrame, effects: &mut Vec<Effect>) {
        self.session.retry_count = 0;
        self.session.accumulator.push(frame.image.clone());
        let counter = self.session.accumulator.counter();

        info!(
            session = %self.session.id,
            shots = %counter,
            sharpness = frame.sharpness,
            target = self.session.next_target_angle,
            "Frame accepted"
        );
        effects.push(Effect::Notify(SessionUpdate::FrameAccepted(frame.image)));
        effects.push(Effect::Notify(SessionUpdate::FrameCountChanged(counter)));

        self.session.advance_target(self.settings.target_step);
        self.settle_target(effects);
    }

    /// Capture again at the same target without waiting for another sample
    fn retry(&mut self, rejection: FrameRejection, effects: &mut Vec<Effect>) {
        self.session.retry_count += 1;
        info!(
            session = %self.session.id,
            attempt = self.session.retry_count,
            max = self.gate.max_retries(),
            reason = %rejection,
            "Retrying capture"
        );
        effects.push(Effect::Notify(SessionUpdate::FrameRejected {
            rejection,
            retrying: true,
        }));
        self.issue_request(effects);
    }

    fn discard(&mut self, rejection: FrameRejection, effects: &mut Vec<Effect>) {
        self.session.retry_count = 0;
        self.session.discarded += 1;
        warn!(
            session = %self.session.id,
            target = self.session.next_target_angle,
            reason = %rejection,
            policy = ?self.settings.exhausted_retry_policy,
            "Retries exhausted, discarding frame"
        );
        effects.push(Effect::Notify(SessionUpdate::FrameRejected {
            rejection,
            retrying: false,
        }));

        match self.settings.exhausted_retry_policy {
            ExhaustedRetryPolicy::HoldTarget => {
                self.phase = CapturePhase::Tracking;
            }
            ExhaustedRetryPolicy::SkipTarget => {
                self.session.advance_target(self.settings.target_step);
                self.session.accumulator.reduce_target();
                let counter = self.session.accumulator.counter();
                effects.push(Effect::Notify(SessionUpdate::FrameCountChanged(counter)));

                if counter.expected < MIN_STITCH_FRAMES {
                    self.fail(
                        SessionFailure::InsufficientFrames {
                            accepted: counter.accepted,
                            required: MIN_STITCH_FRAMES,
                        },
                        effects,
                    );
                    return;
                }
                self.settle_target(effects);
            }
        }
    }

    /// Back to tracking, or hand off once the batch is complete
    fn settle_target(&mut self, effects: &mut Vec<Effect>) {
        if self.session.accumulator.is_full() {
            self.hand_off(effects);
        } else {
            self.phase = CapturePhase::Tracking;
        }
    }

    fn hand_off(&mut self, effects: &mut Vec<Effect>) {
        let frames = self.session.accumulator.take_batch();
        info!(
            session = %self.session.id,
            frames = frames.len(),
            discarded = self.session.discarded,
            "Handing batch to stitcher"
        );
        self.stop_feed(effects);
        self.phase = CapturePhase::Stitching;
        effects.push(Effect::SubmitBatch {
            epoch: self.epoch,
            frames,
        });
    }

    fn issue_request(&mut self, effects: &mut Vec<Effect>) {
        let request = RequestId(self.next_request);
        self.next_request += 1;
        self.phase = CapturePhase::Requesting {
            request,
            attempt: self.session.retry_count,
        };

        // One camera call at a time, even across a timeout
        if let Some(busy) = self.camera_busy {
            debug!(%request, %busy, "Camera still owes a reply, holding request");
            self.held = Some(request);
            effects.push(Effect::HoldCapture { request });
        } else {
            self.dispatch(request, effects);
        }
    }

    fn dispatch(&mut self, request: RequestId, effects: &mut Vec<Effect>) {
        debug!(%request, attempt = self.session.retry_count, "Requesting capture");
        self.camera_busy = Some(request);
        effects.push(Effect::RequestCapture { request });
    }

    /// Send the held request once the camera has answered the one before it
    fn release_held(&mut self, effects: &mut Vec<Effect>) {
        if self.camera_busy.is_some() {
            return;
        }
        let Some(request) = self.held.take() else {
            return;
        };
        if matches!(self.phase, CapturePhase::Requesting { request: current, .. } if current == request)
        {
            self.dispatch(request, effects);
        }
    }

    fn report_progress(&mut self, progress: f64, effects: &mut Vec<Effect>) {
        let changed = self
            .session
            .last_progress
            .is_none_or(|last| (last - progress).abs() >= PROGRESS_EPSILON);
        if changed {
            self.session.last_progress = Some(progress);
            effects.push(Effect::Notify(SessionUpdate::Progress(progress)));
        }
    }

    fn stop_feed(&mut self, effects: &mut Vec<Effect>) {
        if self.feed_active {
            self.feed_active = false;
            effects.push(Effect::StopFeed);
        }
    }

    fn fail(&mut self, reason: SessionFailure, effects: &mut Vec<Effect>) {
        self.stop_feed(effects);
        self.session.reset();
        self.held = None;
        self.phase = CapturePhase::Failed;
        effects.push(Effect::Notify(SessionUpdate::Failed(reason)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle;
    use crate::backends::RawImage;
    use image::RgbaImage;
    use std::f64::consts::PI;

    const SHARP: f64 = 500.0;
    const BLURRY: f64 = 5.0;

    fn frame(sharpness: f64, tag: u32) -> CapturedFrame {
        CapturedFrame {
            image: RawImage::from_rgba(RgbaImage::new(tag.max(1), 1)),
            sharpness,
        }
    }

    fn started(settings: CaptureSettings) -> Orchestrator {
        let mut orchestrator = Orchestrator::new(settings);
        let effects = orchestrator.handle(SessionEvent::Start);
        assert!(matches!(effects.as_slice(), [Effect::CheckPermission]));
        let epoch = orchestrator.epoch();
        orchestrator.handle(SessionEvent::PermissionResolved {
            epoch,
            result: Ok(()),
        });
        orchestrator
    }

    fn sample(orchestrator: &mut Orchestrator, yaw: f64) -> Vec<Effect> {
        let epoch = orchestrator.epoch();
        orchestrator.handle(SessionEvent::Attitude {
            epoch,
            sample: AttitudeSample::new(yaw),
        })
    }

    fn complete(orchestrator: &mut Orchestrator, request: RequestId, sharpness: f64) -> Vec<Effect> {
        orchestrator.handle(SessionEvent::CaptureCompleted {
            request,
            result: Ok(frame(sharpness, 1)),
        })
    }

    fn requested(effects: &[Effect]) -> Option<RequestId> {
        effects.iter().find_map(|e| match e {
            Effect::RequestCapture { request } => Some(*request),
            _ => None,
        })
    }

    fn held(effects: &[Effect]) -> Option<RequestId> {
        effects.iter().find_map(|e| match e {
            Effect::HoldCapture { request } => Some(*request),
            _ => None,
        })
    }

    fn submitted(effects: Vec<Effect>) -> Option<Vec<RawImage>> {
        effects.into_iter().find_map(|e| match e {
            Effect::SubmitBatch { frames, .. } => Some(frames),
            _ => None,
        })
    }

    fn failures(effects: &[Effect]) -> Vec<SessionFailure> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Notify(SessionUpdate::Failed(reason)) => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    fn stop_count(effects: &[Effect]) -> usize {
        effects
            .iter()
            .filter(|e| matches!(e, Effect::StopFeed))
            .count()
    }

    /// Drive every target with sharp frames until the batch is submitted
    fn capture_all(orchestrator: &mut Orchestrator) -> Vec<RawImage> {
        sample(orchestrator, 0.0);
        let mut tag = 1;
        loop {
            let target = orchestrator.session().next_target_angle;
            let request = requested(&sample(orchestrator, target)).unwrap();
            let effects = orchestrator.handle(SessionEvent::CaptureCompleted {
                request,
                result: Ok(frame(SHARP, tag)),
            });
            tag += 1;
            if let Some(frames) = submitted(effects) {
                return frames;
            }
        }
    }

    #[test]
    fn test_permission_starts_feed() {
        let mut orchestrator = Orchestrator::new(CaptureSettings::default());
        orchestrator.handle(SessionEvent::Start);
        let effects = orchestrator.handle(SessionEvent::PermissionResolved {
            epoch: 1,
            result: Ok(()),
        });
        assert!(matches!(effects[0], Effect::StartFeed { epoch: 1, .. }));
        assert_eq!(orchestrator.phase(), CapturePhase::Idle);
    }

    #[test]
    fn test_first_sample_sets_reference() {
        let mut orchestrator = started(CaptureSettings::default());
        assert_eq!(orchestrator.session().reference_yaw, None);

        let effects = sample(&mut orchestrator, 0.4);
        assert_eq!(orchestrator.session().reference_yaw, Some(0.4));
        assert!((orchestrator.session().next_target_angle - (0.4 + PI / 12.0)).abs() < 1e-12);
        assert_eq!(orchestrator.phase(), CapturePhase::Tracking);
        assert!(requested(&effects).is_none());
    }

    #[test]
    fn test_targets_close_the_loop() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);

        let mut batch = None;
        for k in 1..=24u32 {
            let target = orchestrator.session().next_target_angle;
            assert!(
                angle::difference(k as f64 * step, target).abs() < 1e-9,
                "target {} is {}",
                k,
                target
            );
            if k == 24 {
                // 24 steps of 15° land back on the reference
                assert!(angle::difference(0.0, target).abs() < 1e-9);
            }
            let request = requested(&sample(&mut orchestrator, target)).unwrap();
            let effects = orchestrator.handle(SessionEvent::CaptureCompleted {
                request,
                result: Ok(frame(SHARP, k)),
            });
            if let Some(frames) = submitted(effects) {
                assert_eq!(k, 24, "batch submitted early");
                batch = Some(frames);
            }
        }

        let batch = batch.unwrap();
        let order: Vec<u32> = batch.iter().map(|f| f.width).collect();
        assert_eq!(order, (1..=24).collect::<Vec<_>>());
        assert_eq!(orchestrator.phase(), CapturePhase::Stitching);
        assert!(orchestrator.session().accumulator.is_empty());
    }

    #[test]
    fn test_three_blurry_frames_discard_once() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);

        let mut request = requested(&sample(&mut orchestrator, step)).unwrap();
        let mut issued = 1;
        let mut discards = 0;
        for _ in 0..3 {
            let effects = complete(&mut orchestrator, request, BLURRY);
            discards += effects
                .iter()
                .filter(|e| {
                    matches!(
                        e,
                        Effect::Notify(SessionUpdate::FrameRejected {
                            retrying: false,
                            ..
                        })
                    )
                })
                .count();
            if let Some(next) = requested(&effects) {
                request = next;
                issued += 1;
            }
        }

        // One first request plus two retries
        assert_eq!(issued, 3);
        assert_eq!(discards, 1);
        assert_eq!(orchestrator.session().retry_count, 0);
        assert_eq!(orchestrator.session().discarded, 1);
        assert!((orchestrator.session().next_target_angle - 2.0 * step).abs() < 1e-12);
        assert_eq!(orchestrator.phase(), CapturePhase::Tracking);
        assert_eq!(orchestrator.session().accumulator.counter().expected, 23);
    }

    #[test]
    fn test_retry_reuses_target() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let request = requested(&sample(&mut orchestrator, step)).unwrap();

        let effects = complete(&mut orchestrator, request, BLURRY);
        let retry = requested(&effects).unwrap();
        assert_ne!(retry, request);
        assert_eq!(orchestrator.session().retry_count, 1);
        assert!((orchestrator.session().next_target_angle - step).abs() < 1e-12);

        complete(&mut orchestrator, retry, SHARP);
        assert_eq!(orchestrator.session().retry_count, 0);
        assert_eq!(orchestrator.session().accumulator.len(), 1);
    }

    #[test]
    fn test_no_second_request_while_capturing() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let request = requested(&sample(&mut orchestrator, step)).unwrap();
        assert!(orchestrator.is_capturing());

        for jitter in [-0.01, 0.0, 0.01, 0.02] {
            let effects = sample(&mut orchestrator, step + jitter);
            assert!(requested(&effects).is_none());
        }
        assert_eq!(
            orchestrator.phase(),
            CapturePhase::Requesting {
                request,
                attempt: 0
            }
        );
    }

    #[test]
    fn test_progress_is_reported() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let effects = sample(&mut orchestrator, step / 2.0);
        let progress = effects.iter().find_map(|e| match e {
            Effect::Notify(SessionUpdate::Progress(p)) => Some(*p),
            _ => None,
        });
        assert!((progress.unwrap() - 0.5).abs() < 1e-9);

        // Unchanged progress is not repeated
        let effects = sample(&mut orchestrator, step / 2.0);
        assert!(effects.is_empty());
    }

    #[test]
    fn test_stitch_failure_resets_session() {
        let mut orchestrator = started(CaptureSettings::for_shot_count(4));
        let frames = capture_all(&mut orchestrator);
        assert_eq!(frames.len(), 4);

        let epoch = orchestrator.epoch();
        let effects = orchestrator.handle(SessionEvent::StitchFinished {
            epoch,
            result: Err(StitchError::StitchingFailed("no overlap".into())),
        });

        let failed = failures(&effects);
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0], SessionFailure::StitchFailed(_)));
        // Feed was already stopped at hand-off
        assert_eq!(stop_count(&effects), 0);
        assert_eq!(orchestrator.phase(), CapturePhase::Failed);
        assert!(orchestrator.session().accumulator.is_empty());

        // No implicit restart
        assert!(sample(&mut orchestrator, 0.0).is_empty());

        orchestrator.handle(SessionEvent::Start);
        assert_eq!(orchestrator.session().reference_yaw, None);
        assert_eq!(orchestrator.phase(), CapturePhase::AwaitingPermission);
    }

    #[test]
    fn test_stitch_success_completes() {
        let mut orchestrator = started(CaptureSettings::for_shot_count(3));
        let frames = capture_all(&mut orchestrator);
        let epoch = orchestrator.epoch();
        let effects = orchestrator.handle(SessionEvent::StitchFinished {
            epoch,
            result: Ok(PanoramaImage {
                image: RgbaImage::new(4, 1),
                frame_count: frames.len(),
            }),
        });
        assert!(matches!(
            effects.as_slice(),
            [Effect::Notify(SessionUpdate::Completed(_))]
        ));
        assert_eq!(orchestrator.phase(), CapturePhase::Complete);
    }

    #[test]
    fn test_hand_off_stops_feed_once() {
        let mut orchestrator = started(CaptureSettings::for_shot_count(2));
        sample(&mut orchestrator, 0.0);
        let first = requested(&sample(&mut orchestrator, PI)).unwrap();
        complete(&mut orchestrator, first, SHARP);
        let target = orchestrator.session().next_target_angle;
        let second = requested(&sample(&mut orchestrator, target)).unwrap();
        let effects = complete(&mut orchestrator, second, SHARP);

        assert_eq!(stop_count(&effects), 1);
        assert_eq!(submitted(effects).map(|f| f.len()), Some(2));
    }

    #[test]
    fn test_cancel_twice_stops_once() {
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        orchestrator.session.accumulator.push(frame(SHARP, 1).image);

        let first = orchestrator.handle(SessionEvent::Cancel);
        let second = orchestrator.handle(SessionEvent::Cancel);

        assert_eq!(stop_count(&first), 1);
        assert!(second.is_empty());
        assert_eq!(orchestrator.phase(), CapturePhase::Inactive);
        assert!(orchestrator.session().accumulator.is_empty());
    }

    #[test]
    fn test_stale_capture_after_restart_is_ignored() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let old = requested(&sample(&mut orchestrator, step)).unwrap();

        orchestrator.handle(SessionEvent::Cancel);
        orchestrator.handle(SessionEvent::Start);
        let epoch = orchestrator.epoch();
        orchestrator.handle(SessionEvent::PermissionResolved {
            epoch,
            result: Ok(()),
        });
        sample(&mut orchestrator, 0.0);
        // The camera has not answered the abandoned request yet
        let current = held(&sample(&mut orchestrator, step)).unwrap();

        let effects = complete(&mut orchestrator, old, SHARP);
        assert_eq!(requested(&effects), Some(current));
        assert!(orchestrator.session().accumulator.is_empty());
    }

    #[test]
    fn test_sample_from_old_epoch_is_ignored() {
        let mut orchestrator = started(CaptureSettings::default());
        let effects = orchestrator.handle(SessionEvent::Attitude {
            epoch: orchestrator.epoch() + 7,
            sample: AttitudeSample::new(0.3),
        });
        assert!(effects.is_empty());
        assert_eq!(orchestrator.session().reference_yaw, None);
    }

    #[test]
    fn test_timeout_counts_as_failed_capture() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let request = requested(&sample(&mut orchestrator, step)).unwrap();

        let effects = orchestrator.handle(SessionEvent::CaptureTimedOut { request });
        assert_eq!(orchestrator.session().retry_count, 1);
        // The camera still holds the first call, so the retry waits
        let retry = held(&effects).unwrap();
        assert!(requested(&effects).is_none());
        assert!(orchestrator.is_capturing());

        // The late answer is dropped and frees the camera for the retry
        let effects = complete(&mut orchestrator, request, SHARP);
        assert_eq!(requested(&effects), Some(retry));
        assert_eq!(orchestrator.session().accumulator.len(), 0);

        complete(&mut orchestrator, retry, SHARP);
        assert_eq!(orchestrator.session().accumulator.len(), 1);
    }

    #[test]
    fn test_wedged_camera_gets_one_call() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let mut request = requested(&sample(&mut orchestrator, step)).unwrap();
        let mut calls = 1;

        // Every attempt at this target times out; none reaches the camera
        for _ in 0..=2 {
            let effects = orchestrator.handle(SessionEvent::CaptureTimedOut { request });
            calls += effects
                .iter()
                .filter(|e| matches!(e, Effect::RequestCapture { .. }))
                .count();
            if let Some(next) = held(&effects) {
                request = next;
            }
        }
        assert_eq!(calls, 1);
        assert_eq!(orchestrator.session().accumulator.target(), 23);
        assert_eq!(orchestrator.phase(), CapturePhase::Tracking);

        // The next target is held too until the camera answers
        let effects = sample(&mut orchestrator, 2.0 * step);
        assert!(requested(&effects).is_none());
        assert!(held(&effects).is_some());
    }

    #[test]
    fn test_capture_errors_exhaust_retries() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let mut request = requested(&sample(&mut orchestrator, step)).unwrap();

        for _ in 0..2 {
            let effects = orchestrator.handle(SessionEvent::CaptureCompleted {
                request,
                result: Err(CaptureError::DeviceBusy),
            });
            request = requested(&effects).unwrap();
        }
        let effects = orchestrator.handle(SessionEvent::CaptureCompleted {
            request,
            result: Err(CaptureError::Hardware("sensor".into())),
        });

        assert!(requested(&effects).is_none());
        assert!(!orchestrator.is_capturing());
        assert!((orchestrator.session().next_target_angle - 2.0 * step).abs() < 1e-12);
    }

    #[test]
    fn test_permission_denied_is_fatal() {
        let mut orchestrator = Orchestrator::new(CaptureSettings::default());
        orchestrator.handle(SessionEvent::Start);
        let effects = orchestrator.handle(SessionEvent::PermissionResolved {
            epoch: 1,
            result: Err(CaptureError::PermissionDenied),
        });

        assert_eq!(failures(&effects), vec![SessionFailure::PermissionDenied]);
        assert!(!effects.iter().any(|e| matches!(e, Effect::StartFeed { .. })));
        assert_eq!(orchestrator.phase(), CapturePhase::Failed);
    }

    #[test]
    fn test_permission_revoked_mid_capture() {
        let step = PI / 12.0;
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.0);
        let request = requested(&sample(&mut orchestrator, step)).unwrap();

        let effects = orchestrator.handle(SessionEvent::CaptureCompleted {
            request,
            result: Err(CaptureError::PermissionDenied),
        });
        assert_eq!(failures(&effects), vec![SessionFailure::PermissionDenied]);
        assert_eq!(stop_count(&effects), 1);
        assert!(requested(&effects).is_none());
    }

    #[test]
    fn test_hold_target_policy_keeps_target() {
        let step = PI / 12.0;
        let settings = CaptureSettings {
            max_retries: 0,
            exhausted_retry_policy: ExhaustedRetryPolicy::HoldTarget,
            ..CaptureSettings::default()
        };
        let mut orchestrator = started(settings);
        sample(&mut orchestrator, 0.0);
        let request = requested(&sample(&mut orchestrator, step)).unwrap();

        complete(&mut orchestrator, request, BLURRY);
        assert!((orchestrator.session().next_target_angle - step).abs() < 1e-12);
        assert_eq!(orchestrator.session().accumulator.counter().expected, 24);
        assert_eq!(orchestrator.phase(), CapturePhase::Tracking);

        // Coming back into the window triggers again
        assert!(requested(&sample(&mut orchestrator, step)).is_some());
    }

    #[test]
    fn test_skipping_below_two_frames_fails() {
        let settings = CaptureSettings {
            max_retries: 0,
            ..CaptureSettings::for_shot_count(2)
        };
        let mut orchestrator = started(settings);
        sample(&mut orchestrator, 0.0);
        let request = requested(&sample(&mut orchestrator, PI)).unwrap();

        let effects = complete(&mut orchestrator, request, BLURRY);
        assert_eq!(
            failures(&effects),
            vec![SessionFailure::InsufficientFrames {
                accepted: 0,
                required: 2
            }]
        );
        assert_eq!(orchestrator.phase(), CapturePhase::Failed);
    }

    #[test]
    fn test_skipped_targets_shrink_the_batch() {
        let settings = CaptureSettings {
            max_retries: 0,
            ..CaptureSettings::for_shot_count(4)
        };
        let mut orchestrator = started(settings);
        sample(&mut orchestrator, 0.0);

        let mut batch = None;
        for sharpness in [SHARP, BLURRY, SHARP, SHARP] {
            let target = orchestrator.session().next_target_angle;
            let request = requested(&sample(&mut orchestrator, target)).unwrap();
            if let Some(frames) = submitted(complete(&mut orchestrator, request, sharpness)) {
                batch = Some(frames);
            }
        }
        assert_eq!(batch.map(|f| f.len()), Some(3));
    }

    #[test]
    fn test_start_while_active_is_ignored() {
        let mut orchestrator = started(CaptureSettings::default());
        sample(&mut orchestrator, 0.2);
        let epoch = orchestrator.epoch();

        assert!(orchestrator.handle(SessionEvent::Start).is_empty());
        assert_eq!(orchestrator.epoch(), epoch);
        assert_eq!(orchestrator.session().reference_yaw, Some(0.2));
    }

    #[test]
    fn test_feed_unavailable_fails_session() {
        let mut orchestrator = started(CaptureSettings::default());
        let epoch = orchestrator.epoch();
        let effects = orchestrator.handle(SessionEvent::FeedUnavailable {
            epoch,
            reason: "no gyroscope".into(),
        });
        assert_eq!(
            failures(&effects),
            vec![SessionFailure::OrientationUnavailable("no gyroscope".into())]
        );
        assert_eq!(stop_count(&effects), 0);
    }
}
