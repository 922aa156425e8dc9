//! Per-frame orchestration of the perception-to-scroll pipeline.
//!
//! Ordered stages on the frame thread: alignment → kinematics → (conditional)
//! optical flow → TouchProof → velocity tracking → controller → dispatcher.
//! All gesture state lives here, owned by one thread; the HUD only ever sees
//! immutable snapshots through the publisher.

use log::{debug, warn};
use nalgebra::Point2;

use crate::alignment::HandFrame;
use crate::camera::CapturedFrame;
use crate::config::Config;
use crate::dispatcher::VelocityDispatcher;
use crate::hud::{encode_camera_frame, HudPublisher, Throttle};
use crate::kinematics::{FingertipSample, KinematicsBuffer};
use crate::landmarks::{is_high_five, HandDetection};
use crate::optical_flow::OpticalFlowProbe;
use crate::scroll::ContinuousScrollAction;
use crate::touchproof::{TouchProofDetector, TouchSignals};
use crate::velocity_controller::{
    ControllerInput, ControllerState, Transition, VelocityController,
};
use crate::velocity_tracker::{Velocity2D, VelocityTracker};
use crate::{Error, Result};

// Sample retention must cover the velocity window at any realistic frame
// rate, plus slack for the flow history.
const KINEMATICS_CAPACITY: usize = 64;

/// What one frame produced, for preview and tests
#[derive(Debug, Clone, Copy)]
pub struct FrameOutcome {
    pub signals: Option<TouchSignals>,
    pub state: ControllerState,
    pub velocity: Velocity2D,
    pub transition: Transition,
}

/// The frame-thread pipeline
pub struct Pipeline {
    config: Config,
    kinematics: KinematicsBuffer,
    flow: OpticalFlowProbe,
    touchproof: TouchProofDetector,
    tracker: VelocityTracker,
    controller: VelocityController,
    dispatcher: VelocityDispatcher,
    publisher: HudPublisher,
    camera_throttle: Throttle,
    frame_counter: u64,
    held_midpoint: Option<FingertipSample>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        config: Config,
        action: Option<ContinuousScrollAction>,
        publisher: HudPublisher,
    ) -> Self {
        let dispatcher =
            VelocityDispatcher::new(action, publisher.clone(), &config.scroll, &config.hud);
        Self {
            kinematics: KinematicsBuffer::new(KINEMATICS_CAPACITY),
            flow: OpticalFlowProbe::new(config.optical_flow.clone()),
            touchproof: TouchProofDetector::new(config.touchproof.clone(), config.hand_loss_grace_ms),
            tracker: VelocityTracker::new(config.velocity.clone()),
            controller: VelocityController::new(config.controller.clone()),
            camera_throttle: Throttle::from_hz(config.hud.camera_hz),
            dispatcher,
            publisher,
            frame_counter: 0,
            held_midpoint: None,
            config,
        }
    }

    /// Process one frame of input.
    ///
    /// `detection` is the external landmark result, `frame` the camera frame
    /// when one exists (replay sessions run without). Per-frame errors are
    /// recovered here; only unexpected OpenCV failures propagate.
    pub fn process_frame(
        &mut self,
        detection: Option<&HandDetection>,
        frame: Option<&CapturedFrame>,
        t_ms: u64,
    ) -> Result<FrameOutcome> {
        self.frame_counter += 1;
        self.maybe_publish_camera(frame, t_ms);

        match detection {
            Some(det) if det.is_complete() => self.process_hand(det, frame, t_ms),
            _ => Ok(self.process_missing(t_ms)),
        }
    }

    /// Finish the current episode, if any (shutdown path)
    pub fn finish(&mut self) {
        if self.controller.force_idle() == Transition::End {
            self.dispatcher.finish();
        }
    }

    fn process_hand(
        &mut self,
        det: &HandDetection,
        frame: Option<&CapturedFrame>,
        t_ms: u64,
    ) -> Result<FrameOutcome> {
        let (width, height) = self.frame_dims(frame);
        let hand_frame = match HandFrame::from_landmarks(&det.landmarks, width, height) {
            Ok(hand_frame) => hand_frame,
            Err(Error::DegenerateHand(reason)) => {
                debug!("dropping degenerate frame: {reason}");
                return Ok(self.held_outcome());
            }
            Err(e) => return Err(e),
        };

        let gray = frame.map(|f| &f.gray);
        let signals =
            match self
                .touchproof
                .update(&det.landmarks, &hand_frame, gray, &mut self.flow, t_ms)
            {
                Ok(signals) => signals,
                Err(Error::DegenerateHand(reason)) => {
                    debug!("dropping degenerate frame: {reason}");
                    return Ok(self.held_outcome());
                }
                Err(e) => return Err(e),
            };

        let mid_image = HandFrame::fingertip_midpoint(&det.landmarks);
        let sample = FingertipSample {
            t_ms,
            mid_image,
            mid_hand: hand_frame.to_hand_frame(mid_image),
        };
        self.kinematics.push(sample);
        self.held_midpoint = Some(sample);

        let velocity = self.tracker.update(&self.kinematics, t_ms);
        let high_five = is_high_five(&det.landmarks, &hand_frame, &self.config.pose);

        let update = self.controller.update(ControllerInput {
            touching: signals.is_touching,
            high_five,
            hand_present: true,
            velocity,
            t_ms,
        });
        if update.transition == Transition::End {
            self.reset_motion_state();
        }
        self.dispatcher.dispatch(&update, t_ms, 1);

        Ok(FrameOutcome {
            signals: Some(signals),
            state: update.state,
            velocity: update.velocity,
            transition: update.transition,
        })
    }

    fn process_missing(&mut self, t_ms: u64) -> FrameOutcome {
        let signals = self.touchproof.note_missing(t_ms);

        if signals.is_touching {
            // grace window: hold the last midpoint so updates keep flowing
            // and the velocity decays instead of jumping
            if let Some(held) = self.held_midpoint {
                self.kinematics.push(FingertipSample { t_ms, ..held });
            }
        }

        let velocity = self.tracker.update(&self.kinematics, t_ms);
        let update = self.controller.update(ControllerInput {
            touching: signals.is_touching,
            high_five: false,
            hand_present: false,
            velocity,
            t_ms,
        });
        if update.transition == Transition::End {
            // lost past grace: the whole motion state starts over
            self.reset_motion_state();
            self.flow.reset();
            self.held_midpoint = None;
        }
        self.dispatcher.dispatch(&update, t_ms, 0);

        FrameOutcome {
            signals: Some(signals),
            state: update.state,
            velocity: update.velocity,
            transition: update.transition,
        }
    }

    fn maybe_publish_camera(&mut self, frame: Option<&CapturedFrame>, t_ms: u64) {
        let Some(frame) = frame else { return };
        if !self.config.hud.enabled || !self.publisher.camera_wanted() {
            return;
        }
        if self.frame_counter % u64::from(self.config.hud.camera_frame_skip) != 0 {
            return;
        }
        if !self.camera_throttle.ready(t_ms) {
            return;
        }
        match encode_camera_frame(&frame.bgr) {
            Ok(message) => self.publisher.publish(message),
            Err(e) => warn!("camera frame encode failed: {e}"),
        }
    }

    fn reset_motion_state(&mut self) {
        self.tracker.reset();
        self.kinematics.clear();
    }

    fn held_outcome(&self) -> FrameOutcome {
        FrameOutcome {
            signals: None,
            state: self.controller.state(),
            velocity: self.tracker.smoothed(),
            transition: Transition::None,
        }
    }

    fn frame_dims(&self, frame: Option<&CapturedFrame>) -> (u32, u32) {
        match frame {
            Some(f) => (f.width, f.height),
            // replay without video: nominal 4:3 capture size
            None => {
                let w = self.config.camera.frame_width.max(1) as u32;
                (w, w * 3 / 4)
            }
        }
    }

    /// Fingertip midpoint of the most recent hand, for the preview overlay
    #[must_use]
    pub fn last_midpoint(&self) -> Option<Point2<f64>> {
        self.held_midpoint.map(|s| s.mid_image)
    }
}
