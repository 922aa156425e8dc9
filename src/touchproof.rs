//! TouchProof: multi-signal fingertip contact detection.
//!
//! Four signals vote on whether the index and middle fingertips touch:
//! proximity and angle in the hand frame (cheap, every frame), visibility
//! asymmetry when the detector reports it, and Micro-Flow Cohesion from the
//! optical flow probe (expensive, evaluated conditionally). The fused score
//! feeds a counted hysteresis machine so a single noisy frame can neither
//! arm nor disarm the detector.

use log::debug;
use opencv::core::Mat;

use crate::alignment::HandFrame;
use crate::config::TouchProofConfig;
use crate::landmarks::{Landmark, INDEX_TIP, MIDDLE_TIP};
use crate::optical_flow::OpticalFlowProbe;
use crate::{Error, Result};

/// Hysteresis state of the contact detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Not touching; counting qualifying frames toward arming
    Unarmed,
    /// Touching; counting disqualifying frames toward release
    Ready,
}

/// All signals used for one touch decision
#[derive(Debug, Clone, Copy)]
pub struct TouchSignals {
    pub proximity_score: f64,
    pub angle_score: f64,
    pub mfc_score: f64,
    pub visibility_score: f64,
    pub distance_factor: f64,
    pub fused_score: f64,
    pub is_touching: bool,
    pub state: GateState,
}

impl TouchSignals {
    fn empty(state: GateState, is_touching: bool) -> Self {
        Self {
            proximity_score: 0.0,
            angle_score: 0.0,
            mfc_score: 0.0,
            visibility_score: 0.0,
            distance_factor: 0.5,
            fused_score: 0.0,
            is_touching,
            state,
        }
    }
}

/// Fusion weights for the four signals
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub proximity: f64,
    pub angle: f64,
    pub mfc: f64,
    pub visibility: f64,
}

const WEIGHTS_NEAR: FusionWeights = FusionWeights {
    proximity: 0.40,
    angle: 0.30,
    mfc: 0.25,
    visibility: 0.05,
};

const WEIGHTS_FAR: FusionWeights = FusionWeights {
    proximity: 0.45,
    angle: 0.20,
    mfc: 0.30,
    visibility: 0.05,
};

/// Interpolated fusion weights for a given camera-distance factor.
///
/// Below 0.3 the near profile applies, above 0.7 the far profile; in
/// between the two are blended linearly.
#[must_use]
pub fn fusion_weights(distance_factor: f64) -> FusionWeights {
    if distance_factor < 0.3 {
        return WEIGHTS_NEAR;
    }
    if distance_factor > 0.7 {
        return WEIGHTS_FAR;
    }
    let t = (distance_factor - 0.3) / 0.4;
    let lerp = |near: f64, far: f64| near * (1.0 - t) + far * t;
    FusionWeights {
        proximity: lerp(WEIGHTS_NEAR.proximity, WEIGHTS_FAR.proximity),
        angle: lerp(WEIGHTS_NEAR.angle, WEIGHTS_FAR.angle),
        mfc: lerp(WEIGHTS_NEAR.mfc, WEIGHTS_FAR.mfc),
        visibility: lerp(WEIGHTS_NEAR.visibility, WEIGHTS_FAR.visibility),
    }
}

impl FusionWeights {
    /// Drop unused signals and renormalize the remaining weights to sum 1
    #[must_use]
    pub fn renormalized(mut self, mfc_used: bool, visibility_used: bool) -> Self {
        if !mfc_used {
            self.mfc = 0.0;
        }
        if !visibility_used {
            self.visibility = 0.0;
        }
        let total = self.proximity + self.angle + self.mfc + self.visibility;
        self.proximity /= total;
        self.angle /= total;
        self.mfc /= total;
        self.visibility /= total;
        self
    }
}

/// Multi-signal fusion detector with hysteresis
pub struct TouchProofDetector {
    config: TouchProofConfig,
    grace_ms: u64,
    state: GateState,
    enter_counter: u32,
    exit_counter: u32,
    proximity_ema: Option<f64>,
    angle_ema: Option<f64>,
    last_signals: Option<TouchSignals>,
    missing_since: Option<u64>,
}

impl TouchProofDetector {
    #[must_use]
    pub fn new(config: TouchProofConfig, grace_ms: u64) -> Self {
        Self {
            config,
            grace_ms,
            state: GateState::Unarmed,
            enter_counter: 0,
            exit_counter: 0,
            proximity_ema: None,
            angle_ema: None,
            last_signals: None,
            missing_since: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    #[must_use]
    pub fn is_touching(&self) -> bool {
        self.state == GateState::Ready
    }

    /// Score one frame of landmarks.
    ///
    /// `gray` carries the grayscale camera frame when one is available; the
    /// optical flow probe is only consulted when the cheap signals leave the
    /// decision uncertain (or the detector is armed, or the hand is very
    /// close).
    ///
    /// # Errors
    ///
    /// Propagates [`Error::DegenerateHand`] from the alignment metrics; the
    /// caller drops the frame without mutating detector state.
    pub fn update(
        &mut self,
        landmarks: &[Landmark],
        frame: &HandFrame,
        gray: Option<&Mat>,
        flow: &mut OpticalFlowProbe,
        _t_ms: u64,
    ) -> Result<TouchSignals> {
        let distance = frame.normalized_fingertip_distance(landmarks);
        let angle_raw = frame.fingertip_angle_deg(landmarks)?;
        let distance_factor = frame.distance_factor();

        self.missing_since = None;

        // Signal EMAs keep running on capped frames so release lag stays
        // consistent.
        let angle = ema(&mut self.angle_ema, angle_raw, self.config.angle_ema_alpha);

        let proximity_raw = self.score_proximity(distance, distance_factor);
        let proximity_score = ema(
            &mut self.proximity_ema,
            proximity_raw,
            self.config.proximity_ema_alpha,
        );
        let angle_score = self.score_angle(angle, distance_factor);

        let visibility = visibility_asymmetry(
            &landmarks[INDEX_TIP],
            &landmarks[MIDDLE_TIP],
            self.config.visibility_asymmetry_min,
        );
        let visibility_score = visibility.unwrap_or(0.0);

        let capped =
            distance > self.config.proximity_hard_cap || angle_raw > self.config.angle_hard_cap_deg;

        let initial_fused = 0.7 * proximity_score + 0.3 * angle_score;
        let wants_mfc = self.state == GateState::Ready
            || (self.config.mfc_gate_low..=self.config.mfc_gate_high).contains(&initial_fused)
            || distance_factor < 0.3;

        let mfc = if wants_mfc {
            match gray {
                Some(gray) => {
                    let (tip_index, tip_middle) = frame.fingertip_pixels(landmarks);
                    match flow.update(gray, tip_index, tip_middle) {
                        Ok(score) => Some(score),
                        Err(Error::FlowInfeasible(reason)) => {
                            debug!("MFC gated off: {reason}");
                            None
                        }
                        Err(e) => return Err(e),
                    }
                }
                None => None,
            }
        } else {
            None
        };
        let mfc_score = mfc.unwrap_or(0.0);

        let weights =
            fusion_weights(distance_factor).renormalized(mfc.is_some(), visibility.is_some());

        let fused_score = if capped {
            0.0
        } else {
            weights.proximity * proximity_score
                + weights.angle * angle_score
                + weights.mfc * mfc_score
                + weights.visibility * visibility_score
        };

        let was = self.state;
        let is_touching = self.update_state(fused_score);
        if self.state != was {
            debug!(
                "touchproof {:?} -> {:?} (fused {fused_score:.3})",
                was, self.state
            );
        }

        let signals = TouchSignals {
            proximity_score,
            angle_score,
            mfc_score,
            visibility_score,
            distance_factor,
            fused_score,
            is_touching,
            state: self.state,
        };
        self.last_signals = Some(signals);
        Ok(signals)
    }

    /// Account for a frame without landmarks.
    ///
    /// State is held for the grace window; once it expires the detector is
    /// forced to UNARMED and reports a release.
    pub fn note_missing(&mut self, t_ms: u64) -> TouchSignals {
        let since = *self.missing_since.get_or_insert(t_ms);
        if t_ms.saturating_sub(since) > self.grace_ms {
            if self.state == GateState::Ready {
                debug!("hand lost past grace, forcing release");
            }
            self.reset();
            self.missing_since = Some(since);
            let signals = TouchSignals::empty(GateState::Unarmed, false);
            self.last_signals = Some(signals);
            return signals;
        }

        self.last_signals
            .unwrap_or_else(|| TouchSignals::empty(self.state, self.is_touching()))
    }

    /// Forget all state (session reset)
    pub fn reset(&mut self) {
        self.state = GateState::Unarmed;
        self.enter_counter = 0;
        self.exit_counter = 0;
        self.proximity_ema = None;
        self.angle_ema = None;
        self.last_signals = None;
        self.missing_since = None;
    }

    fn update_state(&mut self, fused: f64) -> bool {
        match self.state {
            GateState::Unarmed => {
                if fused > self.config.fused_enter_threshold {
                    self.enter_counter += 1;
                    if self.enter_counter >= self.config.frames_to_enter {
                        self.state = GateState::Ready;
                        self.enter_counter = 0;
                        return true;
                    }
                } else {
                    self.enter_counter = 0;
                }
                false
            }
            GateState::Ready => {
                if fused < self.config.fused_exit_threshold {
                    self.exit_counter += 1;
                    if self.exit_counter >= self.config.frames_to_exit {
                        self.state = GateState::Unarmed;
                        self.exit_counter = 0;
                        return false;
                    }
                } else {
                    self.exit_counter = 0;
                }
                true
            }
        }
    }

    // Distance-adjusted proximity: thresholds relax when the hand is far
    // and the fingertip gap measurement gets noisy.
    fn score_proximity(&self, distance: f64, distance_factor: f64) -> f64 {
        let stretch = 1.0 + self.config.k_d * distance_factor;
        score_low_is_good(
            distance,
            self.config.proximity_enter * stretch,
            self.config.proximity_exit * stretch,
        )
    }

    // Distance-adjusted angle: thresholds tighten when the hand is close
    // and small angles are well resolved.
    fn score_angle(&self, angle_deg: f64, distance_factor: f64) -> f64 {
        let tighten = self.config.k_theta * (1.0 - distance_factor);
        score_low_is_good(
            angle_deg,
            self.config.angle_enter_deg - tighten,
            self.config.angle_exit_deg - tighten,
        )
    }
}

/// Piecewise-linear score for metrics where smaller is better.
///
/// 1 at or below `enter`, 0 at or above `exit`, linear in between; equal
/// thresholds degrade to a step function.
fn score_low_is_good(value: f64, enter: f64, exit: f64) -> f64 {
    if value <= enter {
        1.0
    } else if value >= exit {
        0.0
    } else {
        1.0 - (value - enter) / (exit - enter)
    }
}

fn visibility_asymmetry(index: &Landmark, middle: &Landmark, asymmetry_min: f64) -> Option<f64> {
    let (vi, vm) = (index.visibility?, middle.visibility?);
    let asymmetry = (vi - vm).abs();
    if asymmetry >= asymmetry_min {
        Some(1.0)
    } else {
        Some(asymmetry / asymmetry_min)
    }
}

fn ema(state: &mut Option<f64>, value: f64, alpha: f64) -> f64 {
    let next = match *state {
        Some(prev) => alpha * value + (1.0 - alpha) * prev,
        None => value,
    };
    *state = Some(next);
    next
}
