//! Scroll activation state machine.
//!
//! Two states: IDLE and SCROLLING. Touching fingers start an episode,
//! releasing them (or an open-palm high-five, or losing the hand past the
//! grace window) ends it. Momentum after release belongs to the OS, so the
//! controller does not linger on low velocity unless explicitly configured.

use crate::config::ControllerConfig;
use crate::velocity_tracker::Velocity2D;

/// Controller activation state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Scrolling,
}

/// Edge emitted by a controller update.
///
/// Frames inside SCROLLING without a transition are implicit Change frames;
/// the controller never emits Change itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Begin,
    End,
}

/// Per-frame controller output
#[derive(Debug, Clone, Copy)]
pub struct ControllerUpdate {
    pub state: ControllerState,
    pub velocity: Velocity2D,
    pub transition: Transition,
}

/// Per-frame controller inputs
#[derive(Debug, Clone, Copy)]
pub struct ControllerInput {
    pub touching: bool,
    pub high_five: bool,
    pub hand_present: bool,
    pub velocity: Velocity2D,
    pub t_ms: u64,
}

/// IDLE ↔ SCROLLING activation driven by touch state and pose
#[derive(Debug)]
pub struct VelocityController {
    config: ControllerConfig,
    state: ControllerState,
    low_velocity_since: Option<u64>,
}

impl VelocityController {
    #[must_use]
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            state: ControllerState::Idle,
            low_velocity_since: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn update(&mut self, input: ControllerInput) -> ControllerUpdate {
        let transition = match self.state {
            ControllerState::Idle => {
                if input.touching && input.hand_present && !input.high_five {
                    self.state = ControllerState::Scrolling;
                    self.low_velocity_since = None;
                    Transition::Begin
                } else {
                    Transition::None
                }
            }
            ControllerState::Scrolling => {
                if !input.touching || input.high_five || self.end_on_idle_velocity(&input) {
                    self.state = ControllerState::Idle;
                    self.low_velocity_since = None;
                    Transition::End
                } else {
                    Transition::None
                }
            }
        };

        let velocity = match self.state {
            ControllerState::Scrolling => input.velocity,
            ControllerState::Idle => Velocity2D::ZERO,
        };

        ControllerUpdate {
            state: self.state,
            velocity,
            transition,
        }
    }

    /// Force an immediate End if SCROLLING (shutdown, session reset)
    pub fn force_idle(&mut self) -> Transition {
        if self.state == ControllerState::Scrolling {
            self.state = ControllerState::Idle;
            self.low_velocity_since = None;
            Transition::End
        } else {
            Transition::None
        }
    }

    // Disabled by default: ending on sustained low velocity fights the OS
    // momentum handoff.
    fn end_on_idle_velocity(&mut self, input: &ControllerInput) -> bool {
        let Some(hold_ms) = self.config.end_idle_hold_ms else {
            return false;
        };
        if input.velocity.magnitude() < self.config.end_idle_threshold {
            let since = *self.low_velocity_since.get_or_insert(input.t_ms);
            input.t_ms.saturating_sub(since) >= hold_ms
        } else {
            self.low_velocity_since = None;
            false
        }
    }
}
