//! Lifecycle bridge from controller state to scroll phases and HUD events.

use log::{debug, warn};

use crate::config::{HudConfig, ScrollConfig};
use crate::hud::{HudMessage, HudPublisher, Throttle};
use crate::scroll::ContinuousScrollAction;
use crate::velocity_controller::{ControllerState, ControllerUpdate, Transition};
use crate::velocity_tracker::Velocity2D;

/// Translates controller transitions into scroll-action calls and HUD
/// messages.
///
/// Scroll emission survives a denied sink as a no-op: touch and velocity
/// feedback keep flowing to the HUD, with a one-shot status note explaining
/// why nothing scrolls.
pub struct VelocityDispatcher {
    action: Option<ContinuousScrollAction>,
    publisher: HudPublisher,
    scroll_throttle: Throttle,
    velocity_ref: f64,
    last_t_ms: Option<u64>,
    denied_note_sent: bool,
}

impl VelocityDispatcher {
    #[must_use]
    pub fn new(
        action: Option<ContinuousScrollAction>,
        publisher: HudPublisher,
        scroll_config: &ScrollConfig,
        hud_config: &HudConfig,
    ) -> Self {
        Self {
            action,
            publisher,
            scroll_throttle: Throttle::from_hz(hud_config.hud_hz),
            velocity_ref: scroll_config.velocity_ref,
            last_t_ms: None,
            denied_note_sent: false,
        }
    }

    /// Dispatch one controller update.
    ///
    /// Per-frame failures from the sink are logged and recovered locally:
    /// they never abort the pipeline and never leave an episode without its
    /// End.
    pub fn dispatch(&mut self, update: &ControllerUpdate, t_ms: u64, hands: u32) {
        let dt_s = self
            .last_t_ms
            .map(|last| t_ms.saturating_sub(last) as f64 / 1000.0)
            .unwrap_or(0.0);
        self.last_t_ms = Some(t_ms);

        match update.transition {
            Transition::Begin => {
                if let Some(action) = &mut self.action {
                    if let Err(e) = action.begin(update.velocity, dt_s) {
                        warn!("scroll begin failed: {e}");
                    }
                } else if !self.denied_note_sent {
                    self.denied_note_sent = true;
                    self.publisher.publish(HudMessage::Status {
                        note: "scroll output unavailable, showing feedback only".to_string(),
                    });
                }
                self.scroll_throttle.reset();
                self.publish_scroll(update.velocity, t_ms);
                self.publisher.publish(HudMessage::Touchproof {
                    active: true,
                    hands,
                });
                debug!("episode begin at {t_ms} ms");
            }
            Transition::None if update.state == ControllerState::Scrolling => {
                if let Some(action) = &mut self.action {
                    if let Err(e) = action.update(update.velocity, dt_s) {
                        warn!("scroll update failed: {e}");
                    }
                }
                self.publish_scroll(update.velocity, t_ms);
            }
            Transition::End => {
                if let Some(action) = &mut self.action {
                    if let Err(e) = action.end() {
                        warn!("scroll end failed: {e}");
                    }
                }
                self.publisher.publish(HudMessage::Hide);
                self.publisher.publish(HudMessage::Touchproof {
                    active: false,
                    hands,
                });
                debug!("episode end at {t_ms} ms");
            }
            Transition::None => {}
        }
    }

    /// Emit the End for an episode cut short by shutdown
    pub fn finish(&mut self) {
        if let Some(action) = &mut self.action {
            if action.is_scrolling() {
                if let Err(e) = action.end() {
                    warn!("scroll end on shutdown failed: {e}");
                }
                self.publisher.publish(HudMessage::Hide);
                self.publisher.publish(HudMessage::Touchproof {
                    active: false,
                    hands: 0,
                });
            }
        }
    }

    fn publish_scroll(&mut self, velocity: Velocity2D, t_ms: u64) {
        if !self.scroll_throttle.ready(t_ms) {
            return;
        }
        let speed = (velocity.magnitude() / self.velocity_ref).clamp(0.0, 1.0);
        self.publisher.publish(HudMessage::Scroll {
            vy: velocity.vy,
            speed,
        });
    }
}
