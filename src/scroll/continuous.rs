//! Phase-correct scroll emission.
//!
//! A SCROLLING episode maps onto the sink as exactly one Begin, any number
//! of Changes, and exactly one End with zero delta, in that order. The End
//! hands the gesture to OS momentum, so it carries no velocity of its own.

use log::debug;

use super::ScrollSink;
use crate::config::ScrollConfig;
use crate::velocity_tracker::Velocity2D;
use crate::Result;

/// Continuous scroll gesture emitter over a [`ScrollSink`]
pub struct ContinuousScrollAction {
    sink: Box<dyn ScrollSink>,
    config: ScrollConfig,
    invert_y: bool,
    is_scrolling: bool,
}

impl ContinuousScrollAction {
    /// Wrap a sink, reading the natural-scrolling preference once.
    #[must_use]
    pub fn new(sink: Box<dyn ScrollSink>, config: ScrollConfig) -> Self {
        let invert_y = config.respect_system_preference && sink.natural_scrolling();
        Self {
            sink,
            config,
            invert_y,
            is_scrolling: false,
        }
    }

    /// Begin a scroll gesture. Returns false (and posts nothing) if a
    /// gesture is already in flight.
    pub fn begin(&mut self, velocity: Velocity2D, dt_s: f64) -> Result<bool> {
        if self.is_scrolling {
            return Ok(false);
        }
        let (dx, dy) = self.deltas(velocity, dt_s);
        self.sink.post_begin(dx, dy)?;
        self.is_scrolling = true;
        debug!("scroll begin dx={dx:.1} dy={dy:.1}");
        Ok(true)
    }

    /// Emit one Change-phase event. Returns false (and posts nothing)
    /// outside an episode: no Change may precede Begin or follow End.
    pub fn update(&mut self, velocity: Velocity2D, dt_s: f64) -> Result<bool> {
        if !self.is_scrolling {
            return Ok(false);
        }
        let (dx, dy) = self.deltas(velocity, dt_s);
        self.sink.post_change(dx, dy)?;
        Ok(true)
    }

    /// End the gesture with a zero delta, handing momentum to the OS.
    pub fn end(&mut self) -> Result<bool> {
        if !self.is_scrolling {
            return Ok(false);
        }
        self.sink.post_end()?;
        self.is_scrolling = false;
        debug!("scroll end, momentum handed to OS");
        Ok(true)
    }

    #[must_use]
    pub fn is_scrolling(&self) -> bool {
        self.is_scrolling
    }

    // Per-frame pixel deltas. The horizontal component is computed and
    // forwarded so the interface stays horizontal-ready, even though no
    // caller consumes it yet.
    fn deltas(&self, velocity: Velocity2D, dt_s: f64) -> (f64, f64) {
        let step = self.config.max_step_px;
        let dx = (self.config.pixels_per_unit * velocity.vx * dt_s).clamp(-step, step);
        let mut dy = (self.config.pixels_per_unit * velocity.vy * dt_s).clamp(-step, step);
        if self.invert_y {
            dy = -dy;
        }
        (dx, dy)
    }
}
