//! Quartz scroll sink: native macOS phased scroll-wheel events.

use core_graphics::event::{CGEvent, CGEventTapLocation, EventField, ScrollEventUnit};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use log::warn;

use super::ScrollSink;
use crate::{Error, Result};

// CGScrollPhase values (IOKit/CoreGraphics)
const SCROLL_PHASE_BEGAN: i64 = 1;
const SCROLL_PHASE_CHANGED: i64 = 2;
const SCROLL_PHASE_ENDED: i64 = 4;
const MOMENTUM_PHASE_NONE: i64 = 0;

/// Phased scroll events through Quartz Event Services
pub struct QuartzScrollSink {
    source: CGEventSource,
    natural: bool,
}

impl QuartzScrollSink {
    /// Create the sink and read the natural-scrolling preference once.
    ///
    /// # Errors
    ///
    /// [`Error::ScrollSinkDenied`] when the event source cannot be created
    /// (typically a missing accessibility permission).
    pub fn new() -> Result<Self> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|()| Error::ScrollSinkDenied("cannot create CGEventSource".to_string()))?;
        Ok(Self {
            source,
            natural: detect_natural_scrolling(),
        })
    }

    fn post_phase(&self, phase: i64, dx_px: f64, dy_px: f64) -> Result<()> {
        let event = CGEvent::new_scroll_event(
            self.source.clone(),
            ScrollEventUnit::PIXEL,
            2,
            dy_px as i32,
            dx_px as i32,
            0,
        )
        .map_err(|()| Error::ScrollSinkDenied("cannot create scroll event".to_string()))?;

        event.set_integer_value_field(EventField::SCROLL_WHEEL_EVENT_IS_CONTINUOUS, 1);
        event.set_integer_value_field(EventField::SCROLL_WHEEL_EVENT_SCROLL_PHASE, phase);
        event.set_integer_value_field(
            EventField::SCROLL_WHEEL_EVENT_MOMENTUM_PHASE,
            MOMENTUM_PHASE_NONE,
        );
        // fractional point deltas for sub-pixel smoothness
        event.set_double_value_field(EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_1, dy_px);
        event.set_double_value_field(EventField::SCROLL_WHEEL_EVENT_POINT_DELTA_AXIS_2, dx_px);

        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl ScrollSink for QuartzScrollSink {
    fn post_begin(&mut self, dx_px: f64, dy_px: f64) -> Result<()> {
        self.post_phase(SCROLL_PHASE_BEGAN, dx_px, dy_px)
    }

    fn post_change(&mut self, dx_px: f64, dy_px: f64) -> Result<()> {
        self.post_phase(SCROLL_PHASE_CHANGED, dx_px, dy_px)
    }

    fn post_end(&mut self) -> Result<()> {
        self.post_phase(SCROLL_PHASE_ENDED, 0.0, 0.0)
    }

    fn natural_scrolling(&self) -> bool {
        self.natural
    }

    fn name(&self) -> &str {
        "QuartzScrollSink"
    }
}

// One-time read of the global swipe-scroll-direction default.
fn detect_natural_scrolling() -> bool {
    match std::process::Command::new("defaults")
        .args(["read", "-g", "com.apple.swipescrolldirection"])
        .output()
    {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim() == "1"
        }
        _ => {
            warn!("Could not read natural-scrolling preference, assuming disabled");
            false
        }
    }
}
