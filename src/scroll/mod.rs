//! OS scroll sink capability.
//!
//! The sink accepts phased scroll events (Begin / Change / End) with
//! sub-pixel deltas; the End hands the gesture to OS momentum. Variants are
//! fixed at startup: the Quartz sink on macOS, a null sink elsewhere or when
//! scrolling is disabled, and a recording sink for tests.

/// Phase-correct scroll emission over a sink
pub mod continuous;

#[cfg(target_os = "macos")]
mod quartz;

#[cfg(target_os = "macos")]
pub use quartz::QuartzScrollSink;

use std::sync::{Arc, Mutex};

use log::info;

use crate::config::ScrollConfig;
use crate::Result;

pub use continuous::ContinuousScrollAction;

/// Scroll event phase on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollPhase {
    Begin,
    Change,
    End,
}

/// One posted scroll event, as recorded by the test sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEvent {
    pub phase: ScrollPhase,
    pub dx_px: f64,
    pub dy_px: f64,
}

/// Capability trait over the OS scroll event stream.
///
/// All calls must come from the main dispatch context; the pipeline posts
/// serially from the frame thread so ordering is preserved by construction.
pub trait ScrollSink: Send {
    fn post_begin(&mut self, dx_px: f64, dy_px: f64) -> Result<()>;
    fn post_change(&mut self, dx_px: f64, dy_px: f64) -> Result<()>;
    fn post_end(&mut self) -> Result<()>;
    fn natural_scrolling(&self) -> bool;
    fn name(&self) -> &str;
}

/// Sink that swallows every event
pub struct NullScrollSink;

impl ScrollSink for NullScrollSink {
    fn post_begin(&mut self, _dx_px: f64, _dy_px: f64) -> Result<()> {
        Ok(())
    }

    fn post_change(&mut self, _dx_px: f64, _dy_px: f64) -> Result<()> {
        Ok(())
    }

    fn post_end(&mut self) -> Result<()> {
        Ok(())
    }

    fn natural_scrolling(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "NullScrollSink"
    }
}

/// Sink that records every event for inspection
pub struct TestScrollSink {
    events: Arc<Mutex<Vec<ScrollEvent>>>,
    natural: bool,
}

impl TestScrollSink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            natural: false,
        }
    }

    #[must_use]
    pub fn with_natural_scrolling(natural: bool) -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            natural,
        }
    }

    /// Shared handle to the recorded events
    #[must_use]
    pub fn events(&self) -> Arc<Mutex<Vec<ScrollEvent>>> {
        Arc::clone(&self.events)
    }
}

impl Default for TestScrollSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ScrollSink for TestScrollSink {
    fn post_begin(&mut self, dx_px: f64, dy_px: f64) -> Result<()> {
        self.events.lock().unwrap().push(ScrollEvent {
            phase: ScrollPhase::Begin,
            dx_px,
            dy_px,
        });
        Ok(())
    }

    fn post_change(&mut self, dx_px: f64, dy_px: f64) -> Result<()> {
        self.events.lock().unwrap().push(ScrollEvent {
            phase: ScrollPhase::Change,
            dx_px,
            dy_px,
        });
        Ok(())
    }

    fn post_end(&mut self) -> Result<()> {
        self.events.lock().unwrap().push(ScrollEvent {
            phase: ScrollPhase::End,
            dx_px: 0.0,
            dy_px: 0.0,
        });
        Ok(())
    }

    fn natural_scrolling(&self) -> bool {
        self.natural
    }

    fn name(&self) -> &str {
        "TestScrollSink"
    }
}

/// Create the platform scroll sink for this configuration.
///
/// # Errors
///
/// Returns [`crate::Error::ScrollSinkDenied`] when the OS refuses event
/// posting (missing accessibility permission on macOS). Callers downgrade
/// to a disabled dispatcher rather than aborting.
pub fn create_sink(config: &ScrollConfig) -> Result<Box<dyn ScrollSink>> {
    if !config.enabled {
        info!("Scroll posting disabled by configuration");
        return Ok(Box::new(NullScrollSink));
    }

    #[cfg(target_os = "macos")]
    {
        let sink = QuartzScrollSink::new()?;
        info!("Using Quartz scroll sink (natural scrolling: {})", sink.natural_scrolling());
        Ok(Box::new(sink))
    }

    #[cfg(not(target_os = "macos"))]
    {
        log::warn!("No native scroll sink on this platform, events will be dropped");
        Ok(Box::new(NullScrollSink))
    }
}
