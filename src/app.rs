//! Application runner: wires camera, landmark source, pipeline and HUD.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use opencv::{
    core::{Point, Scalar},
    highgui,
    imgproc::{self, FONT_HERSHEY_SIMPLEX, LINE_8},
};

use crate::camera::{Camera, CapturedFrame, VideoSource};
use crate::config::Config;
use crate::hud::{HudBroadcaster, HudPublisher};
use crate::landmarks::HandProvider;
use crate::pipeline::{FrameOutcome, Pipeline};
use crate::replay::ReplaySource;
use crate::scroll::{create_sink, ContinuousScrollAction};
use crate::touchproof::GateState;
use crate::velocity_controller::ControllerState;
use crate::{Error, Result};

const PREVIEW_WINDOW: &str = "Glide";

/// Top-level application
pub struct App {
    config: Config,
    pipeline: Pipeline,
    // kept alive for its accept/IO threads; closed on drop
    _hud: Option<HudBroadcaster>,
    shutdown: Arc<AtomicBool>,
    headless: bool,
}

impl App {
    /// Build the application: bind the HUD, create the scroll sink, wire the
    /// pipeline.
    ///
    /// # Errors
    ///
    /// Unrecoverable startup failures only: a bound HUD port or an invalid
    /// configuration. A denied scroll sink downgrades to feedback-only.
    pub fn new(config: Config, headless: bool) -> Result<Self> {
        config.validate()?;

        let (hud, publisher) = if config.hud.enabled {
            let (hud, publisher) = HudBroadcaster::bind(&config.hud)?;
            (Some(hud), publisher)
        } else {
            (None, HudPublisher::detached())
        };

        let action = match create_sink(&config.scroll) {
            Ok(sink) => Some(ContinuousScrollAction::new(sink, config.scroll.clone())),
            Err(Error::ScrollSinkDenied(reason)) => {
                warn!("scroll sink denied ({reason}); continuing with HUD feedback only");
                None
            }
            Err(e) => return Err(e),
        };

        let pipeline = Pipeline::new(config.clone(), action, publisher);

        Ok(Self {
            config,
            pipeline,
            _hud: hud,
            shutdown: Arc::new(AtomicBool::new(false)),
            headless,
        })
    }

    /// Flag that stops the run loop after the current frame
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Drive the pipeline from a recorded landmark session, paced to its
    /// own timestamps.
    pub fn run_replay(&mut self, mut replay: ReplaySource) -> Result<()> {
        info!("Running from replay ({} frames)", replay.len());
        let mut last_t: Option<u64> = None;

        while !self.shutdown.load(Ordering::SeqCst) {
            let Some(frame) = replay.next_frame() else { break };
            let (t_ms, detection) = (frame.t_ms, frame.detection.clone());

            if let Some(last) = last_t {
                let dt = t_ms.saturating_sub(last);
                if dt > 0 {
                    std::thread::sleep(Duration::from_millis(dt.min(100)));
                }
            }
            last_t = Some(t_ms);

            self.pipeline.process_frame(detection.as_ref(), None, t_ms)?;
        }

        self.pipeline.finish();
        Ok(())
    }

    /// Drive the pipeline from a live camera and landmark provider.
    pub fn run_live(
        &mut self,
        source: &VideoSource,
        mut provider: Box<dyn HandProvider>,
    ) -> Result<()> {
        let mut camera = Camera::open(source, &self.config.camera)?;
        let start = Instant::now();

        let mut fps_window_start = Instant::now();
        let mut fps_frames = 0u32;

        while !self.shutdown.load(Ordering::SeqCst) {
            let frame = match camera.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("camera read failed ({e}), reopening");
                    camera = Camera::open(source, &self.config.camera)?;
                    continue;
                }
            };

            let t_ms = start.elapsed().as_millis() as u64;
            let detection = provider.detect(&frame.bgr, t_ms)?;
            let outcome = self
                .pipeline
                .process_frame(detection.as_ref(), Some(&frame), t_ms)?;

            fps_frames += 1;
            if fps_window_start.elapsed() >= Duration::from_secs(1) {
                debug!(
                    "{:.1} fps",
                    f64::from(fps_frames) / fps_window_start.elapsed().as_secs_f64()
                );
                fps_window_start = Instant::now();
                fps_frames = 0;
            }

            if !self.headless && !self.show_preview(&frame, &outcome)? {
                self.shutdown.store(true, Ordering::SeqCst);
            }
        }

        self.pipeline.finish();
        if !self.headless {
            let _ = highgui::destroy_all_windows();
        }
        Ok(())
    }

    // Returns false when the user asked to quit.
    fn show_preview(&self, frame: &CapturedFrame, outcome: &FrameOutcome) -> Result<bool> {
        let mut display = frame.bgr.clone();

        let (label, color) = match outcome.signals.map(|s| s.state) {
            Some(GateState::Ready) => ("TOUCH", Scalar::new(0.0, 255.0, 0.0, 0.0)),
            Some(GateState::Unarmed) => ("open", Scalar::new(200.0, 200.0, 200.0, 0.0)),
            None => ("no hand", Scalar::new(0.0, 0.0, 255.0, 0.0)),
        };
        let fused = outcome.signals.map_or(0.0, |s| s.fused_score);
        let status = format!(
            "{label}  fused {fused:.2}  vy {:+.2}  {}",
            outcome.velocity.vy,
            if outcome.state == ControllerState::Scrolling {
                "SCROLL"
            } else {
                "idle"
            }
        );
        imgproc::put_text(
            &mut display,
            &status,
            Point::new(10, 30),
            FONT_HERSHEY_SIMPLEX,
            0.7,
            color,
            2,
            LINE_8,
            false,
        )?;

        if let Some(mid) = self.pipeline.last_midpoint() {
            let center = Point::new(
                (mid.x * f64::from(frame.width)) as i32,
                (mid.y * f64::from(frame.height)) as i32,
            );
            imgproc::circle(&mut display, center, 8, color, 2, LINE_8, 0)?;
        }

        highgui::imshow(PREVIEW_WINDOW, &display)?;
        let key = highgui::wait_key(1)?;
        Ok(!matches!(key, 113 | 27)) // 'q' or ESC
    }
}
