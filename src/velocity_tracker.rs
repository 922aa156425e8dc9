//! Time-windowed fingertip velocity estimation.
//!
//! Velocity is the endpoint difference over the trailing window, smoothed
//! with a per-axis EMA and passed through a symmetric deadband. The output
//! is frame-rate independent: halving the frame rate does not change the
//! estimate for the same physical motion.

use serde::Serialize;

use crate::config::VelocityConfig;
use crate::kinematics::KinematicsBuffer;

/// 2-D velocity in image-normalized units per second
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Velocity2D {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity2D {
    pub const ZERO: Self = Self { vx: 0.0, vy: 0.0 };

    #[must_use]
    pub fn magnitude(&self) -> f64 {
        self.vx.hypot(self.vy)
    }
}

/// Smoothed velocity estimator over a [`KinematicsBuffer`]
#[derive(Debug)]
pub struct VelocityTracker {
    config: VelocityConfig,
    smoothed: Velocity2D,
}

impl VelocityTracker {
    #[must_use]
    pub fn new(config: VelocityConfig) -> Self {
        Self {
            config,
            smoothed: Velocity2D::ZERO,
        }
    }

    /// Update from the samples currently in the buffer.
    ///
    /// Fewer than `min_samples` samples in the window, or a window span
    /// under `min_dt_ms`, zeroes the estimate rather than extrapolating.
    pub fn update(&mut self, buffer: &KinematicsBuffer, now_ms: u64) -> Velocity2D {
        let mut first = None;
        let mut last = None;
        let mut count = 0usize;
        for sample in buffer.window(now_ms, self.config.window_ms) {
            if first.is_none() {
                first = Some(*sample);
            }
            last = Some(*sample);
            count += 1;
        }

        let (raw_vx, raw_vy) = match (first, last) {
            (Some(t0), Some(t1))
                if count >= self.config.min_samples
                    && t1.t_ms.saturating_sub(t0.t_ms) >= self.config.min_dt_ms =>
            {
                let dt_s = (t1.t_ms - t0.t_ms) as f64 / 1000.0;
                (
                    (t1.mid_image.x - t0.mid_image.x) / dt_s,
                    (t1.mid_image.y - t0.mid_image.y) / dt_s,
                )
            }
            _ => {
                self.smoothed = Velocity2D::ZERO;
                return self.smoothed;
            }
        };

        let beta = self.config.ema_beta;
        self.smoothed.vx = beta * raw_vx + (1.0 - beta) * self.smoothed.vx;
        self.smoothed.vy = beta * raw_vy + (1.0 - beta) * self.smoothed.vy;

        // deadband: sub-noise components are hard zeros, state included
        if self.smoothed.vx.abs() < self.config.noise_threshold {
            self.smoothed.vx = 0.0;
        }
        if self.smoothed.vy.abs() < self.config.noise_threshold {
            self.smoothed.vy = 0.0;
        }

        self.smoothed
    }

    /// Zero the smoothing state (IDLE re-entry)
    pub fn reset(&mut self) {
        self.smoothed = Velocity2D::ZERO;
    }

    #[must_use]
    pub fn smoothed(&self) -> Velocity2D {
        self.smoothed
    }
}
