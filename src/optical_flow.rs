//! Micro-Flow Cohesion: do the two fingertips move as one?
//!
//! A Lucas-Kanade tracker follows a small patch at each fingertip and keeps a
//! short history of the per-frame flow vectors. Touching fingers produce
//! highly correlated flow of similar magnitude; separated fingers do not.
//! The probe is the most expensive TouchProof signal, so the detector only
//! evaluates it when the cheaper signals are inconclusive.

use std::collections::VecDeque;

use nalgebra::{Point2, Vector2};
use opencv::{
    core::{self, Mat, Point2f, Size, TermCriteria, Vector},
    prelude::*,
    video,
};

use crate::config::OpticalFlowConfig;
use crate::{Error, Result};

const LK_MAX_LEVEL: i32 = 2;
const LK_ITERATIONS: i32 = 10;
const LK_EPSILON: f64 = 0.03;
const MIN_HISTORY: usize = 3;

/// Lucas-Kanade flow probe over the two fingertip patches
pub struct OpticalFlowProbe {
    config: OpticalFlowConfig,
    prev_gray: Option<Mat>,
    history: VecDeque<(Vector2<f64>, Vector2<f64>)>,
}

impl OpticalFlowProbe {
    #[must_use]
    pub fn new(config: OpticalFlowConfig) -> Self {
        let window = config.window_frames;
        Self {
            config,
            prev_gray: None,
            history: VecDeque::with_capacity(window),
        }
    }

    /// Advance the probe one frame and score flow cohesion in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// [`Error::FlowInfeasible`] when there is no previous frame yet, a
    /// fingertip patch leaves the image, the tracker loses a point, or the
    /// history is still shorter than three frames. Callers gate the MFC
    /// signal off and redistribute its fusion weight.
    pub fn update(
        &mut self,
        gray: &Mat,
        tip_index: Point2<f32>,
        tip_middle: Point2<f32>,
    ) -> Result<f64> {
        let prev = self.prev_gray.take();
        self.prev_gray = Some(gray.clone());

        let Some(prev) = prev else {
            return Err(Error::FlowInfeasible("no previous frame".to_string()));
        };

        self.check_in_frame(gray, tip_index)?;
        self.check_in_frame(gray, tip_middle)?;

        let mut prev_pts = Vector::<Point2f>::new();
        prev_pts.push(Point2f::new(tip_index.x, tip_index.y));
        prev_pts.push(Point2f::new(tip_middle.x, tip_middle.y));

        let mut next_pts = Vector::<Point2f>::new();
        let mut status = Vector::<u8>::new();
        let mut err = Vector::<f32>::new();

        let criteria = TermCriteria::new(
            core::TermCriteria_COUNT + core::TermCriteria_EPS,
            LK_ITERATIONS,
            LK_EPSILON,
        )?;

        video::calc_optical_flow_pyr_lk(
            &prev,
            gray,
            &prev_pts,
            &mut next_pts,
            &mut status,
            &mut err,
            Size::new(self.config.patch_size, self.config.patch_size),
            LK_MAX_LEVEL,
            criteria,
            0,
            1e-4,
        )?;

        if status.len() < 2 || status.get(0)? == 0 || status.get(1)? == 0 {
            return Err(Error::FlowInfeasible("fingertip track lost".to_string()));
        }

        let flow = |i: usize| -> Result<Vector2<f64>> {
            let next = next_pts.get(i)?;
            let prev = prev_pts.get(i)?;
            Ok(Vector2::new(
                f64::from(next.x - prev.x),
                f64::from(next.y - prev.y),
            ))
        };

        if self.history.len() >= self.config.window_frames {
            self.history.pop_front();
        }
        self.history.push_back((flow(0)?, flow(1)?));

        if self.history.len() < MIN_HISTORY {
            return Err(Error::FlowInfeasible(format!(
                "flow history {} < {MIN_HISTORY}",
                self.history.len()
            )));
        }

        Ok(self.cohesion_score())
    }

    /// Forget all flow state (hand lost, session reset)
    pub fn reset(&mut self) {
        self.prev_gray = None;
        self.history.clear();
    }

    fn check_in_frame(&self, gray: &Mat, p: Point2<f32>) -> Result<()> {
        let half = self.config.patch_size as f32 / 2.0;
        let (w, h) = (gray.cols() as f32, gray.rows() as f32);
        if p.x - half < 0.0 || p.y - half < 0.0 || p.x + half >= w || p.y + half >= h {
            return Err(Error::FlowInfeasible(format!(
                "patch at ({:.0}, {:.0}) outside {w}x{h} frame",
                p.x, p.y
            )));
        }
        Ok(())
    }

    fn cohesion_score(&self) -> f64 {
        let idx: Vec<Vector2<f64>> = self.history.iter().map(|(a, _)| *a).collect();
        let mid: Vec<Vector2<f64>> = self.history.iter().map(|(_, b)| *b).collect();

        let corr_x = pearson(idx.iter().map(|v| v.x), mid.iter().map(|v| v.x), idx.len());
        let corr_y = pearson(idx.iter().map(|v| v.y), mid.iter().map(|v| v.y), idx.len());
        let avg_corr = 0.5 * (corr_x + corr_y);

        let mag_idx = idx.iter().map(Vector2::norm).sum::<f64>() / idx.len() as f64;
        let mag_mid = mid.iter().map(Vector2::norm).sum::<f64>() / mid.len() as f64;

        // immobile fingers provide no evidence
        if mag_idx < 1e-6 && mag_mid < 1e-6 {
            return 0.0;
        }

        let mag_score = if mag_idx < 1e-6 || mag_mid < 1e-6 {
            0.0
        } else {
            let ratio = mag_idx.min(mag_mid) / mag_idx.max(mag_mid);
            if (self.config.mag_ratio_min..=1.0).contains(&ratio) {
                1.0
            } else {
                0.0
            }
        };

        (0.7 * avg_corr.max(0.0) + 0.3 * mag_score).clamp(0.0, 1.0)
    }
}

/// Pearson correlation with zero-variance series treated as uncorrelated
/// (NumPy would yield NaN there; the fusion treats that as 0).
fn pearson(
    a: impl Iterator<Item = f64> + Clone,
    b: impl Iterator<Item = f64> + Clone,
    n: usize,
) -> f64 {
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean_a = a.clone().sum::<f64>() / n_f;
    let mean_b = b.clone().sum::<f64>() / n_f;

    let var_a: f64 = a.clone().map(|x| (x - mean_a).powi(2)).sum();
    let var_b: f64 = b.clone().map(|x| (x - mean_b).powi(2)).sum();
    if var_a < 1e-12 || var_b < 1e-12 {
        return 0.0;
    }

    let cov: f64 = a.zip(b).map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();
    cov / (var_a * var_b).sqrt()
}
