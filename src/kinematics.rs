//! Ring buffer of timestamped fingertip samples.

use std::collections::VecDeque;

use nalgebra::Point2;

/// One fingertip-midpoint observation
#[derive(Debug, Clone, Copy)]
pub struct FingertipSample {
    /// Frame timestamp in milliseconds
    pub t_ms: u64,
    /// Midpoint of the index/middle fingertips in normalized image coords
    pub mid_image: Point2<f64>,
    /// The same midpoint in hand-frame coordinates
    pub mid_hand: Point2<f64>,
}

/// Bounded history of fingertip samples.
///
/// Capacity is fixed at construction; pushing into a full buffer evicts the
/// oldest sample, so steady-state operation never grows the heap.
#[derive(Debug)]
pub struct KinematicsBuffer {
    samples: VecDeque<FingertipSample>,
    capacity: usize,
}

impl KinematicsBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: FingertipSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Most recent sample, if any
    #[must_use]
    pub fn latest(&self) -> Option<&FingertipSample> {
        self.samples.back()
    }

    /// Samples whose timestamp falls within the trailing `window_ms` window
    pub fn window(&self, now_ms: u64, window_ms: u64) -> impl Iterator<Item = &FingertipSample> {
        let cutoff = now_ms.saturating_sub(window_ms);
        self.samples.iter().filter(move |s| s.t_ms >= cutoff)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
