//! Hand landmark types and the landmark provider capability.
//!
//! Landmark detection itself is an external collaborator: anything that can
//! produce 21-point hands per frame (a MediaPipe bridge, a replay file, a
//! synthetic test source) implements [`HandProvider`].

use nalgebra::Point2;
use opencv::core::Mat;
use serde::{Deserialize, Serialize};

use crate::config::PoseConfig;
use crate::Result;

/// Wrist landmark index
pub const WRIST: usize = 0;
/// Thumb fingertip
pub const THUMB_TIP: usize = 4;
/// Index finger knuckle (metacarpophalangeal joint)
pub const INDEX_MCP: usize = 5;
/// Index fingertip
pub const INDEX_TIP: usize = 8;
/// Middle finger knuckle
pub const MIDDLE_MCP: usize = 9;
/// Middle fingertip
pub const MIDDLE_TIP: usize = 12;
/// Ring finger knuckle
pub const RING_MCP: usize = 13;
/// Ring fingertip
pub const RING_TIP: usize = 16;
/// Pinky knuckle
pub const PINKY_MCP: usize = 17;
/// Pinky fingertip
pub const PINKY_TIP: usize = 20;

/// Number of landmarks in a full hand
pub const LANDMARK_COUNT: usize = 21;

/// A single hand landmark in normalized image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    /// Horizontal position in `[0, 1]`
    pub x: f64,
    /// Vertical position in `[0, 1]`
    pub y: f64,
    /// Per-point visibility in `[0, 1]`, when the detector reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            visibility: None,
        }
    }

    /// Position as a point in normalized image coordinates
    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }
}

/// One detected hand: 21 landmarks plus detector confidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandDetection {
    pub landmarks: Vec<Landmark>,
    pub confidence: f64,
}

impl HandDetection {
    /// True when all 21 landmarks are present
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.landmarks.len() >= LANDMARK_COUNT
    }
}

/// Capability trait for per-frame hand landmark detection.
///
/// `frame` may be empty when the pipeline runs without a camera (replay
/// sources ignore it). Returns `Ok(None)` when no hand is found.
pub trait HandProvider {
    fn detect(&mut self, frame: &Mat, t_ms: u64) -> Result<Option<HandDetection>>;
}

/// Provider that never finds a hand; stands in when no detector is wired up
pub struct NullHandProvider;

impl HandProvider for NullHandProvider {
    fn detect(&mut self, _frame: &Mat, _t_ms: u64) -> Result<Option<HandDetection>> {
        Ok(None)
    }
}

/// High-five test: all four non-thumb fingers extended.
///
/// Extension is measured in the hand frame, whose x-axis runs wrist to
/// middle-MCP (along the fingers): a finger counts as extended when its tip
/// sits at least `margin` finger-lengths further along that axis than its
/// knuckle.
pub fn is_high_five(
    landmarks: &[Landmark],
    frame: &crate::alignment::HandFrame,
    pose: &PoseConfig,
) -> bool {
    if landmarks.len() < LANDMARK_COUNT {
        return false;
    }

    let fingers = [
        (INDEX_TIP, INDEX_MCP),
        (MIDDLE_TIP, MIDDLE_MCP),
        (RING_TIP, RING_MCP),
        (PINKY_TIP, PINKY_MCP),
    ];

    fingers.iter().all(|&(tip, mcp)| {
        let tip_h = frame.to_hand_frame(landmarks[tip].point());
        let mcp_h = frame.to_hand_frame(landmarks[mcp].point());
        tip_h.x - mcp_h.x >= pose.extension_margin
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landmark_point() {
        let lm = Landmark::new(0.25, 0.75);
        assert_eq!(lm.point(), Point2::new(0.25, 0.75));
        assert!(lm.visibility.is_none());
    }

    #[test]
    fn test_detection_completeness() {
        let det = HandDetection {
            landmarks: vec![Landmark::new(0.0, 0.0); LANDMARK_COUNT],
            confidence: 0.9,
        };
        assert!(det.is_complete());

        let partial = HandDetection {
            landmarks: vec![Landmark::new(0.0, 0.0); 5],
            confidence: 0.9,
        };
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_landmark_json_roundtrip() {
        let lm = Landmark {
            x: 0.5,
            y: 0.5,
            visibility: Some(0.8),
        };
        let json = serde_json::to_string(&lm).unwrap();
        let back: Landmark = serde_json::from_str(&json).unwrap();
        assert_eq!(lm, back);

        // visibility is optional on the wire
        let bare: Landmark = serde_json::from_str(r#"{"x":0.1,"y":0.2}"#).unwrap();
        assert!(bare.visibility.is_none());
    }
}
