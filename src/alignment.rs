//! Hand-frame alignment: translation, rotation and scale normalization of
//! image-space landmarks.
//!
//! The hand frame has its origin at the palm center, its x-axis along the
//! wrist → middle-MCP direction, and unit length equal to the index finger
//! length. All TouchProof geometry (fingertip distance, fingertip angle) is
//! measured in this frame so it is invariant to where the hand sits in the
//! image, how it is rotated, and how large it appears.

use nalgebra::{Point2, Rotation2, Vector2};

use crate::landmarks::{Landmark, INDEX_MCP, INDEX_TIP, LANDMARK_COUNT, MIDDLE_MCP, MIDDLE_TIP, WRIST};
use crate::{Error, Result};

/// Per-frame hand alignment parameters
#[derive(Debug, Clone)]
pub struct HandFrame {
    /// Palm center in normalized image coordinates
    pub palm_center: Point2<f64>,
    /// Hand orientation, wrist → middle-MCP, radians
    pub theta: f64,
    /// Index finger length in normalized image units
    pub scale: f64,
    image_width: u32,
    image_height: u32,
    rotation: Rotation2<f64>,
}

/// Finger length (px) at which the hand is considered as close as it gets
pub const DISTANCE_NEAR_PX: f64 = 200.0;
/// Finger length (px) at which the hand is considered far away
pub const DISTANCE_FAR_PX: f64 = 50.0;

impl HandFrame {
    /// Derive the hand frame from a full set of landmarks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateHand`] when fewer than 21 landmarks are
    /// given or the index finger length collapses to zero. Callers drop the
    /// frame and hold state.
    pub fn from_landmarks(landmarks: &[Landmark], image_width: u32, image_height: u32) -> Result<Self> {
        if landmarks.len() < LANDMARK_COUNT {
            return Err(Error::DegenerateHand(format!(
                "expected {LANDMARK_COUNT} landmarks, got {}",
                landmarks.len()
            )));
        }

        let wrist = landmarks[WRIST].point();
        let middle_mcp = landmarks[MIDDLE_MCP].point();
        let palm_center = nalgebra::center(&wrist, &middle_mcp);

        let axis = middle_mcp - wrist;
        let theta = axis.y.atan2(axis.x);

        let scale = (landmarks[INDEX_TIP].point() - landmarks[INDEX_MCP].point()).norm();
        if scale <= 0.0 {
            return Err(Error::DegenerateHand("zero finger length".to_string()));
        }

        Ok(Self {
            palm_center,
            theta,
            scale,
            image_width,
            image_height,
            rotation: Rotation2::new(-theta),
        })
    }

    /// Transform a normalized image point into hand-frame coordinates
    #[must_use]
    pub fn to_hand_frame(&self, p: Point2<f64>) -> Point2<f64> {
        let rel = self.rotation * (p - self.palm_center);
        Point2::from(rel / self.scale)
    }

    /// Inverse of [`Self::to_hand_frame`]
    #[must_use]
    pub fn from_hand_frame(&self, p: Point2<f64>) -> Point2<f64> {
        let rel = self.rotation.inverse() * (p.coords * self.scale);
        self.palm_center + rel
    }

    /// Index/middle fingertip separation in finger-length units
    #[must_use]
    pub fn normalized_fingertip_distance(&self, landmarks: &[Landmark]) -> f64 {
        let idx = self.to_hand_frame(landmarks[INDEX_TIP].point());
        let mid = self.to_hand_frame(landmarks[MIDDLE_TIP].point());
        (idx - mid).norm()
    }

    /// Angle between the palm-center → fingertip vectors, degrees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateHand`] when either tip coincides with the
    /// palm center (zero denominator); the frame is dropped.
    pub fn fingertip_angle_deg(&self, landmarks: &[Landmark]) -> Result<f64> {
        let idx: Vector2<f64> = self.to_hand_frame(landmarks[INDEX_TIP].point()).coords;
        let mid: Vector2<f64> = self.to_hand_frame(landmarks[MIDDLE_TIP].point()).coords;

        let idx_len = idx.norm();
        let mid_len = mid.norm();
        if idx_len < 1e-9 || mid_len < 1e-9 {
            return Err(Error::DegenerateHand(
                "fingertip coincides with palm center".to_string(),
            ));
        }

        let cos_angle = (idx.dot(&mid) / (idx_len * mid_len)).clamp(-1.0, 1.0);
        Ok(cos_angle.acos().to_degrees())
    }

    /// Index finger length in pixels
    #[must_use]
    pub fn finger_length_px(&self) -> f64 {
        self.scale * f64::from(self.image_width.max(self.image_height))
    }

    /// Camera-distance proxy: 0 = very close, 1 = far away.
    ///
    /// Finger length in pixels stands in for hand-to-camera distance;
    /// 200 px or longer maps to 0, 50 px or shorter maps to 1.
    #[must_use]
    pub fn distance_factor(&self) -> f64 {
        ((DISTANCE_NEAR_PX - self.finger_length_px()) / (DISTANCE_NEAR_PX - DISTANCE_FAR_PX))
            .clamp(0.0, 1.0)
    }

    /// Index and middle fingertip positions in pixel coordinates
    #[must_use]
    pub fn fingertip_pixels(&self, landmarks: &[Landmark]) -> (Point2<f32>, Point2<f32>) {
        let to_px = |lm: &Landmark| {
            Point2::new(
                (lm.x * f64::from(self.image_width)) as f32,
                (lm.y * f64::from(self.image_height)) as f32,
            )
        };
        (to_px(&landmarks[INDEX_TIP]), to_px(&landmarks[MIDDLE_TIP]))
    }

    /// Midpoint of the index and middle fingertips in image coordinates
    #[must_use]
    pub fn fingertip_midpoint(landmarks: &[Landmark]) -> Point2<f64> {
        nalgebra::center(
            &landmarks[INDEX_TIP].point(),
            &landmarks[MIDDLE_TIP].point(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::LANDMARK_COUNT;

    fn base_landmarks() -> Vec<Landmark> {
        let mut lms = vec![Landmark::new(0.5, 0.5); LANDMARK_COUNT];
        lms[WRIST] = Landmark::new(0.5, 0.8);
        lms[MIDDLE_MCP] = Landmark::new(0.5, 0.6);
        lms[INDEX_MCP] = Landmark::new(0.45, 0.6);
        lms[INDEX_TIP] = Landmark::new(0.45, 0.4);
        lms[MIDDLE_TIP] = Landmark::new(0.5, 0.38);
        lms
    }

    #[test]
    fn test_frame_parameters() {
        let lms = base_landmarks();
        let frame = HandFrame::from_landmarks(&lms, 640, 480).unwrap();

        assert!((frame.palm_center.x - 0.5).abs() < 1e-12);
        assert!((frame.palm_center.y - 0.7).abs() < 1e-12);
        // wrist -> middle MCP points straight up in image coords
        assert!((frame.theta - (-std::f64::consts::FRAC_PI_2)).abs() < 1e-12);
        assert!((frame.scale - 0.2).abs() < 1e-12);
        assert!((frame.finger_length_px() - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_transform() {
        let lms = base_landmarks();
        let frame = HandFrame::from_landmarks(&lms, 640, 480).unwrap();
        let p = Point2::new(0.31, 0.77);
        let back = frame.from_hand_frame(frame.to_hand_frame(p));
        assert!((back - p).norm() < 1e-12);
    }

    #[test]
    fn test_degenerate_scale_rejected() {
        let mut lms = base_landmarks();
        lms[INDEX_TIP] = lms[INDEX_MCP];
        let err = HandFrame::from_landmarks(&lms, 640, 480).unwrap_err();
        assert!(matches!(err, Error::DegenerateHand(_)));
    }

    #[test]
    fn test_short_landmark_list_rejected() {
        let lms = vec![Landmark::new(0.5, 0.5); 10];
        assert!(HandFrame::from_landmarks(&lms, 640, 480).is_err());
    }

    #[test]
    fn test_translation_rotation_invariance() {
        let lms = base_landmarks();
        let frame = HandFrame::from_landmarks(&lms, 640, 480).unwrap();
        let d0 = frame.normalized_fingertip_distance(&lms);
        let a0 = frame.fingertip_angle_deg(&lms).unwrap();
        let df0 = frame.distance_factor();

        let angle = 0.7_f64;
        let rot = Rotation2::new(angle);
        let shift = Vector2::new(0.11, -0.07);
        let moved: Vec<Landmark> = lms
            .iter()
            .map(|lm| {
                let p = rot * lm.point() + shift;
                Landmark::new(p.x, p.y)
            })
            .collect();

        let frame2 = HandFrame::from_landmarks(&moved, 640, 480).unwrap();
        assert!((frame2.normalized_fingertip_distance(&moved) - d0).abs() < 1e-6);
        assert!((frame2.fingertip_angle_deg(&moved).unwrap() - a0).abs() < 1e-6);
        assert!((frame2.distance_factor() - df0).abs() < 1e-6);
    }

    #[test]
    fn test_uniform_scale_invariance() {
        let lms = base_landmarks();
        let frame = HandFrame::from_landmarks(&lms, 640, 480).unwrap();
        let d0 = frame.normalized_fingertip_distance(&lms);
        let a0 = frame.fingertip_angle_deg(&lms).unwrap();

        let center = Point2::new(0.5, 0.5);
        let scaled: Vec<Landmark> = lms
            .iter()
            .map(|lm| {
                let p = center + (lm.point() - center) * 0.6;
                Landmark::new(p.x, p.y)
            })
            .collect();

        let frame2 = HandFrame::from_landmarks(&scaled, 640, 480).unwrap();
        assert!((frame2.normalized_fingertip_distance(&scaled) - d0).abs() < 1e-6);
        assert!((frame2.fingertip_angle_deg(&scaled).unwrap() - a0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_factor_range() {
        let lms = base_landmarks();
        // scale 0.2 on a 640px image -> 128px finger -> df = (200-128)/150
        let frame = HandFrame::from_landmarks(&lms, 640, 480).unwrap();
        assert!((frame.distance_factor() - 0.48).abs() < 1e-9);

        // tiny hand saturates at 1
        let center = Point2::new(0.5, 0.5);
        let tiny: Vec<Landmark> = lms
            .iter()
            .map(|lm| {
                let p = center + (lm.point() - center) * 0.05;
                Landmark::new(p.x, p.y)
            })
            .collect();
        let frame2 = HandFrame::from_landmarks(&tiny, 640, 480).unwrap();
        assert!((frame2.distance_factor() - 1.0).abs() < 1e-12);
    }
}
