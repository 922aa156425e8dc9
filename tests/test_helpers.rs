//! Shared helpers for integration tests: synthetic hand landmark builders.
//!
//! The synthetic hand points along +x in image space (wrist left, fingers
//! right), which makes the hand frame a pure translation and scaling: easy
//! to reason about in assertions.

use glide::landmarks::{
    Landmark, HandDetection, INDEX_MCP, INDEX_TIP, MIDDLE_MCP, MIDDLE_TIP, PINKY_MCP, PINKY_TIP,
    RING_MCP, RING_TIP, THUMB_TIP, WRIST,
};

/// Image size assumed by the builders (matches the pipeline's replay default)
pub const IMAGE_W: u32 = 960;
pub const IMAGE_H: u32 = 720;

/// Default finger length in normalized units.
///
/// 0.2 of a 960 px frame is 192 px, a close-ish hand with distance factor
/// (200 - 192) / 150 ≈ 0.053.
pub const FINGER_SCALE: f64 = 0.2;

fn blank_hand() -> Vec<Landmark> {
    let mut lms = vec![Landmark::new(0.3, 0.55); 21];
    lms[WRIST] = Landmark::new(0.2, 0.5);
    lms[MIDDLE_MCP] = Landmark::new(0.4, 0.5);
    lms[THUMB_TIP] = Landmark::new(0.3, 0.4);
    // curled ring and pinky: tips behind their knuckles
    lms[RING_MCP] = Landmark::new(0.4, 0.55);
    lms[RING_TIP] = Landmark::new(0.33, 0.55);
    lms[PINKY_MCP] = Landmark::new(0.4, 0.6);
    lms[PINKY_TIP] = Landmark::new(0.34, 0.6);
    lms
}

/// A hand whose index/middle fingertips sit `distance` finger-lengths apart
/// at `angle_deg` degrees as seen from the palm center, with the given
/// finger scale.
#[must_use]
pub fn pinch_hand_scaled(distance: f64, angle_deg: f64, scale: f64) -> Vec<Landmark> {
    let mut lms = blank_hand();

    // palm center is the wrist / middle-MCP midpoint
    let palm = (0.3, 0.5);

    // place tips symmetrically about the hand axis: the chord between two
    // points at radius r separated by angle_deg is the requested distance
    let half = (angle_deg / 2.0).to_radians();
    let radius = if half.sin().abs() < 1e-9 {
        3.0
    } else {
        distance / (2.0 * half.sin())
    };
    let tip_a = (
        palm.0 + scale * radius * half.cos(),
        palm.1 + scale * radius * half.sin(),
    );
    let tip_b = (
        palm.0 + scale * radius * half.cos(),
        palm.1 - scale * radius * half.sin(),
    );

    lms[INDEX_TIP] = Landmark::new(tip_a.0, tip_a.1);
    lms[MIDDLE_TIP] = Landmark::new(tip_b.0, tip_b.1);
    // knuckle one finger-length behind the tip keeps the scale exact
    lms[INDEX_MCP] = Landmark::new(tip_a.0 - scale, tip_a.1);

    lms
}

/// Pinch hand at the default scale
#[must_use]
pub fn pinch_hand(distance: f64, angle_deg: f64) -> Vec<Landmark> {
    pinch_hand_scaled(distance, angle_deg, FINGER_SCALE)
}

/// All four non-thumb fingers extended along the hand axis
#[must_use]
pub fn high_five_hand() -> Vec<Landmark> {
    let mut lms = blank_hand();
    let fingers = [
        (INDEX_MCP, INDEX_TIP, 0.45),
        (MIDDLE_MCP, MIDDLE_TIP, 0.5),
        (RING_MCP, RING_TIP, 0.55),
        (PINKY_MCP, PINKY_TIP, 0.6),
    ];
    for (mcp, tip, y) in fingers {
        lms[mcp] = Landmark::new(0.4, y);
        lms[tip] = Landmark::new(0.4 + FINGER_SCALE, y);
    }
    lms
}

/// Shift a hand vertically (positive = down the image)
#[must_use]
pub fn shifted(lms: &[Landmark], dy: f64) -> Vec<Landmark> {
    lms.iter()
        .map(|lm| Landmark {
            x: lm.x,
            y: lm.y + dy,
            visibility: lm.visibility,
        })
        .collect()
}

/// Wrap landmarks as a full-confidence detection
#[must_use]
pub fn detection(landmarks: Vec<Landmark>) -> HandDetection {
    HandDetection {
        landmarks,
        confidence: 1.0,
    }
}

#[test]
fn test_pinch_builder_hits_requested_geometry() {
    use glide::alignment::HandFrame;

    let lms = pinch_hand(0.10, 10.0);
    let frame = HandFrame::from_landmarks(&lms, IMAGE_W, IMAGE_H).unwrap();

    assert!((frame.scale - FINGER_SCALE).abs() < 1e-9);
    assert!((frame.normalized_fingertip_distance(&lms) - 0.10).abs() < 1e-9);
    assert!((frame.fingertip_angle_deg(&lms).unwrap() - 10.0).abs() < 1e-6);
}

#[test]
fn test_high_five_builder_is_high_five() {
    use glide::alignment::HandFrame;
    use glide::config::PoseConfig;
    use glide::landmarks::is_high_five;

    let lms = high_five_hand();
    let frame = HandFrame::from_landmarks(&lms, IMAGE_W, IMAGE_H).unwrap();
    assert!(is_high_five(&lms, &frame, &PoseConfig::default()));

    let pinch = pinch_hand(0.10, 10.0);
    let frame = HandFrame::from_landmarks(&pinch, IMAGE_W, IMAGE_H).unwrap();
    assert!(!is_high_five(&pinch, &frame, &PoseConfig::default()));
}
