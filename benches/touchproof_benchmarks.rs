//! Benchmarks for the per-frame fusion hot path

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glide::alignment::HandFrame;
use glide::config::{Config, TouchProofConfig, VelocityConfig};
use glide::kinematics::{FingertipSample, KinematicsBuffer};
use glide::landmarks::{Landmark, INDEX_MCP, INDEX_TIP, MIDDLE_MCP, MIDDLE_TIP, WRIST};
use glide::optical_flow::OpticalFlowProbe;
use glide::touchproof::{fusion_weights, TouchProofDetector};
use glide::velocity_tracker::VelocityTracker;
use nalgebra::Point2;

fn pinch_landmarks() -> Vec<Landmark> {
    let mut lms = vec![Landmark::new(0.3, 0.55); 21];
    lms[WRIST] = Landmark::new(0.2, 0.5);
    lms[MIDDLE_MCP] = Landmark::new(0.4, 0.5);
    lms[INDEX_TIP] = Landmark::new(0.52, 0.49);
    lms[MIDDLE_TIP] = Landmark::new(0.52, 0.51);
    lms[INDEX_MCP] = Landmark::new(0.32, 0.49);
    lms
}

fn benchmark_alignment(c: &mut Criterion) {
    let lms = pinch_landmarks();
    c.bench_function("hand_frame_from_landmarks", |b| {
        b.iter(|| HandFrame::from_landmarks(black_box(&lms), 960, 720).unwrap());
    });

    let frame = HandFrame::from_landmarks(&lms, 960, 720).unwrap();
    c.bench_function("fingertip_metrics", |b| {
        b.iter(|| {
            let d = frame.normalized_fingertip_distance(black_box(&lms));
            let a = frame.fingertip_angle_deg(black_box(&lms)).unwrap();
            black_box((d, a, frame.distance_factor()))
        });
    });
}

fn benchmark_fusion(c: &mut Criterion) {
    c.bench_function("fusion_weights_interpolated", |b| {
        b.iter(|| {
            for i in 0..100u32 {
                let df = f64::from(i) / 100.0;
                black_box(fusion_weights(black_box(df)).renormalized(false, true));
            }
        });
    });

    let lms = pinch_landmarks();
    let frame = HandFrame::from_landmarks(&lms, 960, 720).unwrap();
    c.bench_function("touchproof_update_no_flow", |b| {
        let mut detector = TouchProofDetector::new(
            TouchProofConfig::default(),
            Config::default().hand_loss_grace_ms,
        );
        let mut flow = OpticalFlowProbe::new(Default::default());
        let mut t_ms = 0u64;
        b.iter(|| {
            t_ms += 33;
            detector
                .update(black_box(&lms), &frame, None, &mut flow, t_ms)
                .unwrap()
        });
    });
}

fn benchmark_velocity(c: &mut Criterion) {
    c.bench_function("velocity_tracker_update", |b| {
        let mut tracker = VelocityTracker::new(VelocityConfig::default());
        let mut buffer = KinematicsBuffer::new(64);
        let mut t_ms = 0u64;
        b.iter(|| {
            t_ms += 10;
            buffer.push(FingertipSample {
                t_ms,
                mid_image: Point2::new(0.5, 0.3 + (t_ms as f64 * 0.0001).sin() * 0.1),
                mid_hand: Point2::new(0.0, 0.0),
            });
            black_box(tracker.update(&buffer, t_ms))
        });
    });
}

criterion_group!(
    benches,
    benchmark_alignment,
    benchmark_fusion,
    benchmark_velocity
);
criterion_main!(benches);
