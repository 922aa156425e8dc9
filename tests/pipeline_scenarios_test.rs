//! End-to-end pipeline scenarios: landmark streams in, scroll phases and
//! HUD messages out.

mod test_helpers;

use std::sync::{Arc, Mutex};

use glide::config::Config;
use glide::hud::{HudMessage, HudPublisher};
use glide::pipeline::Pipeline;
use glide::scroll::{ContinuousScrollAction, ScrollEvent, ScrollPhase, TestScrollSink};
use glide::velocity_controller::{ControllerState, Transition};

use test_helpers::{detection, high_five_hand, pinch_hand, shifted};

type Events = Arc<Mutex<Vec<ScrollEvent>>>;

fn pipeline_with_sink() -> (Pipeline, Events, HudPublisher) {
    let config = Config::default();
    let sink = TestScrollSink::new();
    let events = sink.events();
    let publisher = HudPublisher::detached();
    let action = ContinuousScrollAction::new(Box::new(sink), config.scroll.clone());
    (
        Pipeline::new(config, Some(action), publisher.clone()),
        events,
        publisher,
    )
}

fn phases(events: &Events) -> Vec<ScrollPhase> {
    events.lock().unwrap().iter().map(|e| e.phase).collect()
}

fn count_phase(events: &Events, phase: ScrollPhase) -> usize {
    events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.phase == phase)
        .count()
}

#[test]
fn test_pure_pinch_arms_after_four_frames_and_begins() {
    let (mut pipeline, events, _publisher) = pipeline_with_sink();
    let hand = pinch_hand(0.10, 10.0);

    for i in 0..10u64 {
        let outcome = pipeline
            .process_frame(Some(&detection(hand.clone())), None, i * 33)
            .unwrap();
        let signals = outcome.signals.unwrap();
        if i < 3 {
            assert!(!signals.is_touching, "touching too early at frame {i}");
            assert_eq!(outcome.transition, Transition::None);
        } else if i == 3 {
            assert!(signals.is_touching, "should arm on the 4th frame");
            assert_eq!(outcome.transition, Transition::Begin);
        } else {
            assert_eq!(outcome.state, ControllerState::Scrolling);
            assert_eq!(outcome.transition, Transition::None);
        }
    }

    let recorded = phases(&events);
    assert_eq!(recorded[0], ScrollPhase::Begin);
    assert_eq!(recorded.len(), 7, "one begin plus six updates");
    assert!(recorded[1..].iter().all(|p| *p == ScrollPhase::Change));

    // stationary pinch scrolls nowhere
    assert!(events.lock().unwrap().iter().all(|e| e.dy_px == 0.0));
}

#[test]
fn test_release_ends_episode_once() {
    let (mut pipeline, events, publisher) = pipeline_with_sink();
    let pinch = pinch_hand(0.10, 10.0);
    let apart = pinch_hand(0.50, 40.0);

    let mut t = 0u64;
    for _ in 0..10 {
        pipeline
            .process_frame(Some(&detection(pinch.clone())), None, t)
            .unwrap();
        t += 33;
    }
    publisher.take_pending();

    let mut end_frame = None;
    for i in 0..8u64 {
        let outcome = pipeline
            .process_frame(Some(&detection(apart.clone())), None, t)
            .unwrap();
        if outcome.transition == Transition::End {
            end_frame = Some(i);
        }
        t += 33;
    }

    assert!(end_frame.is_some(), "release never ended the episode");
    assert_eq!(count_phase(&events, ScrollPhase::End), 1);
    // nothing follows the End
    assert_eq!(*phases(&events).last().unwrap(), ScrollPhase::End);

    let pending = publisher.take_pending();
    assert!(pending.contains(&HudMessage::Hide));
    assert!(pending.contains(&HudMessage::Touchproof {
        active: false,
        hands: 1
    }));
}

#[test]
fn test_scroll_down_accumulates_pixels() {
    let (mut pipeline, events, _publisher) = pipeline_with_sink();
    let pinch = pinch_hand(0.10, 10.0);

    // arm while stationary
    let mut t = 0u64;
    for _ in 0..5 {
        pipeline
            .process_frame(Some(&detection(pinch.clone())), None, t)
            .unwrap();
        t += 10;
    }
    assert_eq!(count_phase(&events, ScrollPhase::Begin), 1);

    // move down 0.02 units per 10 ms frame = 2.0 units/s
    let mut last_vy = 0.0;
    for k in 1..=20u64 {
        let outcome = pipeline
            .process_frame(
                Some(&detection(shifted(&pinch, 0.02 * k as f64))),
                None,
                t,
            )
            .unwrap();
        last_vy = outcome.velocity.vy;
        t += 10;
    }

    // smoothed velocity converges on the true 2.0 units/s
    assert!(
        (1.6..=2.05).contains(&last_vy),
        "converged vy = {last_vy}"
    );

    // integrated deltas approach pixels_per_unit * traversed distance
    // (800 px/unit * 0.4 units), short of it by the EMA spin-up
    let total: f64 = events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.phase == ScrollPhase::Change)
        .map(|e| e.dy_px)
        .sum();
    assert!(
        (200.0..=325.0).contains(&total),
        "integrated delta = {total}"
    );
    assert!(events.lock().unwrap().iter().all(|e| e.dy_px >= 0.0));
}

#[test]
fn test_high_five_stops_that_frame() {
    let (mut pipeline, events, _publisher) = pipeline_with_sink();
    let pinch = pinch_hand(0.10, 10.0);

    let mut t = 0u64;
    for _ in 0..6 {
        pipeline
            .process_frame(Some(&detection(pinch.clone())), None, t)
            .unwrap();
        t += 33;
    }
    assert_eq!(count_phase(&events, ScrollPhase::End), 0);

    let outcome = pipeline
        .process_frame(Some(&detection(high_five_hand())), None, t)
        .unwrap();
    assert_eq!(outcome.transition, Transition::End);
    assert_eq!(outcome.state, ControllerState::Idle);
    assert_eq!(count_phase(&events, ScrollPhase::End), 1);
}

#[test]
fn test_hand_loss_within_grace_keeps_scrolling() {
    let (mut pipeline, events, _publisher) = pipeline_with_sink();
    let pinch = pinch_hand(0.10, 10.0);

    let mut t = 0u64;
    for _ in 0..5 {
        pipeline
            .process_frame(Some(&detection(pinch.clone())), None, t)
            .unwrap();
        t += 33;
    }

    // vanish for ~130 ms, under the 200 ms grace
    for _ in 0..5 {
        let outcome = pipeline.process_frame(None, None, t).unwrap();
        assert_eq!(outcome.state, ControllerState::Scrolling);
        t += 33;
    }

    // hand returns pinched: same episode continues
    let outcome = pipeline
        .process_frame(Some(&detection(pinch.clone())), None, t)
        .unwrap();
    assert_eq!(outcome.state, ControllerState::Scrolling);
    assert_eq!(outcome.transition, Transition::None);

    assert_eq!(count_phase(&events, ScrollPhase::Begin), 1);
    assert_eq!(count_phase(&events, ScrollPhase::End), 0);
}

#[test]
fn test_hand_loss_past_grace_ends_and_rearms() {
    let (mut pipeline, events, _publisher) = pipeline_with_sink();
    let pinch = pinch_hand(0.10, 10.0);

    let mut t = 0u64;
    for _ in 0..5 {
        pipeline
            .process_frame(Some(&detection(pinch.clone())), None, t)
            .unwrap();
        t += 33;
    }

    // vanish for well past the grace window
    let mut saw_end = false;
    for _ in 0..10 {
        let outcome = pipeline.process_frame(None, None, t).unwrap();
        if outcome.transition == Transition::End {
            saw_end = true;
        }
        t += 33;
    }
    assert!(saw_end, "grace expiry never ended the episode");
    assert_eq!(count_phase(&events, ScrollPhase::End), 1);

    // returning hand starts a fresh episode after the usual arming count
    for i in 0..4u64 {
        let outcome = pipeline
            .process_frame(Some(&detection(pinch.clone())), None, t)
            .unwrap();
        if i < 3 {
            assert_eq!(outcome.transition, Transition::None);
        } else {
            assert_eq!(outcome.transition, Transition::Begin);
        }
        t += 33;
    }
    assert_eq!(count_phase(&events, ScrollPhase::Begin), 2);
}

#[test]
fn test_identical_input_yields_identical_deltas() {
    let run = || {
        let (mut pipeline, events, _publisher) = pipeline_with_sink();
        let pinch = pinch_hand(0.10, 10.0);
        let mut t = 0u64;
        for _ in 0..5 {
            pipeline
                .process_frame(Some(&detection(pinch.clone())), None, t)
                .unwrap();
            t += 10;
        }
        for k in 1..=10u64 {
            pipeline
                .process_frame(
                    Some(&detection(shifted(&pinch, 0.015 * k as f64))),
                    None,
                    t,
                )
                .unwrap();
            t += 10;
        }
        pipeline
            .process_frame(Some(&detection(pinch_hand(0.6, 42.0))), None, t)
            .unwrap();
        let events = events.lock().unwrap();
        events.clone()
    };

    let first = run();
    let second = run();
    assert_eq!(first, second);
    assert!(!first.is_empty());
}
