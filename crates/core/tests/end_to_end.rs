//! End-to-end scenarios against the literal stimuli described for the
//! tracker's testable properties: a bounded, stable set of touches from a
//! stream of synthetic pressure images.

use approx::assert_relative_eq;
use touch_tracker_core::{OutputFrame, Parameters, SignalGrid, Tracker};

const W: usize = 64;
const H: usize = 8;

fn params() -> Parameters {
    Parameters::default()
        .with_on_threshold(0.03)
        .with_lopass(10.0)
        .with_max_force(1.0)
        .with_max_touches(4)
        .with_quantize_to_key(false)
        .with_sample_rate(1000.0)
}

fn bump(cx: f32, cy: f32, peak: f32) -> SignalGrid {
    let mut g = SignalGrid::new(W, H);
    for y in 0..H {
        for x in 0..W {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let d2 = dx * dx + dy * dy;
            g.set(x, y, peak * (-d2 / 4.0).exp());
        }
    }
    g
}

fn active_touch_xy(tracker: &Tracker) -> Vec<(f32, f32)> {
    tracker
        .touch_table()
        .iter_active()
        .map(|(_, t)| (t.x, t.y))
        .collect()
}

#[test]
fn scenario_1_all_zeros_emits_nothing() {
    let mut tracker = Tracker::new(W, H, params()).unwrap();
    let mut output = OutputFrame::new(8, 4);
    let zero = SignalGrid::new(W, H);
    for _ in 0..500 {
        tracker.process(&zero, &mut output).unwrap();
    }
    assert_eq!(tracker.touch_table().count_active(), 0);
    for row in 0..output.rows() {
        assert_relative_eq!(output.get(row, 4), 0.0); // age column
    }
}

#[test]
fn scenario_2_single_sustained_bump_births_one_touch_near_center() {
    let mut tracker = Tracker::new(W, H, params()).unwrap();
    let mut output = OutputFrame::new(8, 4);
    let zero = SignalGrid::new(W, H);
    for _ in 0..50 {
        tracker.process(&zero, &mut output).unwrap();
    }
    let input = bump(30.0, 3.0, 0.10);
    for _ in 0..200 {
        tracker.process(&input, &mut output).unwrap();
    }
    let active: Vec<_> = active_touch_xy(&tracker);
    assert_eq!(active.len(), 1);
    assert_relative_eq!(active[0].0, 30.0, epsilon = 0.2);
    assert_relative_eq!(active[0].1, 3.0, epsilon = 0.2);
}

#[test]
fn scenario_3_two_separated_bumps_get_distinct_keys() {
    let mut tracker = Tracker::new(W, H, params()).unwrap();
    let mut output = OutputFrame::new(8, 4);
    let zero = SignalGrid::new(W, H);
    for _ in 0..50 {
        tracker.process(&zero, &mut output).unwrap();
    }
    let mut input = bump(20.0, 3.0, 0.10);
    input.add(&bump(40.0, 3.0, 0.10));
    for _ in 0..200 {
        tracker.process(&input, &mut output).unwrap();
    }
    assert_eq!(tracker.touch_table().count_active(), 2);
    let keys: Vec<i32> = tracker
        .touch_table()
        .iter_active()
        .map(|(_, t)| t.key)
        .collect();
    assert_ne!(keys[0], keys[1]);
}

#[test]
fn scenario_4_weak_neighbor_is_inhibited_by_strong_touch() {
    let mut tracker = Tracker::new(W, H, params()).unwrap();
    let mut output = OutputFrame::new(8, 4);
    let zero = SignalGrid::new(W, H);
    for _ in 0..50 {
        tracker.process(&zero, &mut output).unwrap();
    }
    let mut input = bump(30.0, 3.0, 0.10);
    input.add(&bump(32.0, 3.0, 0.02));
    for _ in 0..200 {
        tracker.process(&input, &mut output).unwrap();
    }
    assert_eq!(tracker.touch_table().count_active(), 1);
}

#[test]
fn scenario_5_dropped_input_releases_the_touch() {
    let mut tracker = Tracker::new(W, H, params()).unwrap();
    let mut output = OutputFrame::new(8, 4);
    let zero = SignalGrid::new(W, H);
    for _ in 0..50 {
        tracker.process(&zero, &mut output).unwrap();
    }
    let input = bump(30.0, 3.0, 0.10);
    for _ in 0..200 {
        tracker.process(&input, &mut output).unwrap();
    }
    assert_eq!(tracker.touch_table().count_active(), 1);

    for _ in 0..300 {
        tracker.process(&zero, &mut output).unwrap();
    }
    assert_eq!(tracker.touch_table().count_active(), 0);
}

#[test]
fn scenario_6_sliding_bump_stays_single_touch_with_monotone_x() {
    let mut tracker = Tracker::new(W, H, params()).unwrap();
    let mut output = OutputFrame::new(8, 4);

    let mut last_x: Option<f32> = None;
    for frame in 0..1000 {
        let t = frame as f32 / 999.0;
        let cx = 10.0 + t * 40.0;
        let input = bump(cx, 3.0, 0.10);
        tracker.process(&input, &mut output).unwrap();

        assert!(tracker.touch_table().count_active() <= 1);
        if let Some((x, _)) = active_touch_xy(&tracker).first() {
            if let Some(lx) = last_x {
                assert!(*x >= lx - 1e-3, "touch x regressed: {} -> {}", lx, x);
            }
            last_x = Some(*x);
        }
    }
}
