use criterion::{criterion_group, criterion_main, Criterion};
use touch_tracker_core::{OutputFrame, Parameters, SignalGrid, Tracker};

fn bump(width: usize, height: usize, cx: f32, cy: f32, peak: f32) -> SignalGrid {
    let mut g = SignalGrid::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let d2 = dx * dx + dy * dy;
            g.set(x, y, peak * (-d2 / 4.0).exp());
        }
    }
    g
}

fn bench_process(c: &mut Criterion) {
    let mut tracker = Tracker::new(64, 8, Parameters::default()).unwrap();
    let mut output = OutputFrame::new(8, 4);
    let input = bump(64, 8, 30.0, 3.0, 0.10);

    // warm the tracker up past the first-frame no-op and into a steady
    // state with an active touch before timing steady-state cost.
    for _ in 0..200 {
        tracker.process(&input, &mut output).unwrap();
    }

    c.bench_function("tracker_process_steady_state", |b| {
        b.iter(|| tracker.process(&input, &mut output).unwrap());
    });
}

criterion_group!(benches, bench_process);
criterion_main!(benches);
