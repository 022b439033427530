//! Stand-in for the external capture thread described in the core's
//! concurrency model: pushes raw pressure frames into a bounded,
//! overwrite-oldest channel at a fixed period, mirroring the running-flag
//! + background-thread shape of a hardware poll loop.

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use touch_tracker_core::SignalGrid;

/// Synthesizes a Gaussian pressure bump sweeping across the sensor, useful
/// for exercising the tracker without real hardware.
pub struct SyntheticSource {
    width: usize,
    height: usize,
    period_frames: u32,
    frame: u32,
}

impl SyntheticSource {
    pub fn new(width: usize, height: usize, period_frames: u32) -> Self {
        Self {
            width,
            height,
            period_frames: period_frames.max(1),
            frame: 0,
        }
    }

    pub fn next_frame(&mut self) -> SignalGrid {
        let t = (self.frame % self.period_frames) as f32 / self.period_frames as f32;
        let cx = 4.0 + t * (self.width as f32 - 8.0);
        let cy = self.height as f32 / 2.0;
        self.frame += 1;

        let mut g = SignalGrid::new(self.width, self.height);
        for y in 0..self.height {
            for x in 0..self.width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let d2 = dx * dx + dy * dy;
                g.set(x, y, 0.10 * (-d2 / 4.0).exp());
            }
        }
        g
    }
}

/// Replays frames from a newline-delimited JSON file, one row-major
/// flattened `width * height` array of `f32` per line. A convenience for
/// feeding recorded sensor data through the same capture-thread path the
/// synthetic source uses; not a file format the core itself knows about.
pub struct ReplaySource {
    width: usize,
    height: usize,
    lines: Lines<BufReader<File>>,
}

impl ReplaySource {
    pub fn open(path: &std::path::Path, width: usize, height: usize) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("opening replay file {}", path.display()))?;
        Ok(Self {
            width,
            height,
            lines: BufReader::new(file).lines(),
        })
    }

    /// Returns `None` once the file is exhausted or a malformed line is hit.
    pub fn next_frame(&mut self) -> Option<SignalGrid> {
        let line = self.lines.next()?.ok()?;
        if line.trim().is_empty() {
            return self.next_frame();
        }
        let values: Vec<f32> = serde_json::from_str(&line).ok()?;
        if values.len() != self.width * self.height {
            return None;
        }
        let mut g = SignalGrid::new(self.width, self.height);
        g.as_mut_slice().copy_from_slice(&values);
        Some(g)
    }
}

/// Either a live (synthetic) generator or a finite recorded replay.
pub enum FrameSource {
    Synthetic(SyntheticSource),
    Replay(ReplaySource),
}

impl FrameSource {
    fn next_frame(&mut self) -> Option<SignalGrid> {
        match self {
            FrameSource::Synthetic(s) => Some(s.next_frame()),
            FrameSource::Replay(r) => r.next_frame(),
        }
    }
}

pub struct CaptureThread {
    running: Arc<AtomicBool>,
}

impl CaptureThread {
    /// Start pushing frames from `source` at `period` into a bounded,
    /// overwrite-oldest channel. Returns the receiving end. The capture
    /// thread exits on its own once a `Replay` source is exhausted.
    pub fn start(source: FrameSource, period: Duration) -> Result<(Self, Receiver<SignalGrid>)> {
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx): (Sender<SignalGrid>, Receiver<SignalGrid>) = crossbeam_channel::bounded(1);

        let thread_running = Arc::clone(&running);
        std::thread::spawn(move || capture_loop(source, period, thread_running, tx));

        Ok((Self { running }, rx))
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

fn capture_loop(
    mut source: FrameSource,
    period: Duration,
    running: Arc<AtomicBool>,
    sender: Sender<SignalGrid>,
) {
    while running.load(Ordering::SeqCst) {
        let Some(frame) = source.next_frame() else {
            break;
        };
        // Overwrite-oldest: drop a stale pending frame rather than block
        // the capture thread on a slow consumer.
        if sender.is_full() {
            let _ = sender.try_recv();
        }
        let _ = sender.try_send(frame);
        std::thread::sleep(period);
    }
}
