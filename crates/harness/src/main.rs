//! touch-tracker-harness
//!
//! Drives touch-tracker-core with a synthetic capture thread standing in
//! for real sensor acquisition: one thread produces frames at a fixed
//! period, the main thread plays the tracker thread's role, consuming
//! them and logging the resulting touches.

mod capture;
mod rt;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use log::{info, LevelFilter};
use parking_lot::Mutex;

use touch_tracker_core::{OutputFrame, Parameters, Tracker};

use crate::capture::{CaptureThread, FrameSource, ReplaySource, SyntheticSource};

#[derive(Parser)]
#[command(name = "touch-tracker-harness")]
#[command(about = "Synthetic capture + tracker-thread demo for touch-tracker-core")]
struct Cli {
    /// Number of frames to run before exiting.
    #[arg(short = 'n', long, default_value_t = 2000)]
    frames: u32,

    /// Capture period in microseconds (1000 = 1 kHz).
    #[arg(long, default_value_t = 1000)]
    period_us: u64,

    /// Sensor width in cells.
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Sensor height in cells.
    #[arg(long, default_value_t = 8)]
    height: usize,

    /// Maximum simultaneously tracked touches.
    #[arg(long, default_value_t = 4)]
    max_touches: usize,

    /// Load a parameter preset from JSON matching `Parameters`' serde layout.
    #[arg(short = 'f', long)]
    params_file: Option<std::path::PathBuf>,

    /// Replay frames from a newline-delimited JSON file of flattened
    /// `width * height` arrays instead of generating synthetic ones.
    #[arg(long)]
    replay: Option<std::path::PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .init();
}

fn load_parameters(cli: &Cli) -> Result<Parameters> {
    let base = match &cli.params_file {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading parameter preset {}", path.display()))?;
            serde_json::from_str(&text).context("parsing parameter preset")?
        }
        None => Parameters::default(),
    };
    Ok(base.with_max_touches(cli.max_touches))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let params = load_parameters(&cli)?;
    params.validate().context("invalid parameters")?;

    let params = Arc::new(Mutex::new(params));
    let mut tracker = Tracker::new(cli.width, cli.height, *params.lock())?;

    tracker.set_listener(|_signal, _normalize_map, avg_distance| {
        info!("calibration complete, avg template distance = {avg_distance}");
    });

    let source = match &cli.replay {
        Some(path) => FrameSource::Replay(ReplaySource::open(path, cli.width, cli.height)?),
        None => FrameSource::Synthetic(SyntheticSource::new(cli.width, cli.height, 500)),
    };
    let period = Duration::from_micros(cli.period_us);
    let (capture, frames) = CaptureThread::start(source, period)?;

    rt::try_enable_realtime_scheduling();

    let mut output = OutputFrame::new(8, cli.max_touches);
    for i in 0..cli.frames {
        let frame = match frames.recv() {
            Ok(frame) => frame,
            Err(_) => {
                info!("frame {i}: capture source exhausted, stopping");
                break;
            }
        };

        {
            let snapshot = *params.lock();
            tracker.set_parameters(snapshot)?;
        }

        tracker.process(&frame, &mut output)?;

        if i % 200 == 0 {
            let active = tracker.touch_table().count_active();
            info!("frame {i}: {active} active touch(es)");
            for (slot, touch) in tracker.touch_table().iter_active() {
                info!(
                    "  slot {slot}: key={} x={:.2} y={:.2} z={:.3} age={}",
                    touch.key, touch.x, touch.y, touch.zf, touch.age
                );
            }
        }
    }

    capture.stop();
    Ok(())
}
