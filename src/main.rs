//! # Tickweave — demo driver
//!
//! Runs a scheduler over a fixed-rate tick loop and starts one of each
//! builder so the whole lifecycle is visible in the logs: a delayed call, a
//! repeating heartbeat, a poll-until, and a lag watcher fed by synthetic
//! frame hitches.
//!
//! Usage:
//!   tickweave                    # 60 fps, 240 frames
//!   tickweave --fps 30           # slower tick
//!   tickweave --frames 0         # run until the registry is idle
//!   tickweave -v                 # debug logging

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use tracing_subscriber::EnvFilter;

use tickweave_core::{ManualClock, TickweaveConfig};
use tickweave_scheduler::{run_frames, Scheduler};

#[derive(Parser)]
#[command(
    name = "tickweave",
    version,
    about = "🧵 Tickweave — per-frame cooperative coroutine scheduler demo"
)]
struct Cli {
    /// Tick rate; overrides the config file
    #[arg(long)]
    fps: Option<u32>,

    /// Frames to run; 0 means run until idle
    #[arg(long, default_value = "240")]
    frames: u64,

    /// Config file path (default: ~/.tickweave/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "tickweave=debug,tickweave_scheduler=debug"
    } else {
        "tickweave=info,tickweave_scheduler=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => TickweaveConfig::load_from(path)?,
        None => TickweaveConfig::load()?,
    };
    let fps = cli.fps.unwrap_or(config.driver.fps);

    let clock = Rc::new(ManualClock::new());
    let mut sched = Scheduler::with_config(clock.clone(), config.lag.clone());

    // One-shot delayed call.
    sched.once(0.5, || tracing::info!("⏰ Half a second elapsed"), None);

    // Repeating heartbeat: every 30 frames, five beats.
    let beats = Rc::new(Cell::new(0u32));
    let beats_in = beats.clone();
    sched.frame_repeat(
        30,
        move || {
            beats_in.set(beats_in.get() + 1);
            tracing::info!("💓 Heartbeat {}", beats_in.get());
            beats_in.get() >= 5
        },
        None,
    );

    // Poll until the heartbeat has fired three times.
    let beats_watch = beats.clone();
    sched.wait_until(
        move || beats_watch.get() >= 3,
        || tracing::info!("👀 Three heartbeats observed"),
        None,
    );

    // Synthetic frame hitches for the first ~20 frames: a repeat builder
    // that sleeps a random amount each tick, stretching the measured delta.
    let hitches = Rc::new(Cell::new(0u32));
    let hitches_in = hitches.clone();
    sched.frame_repeat(
        1,
        move || {
            hitches_in.set(hitches_in.get() + 1);
            if hitches_in.get() <= 20 {
                let ms = rand::thread_rng().gen_range(0..40);
                std::thread::sleep(std::time::Duration::from_millis(ms));
                false
            } else {
                true
            }
        },
        None,
    );
    sched.after_lag(|| tracing::info!("🌊 Frame rate settled, lag is over"), None);

    let max_frames = if cli.frames == 0 { None } else { Some(cli.frames) };
    run_frames(&mut sched, &clock, fps, max_frames).await;

    let stats = sched.stats();
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
