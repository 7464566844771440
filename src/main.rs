use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use animplayer::decoder::{PooledBuffers, SharedPool, SyntheticDecoder};
use animplayer::player::{PlaybackControllerBuilder, PlaybackEvent};
use animplayer::renderer::{ChannelInvalidator, Color, HeadlessCanvas};
use animplayer::utils::{Config, ReleasePolicy};

/// animplayer - plays a procedural animation on a headless surface
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Frame durations in milliseconds, one per frame
    #[arg(value_name = "MS", value_delimiter = ',', default_value = "100,150,200")]
    durations: Vec<u32>,

    /// Loop iterations, 0 = forever
    #[arg(short, long, default_value = "1")]
    loops: u32,

    /// Animation width
    #[arg(long, default_value = "64")]
    width: u32,

    /// Animation height
    #[arg(long, default_value = "64")]
    height: u32,

    /// Background color as ARGB hex, e.g. ff202020
    #[arg(long, value_parser = parse_color)]
    background: Option<Color>,

    /// Release policy for replaced frames (immediate, deferred)
    #[arg(long)]
    release_policy: Option<ReleasePolicy>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    play_for: Option<f64>,

    /// Configuration file to use instead of the default locations
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn parse_color(s: &str) -> std::result::Result<Color, String> {
    u32::from_str_radix(s.trim_start_matches("0x"), 16)
        .map(Color)
        .map_err(|e| format!("invalid color '{}': {}", s, e))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let log_level = if args.debug { "debug" } else { config.general.log_level.as_str() };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting animplayer v{}", env!("CARGO_PKG_VERSION"));

    let mut playback = config.playback.clone();
    if let Some(policy) = args.release_policy {
        playback.release_policy = policy;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("anim-wait")
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    let mut decoder = SyntheticDecoder::new(args.width, args.height, args.durations.clone())?
        .with_loop_count(args.loops);
    if let Some(color) = args.background {
        decoder = decoder.with_background(color);
    }

    let pool = SharedPool::new(PooledBuffers::new(playback.pool_capacity));
    let (invalidator, mut render_loop) = ChannelInvalidator::channel();

    let mut controller = PlaybackControllerBuilder::new()
        .with_config(playback)
        .with_pool(pool)
        .with_runtime(runtime.handle().clone())
        .with_event_handler(Box::new(|event: PlaybackEvent| match event {
            PlaybackEvent::Started => info!("Playback started"),
            PlaybackEvent::Stopped => info!("Playback stopped"),
            PlaybackEvent::Finished => info!("End of animation reached"),
        }))
        .build(Box::new(decoder), Arc::new(invalidator))?;

    let until = args
        .play_for
        .map(|secs| Instant::now() + Duration::from_secs_f64(secs.max(0.0)));
    if until.is_none() && args.loops == 0 {
        warn!("Infinite loop count without --play-for; interrupt to exit");
    }

    let mut canvas = HeadlessCanvas::new();
    controller.start()?;
    let finished = render_loop.run(&mut controller, &mut canvas, until);
    if !finished {
        controller.stop();
    }

    info!(
        "{} render callbacks, {} draws, {} fills",
        render_loop.callbacks(),
        canvas.draws.len(),
        canvas.fills.len()
    );
    println!("{}", serde_json::to_string_pretty(&controller.stats())?);

    drop(controller);
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
