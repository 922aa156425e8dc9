//! Glide: touch-free scrolling from webcam hand gestures.

use anyhow::Result;
use clap::Parser;
use glide::app::App;
use glide::camera::VideoSource;
use glide::config::Config;
use glide::landmarks::NullHandProvider;
use glide::replay::ReplaySource;
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// Replay a recorded landmark session (JSONL) instead of live detection
    #[arg(long)]
    replay: Option<String>,

    /// Camera index to use (overrides the config file)
    #[arg(long)]
    cam: Option<i32>,

    /// Video file to process instead of a camera
    #[arg(short, long)]
    video: Option<String>,

    /// Run without the preview window
    #[arg(long)]
    headless: bool,

    /// Disable the WebSocket HUD channel
    #[arg(long)]
    no_hud: bool,

    /// HUD port override
    #[arg(long)]
    hud_port: Option<u16>,

    /// Disable scroll event posting (feedback only)
    #[arg(long)]
    no_scroll: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    info!("Glide - gesture scroll");

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if let Some(cam) = args.cam {
        config.camera.index = cam;
    }
    if args.no_hud {
        config.hud.enabled = false;
    }
    if let Some(port) = args.hud_port {
        config.hud.port = port;
    }
    if args.no_scroll {
        config.scroll.enabled = false;
    }

    let camera_index = config.camera.index;
    let mut app = App::new(config, args.headless)?;

    if let Some(replay_path) = args.replay {
        let replay = ReplaySource::from_file(&replay_path)?;
        app.run_replay(replay)?;
    } else {
        let source = match args.video {
            Some(path) => VideoSource::File(path),
            None => VideoSource::Camera(camera_index),
        };
        warn!("no landmark provider configured; running camera/HUD only (use --replay for gestures)");
        app.run_live(&source, Box::new(NullHandProvider))?;
    }

    Ok(())
}
