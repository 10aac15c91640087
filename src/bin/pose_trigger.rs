//! pose_trigger - live gesture-to-key daemon.
//!
//! This binary:
//! 1. Loads configuration (POSE_TRIGGER_CONFIG file + environment)
//! 2. Opens the frame source and pose estimator
//! 3. Runs the acquisition and render/voice workers
//! 4. Emits one key per confirmed action until Ctrl-C or --seconds elapse

use anyhow::Result;
use clap::Parser;
use std::sync::mpsc;
use std::time::Duration;

use pose_trigger::{
    open_source, Action, Coordinator, JsonLinesKeyEmitter, KeyEmitter, LogKeyEmitter, LogRenderer,
    LogVoice, Outputs, PoseTriggerConfig, SessionContext,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Turn sustained body poses into key events"
)]
struct Args {
    /// Stop after this many seconds instead of waiting for Ctrl-C.
    #[arg(long)]
    seconds: Option<u64>,

    /// Start with voice prompts muted.
    #[arg(long)]
    mute: bool,

    /// Write confirmed keys to stdout as JSON lines instead of the log.
    #[arg(long)]
    json_keys: bool,

    /// Disable an action (repeatable), e.g. --disable head_turned_left.
    #[arg(long = "disable", value_name = "ACTION")]
    disabled: Vec<Action>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = PoseTriggerConfig::load()?;
    cfg.disabled_actions.extend(args.disabled.iter().copied());

    let source = open_source(cfg.source.clone())?;
    let estimator = cfg.build_estimator()?;
    let session = SessionContext::new(cfg.session_settings());
    let keys: Box<dyn KeyEmitter> = if args.json_keys {
        Box::new(JsonLinesKeyEmitter::stdout())
    } else {
        Box::new(LogKeyEmitter)
    };
    let outputs = Outputs {
        renderer: Box::new(LogRenderer::default()),
        voice: Box::new(LogVoice),
        keys,
    };

    let mut coordinator =
        Coordinator::new(cfg.pipeline_settings(), source, estimator, session, outputs);
    coordinator.set_voice_enabled(cfg.voice_enabled && !args.mute);
    coordinator.start()?;

    log::info!(
        "pose_trigger running. source={} capture={}fps render={}fps",
        cfg.source.url,
        cfg.capture_fps,
        cfg.render_fps
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    match args.seconds {
        Some(seconds) => {
            let _ = rx.recv_timeout(Duration::from_secs(seconds));
        }
        None => {
            log::info!("pose_trigger waiting for shutdown signal (Ctrl-C)...");
            let _ = rx.recv();
        }
    }

    log::info!("shutdown requested, stopping pipeline...");
    coordinator.stop()?;
    if let Some(session) = coordinator.session() {
        log::info!(
            "processed {} frames, calibration {:?}",
            session.frames_processed(),
            session.calibration_state()
        );
    }
    Ok(())
}
