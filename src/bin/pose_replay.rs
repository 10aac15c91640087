//! pose_replay - offline replay of recorded landmark snapshots.
//!
//! Reads one JSON snapshot per line (blank or `null` lines mean no pose),
//! runs each through a session exactly as the acquisition worker would, and
//! prints confirmed events and prompts as JSON lines.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use pose_trigger::{
    ConfirmedEvent, Frame, LandmarkSnapshot, PoseTriggerConfig, Prompt, SessionContext, Timestamp,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Replay landmark snapshots through the gesture pipeline"
)]
struct Args {
    /// Input file; reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Frame spacing used for lines without their own timestamp.
    #[arg(long, default_value = "40")]
    frame_interval_ms: u64,

    /// Also print calibration state changes.
    #[arg(long)]
    calibration: bool,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Line<'a> {
    Event(&'a ConfirmedEvent),
    Prompt {
        #[serde(flatten)]
        prompt: &'a Prompt,
        at_ms: Timestamp,
    },
    Calibration {
        state: String,
        at_ms: Timestamp,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let cfg = PoseTriggerConfig::load()?;
    let mut session = SessionContext::new(cfg.session_settings());

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(io::BufReader::new(
            std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::BufReader::new(io::stdin())),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut last_state = None;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("failed to read input")?;
        let seq = index as u64;
        let fallback = Timestamp::from_millis(seq * args.frame_interval_ms);
        let trimmed = line.trim();
        let observation: Option<LandmarkSnapshot> = if trimmed.is_empty() || trimmed == "null" {
            None
        } else {
            match serde_json::from_str(trimmed) {
                Ok(snapshot) => Some(snapshot),
                Err(err) => {
                    log::warn!("skipping line {}: {}", index + 1, err);
                    continue;
                }
            }
        };
        let at = observation
            .as_ref()
            .map(|snapshot| snapshot.captured_at())
            .unwrap_or(fallback);
        let frame = Frame::new(vec![0u8; 3], 1, 1, seq, at)?;
        let outcome = session.process(&frame, observation);

        if args.calibration && last_state != Some(outcome.calibration) {
            emit(
                &mut out,
                &Line::Calibration {
                    state: format!("{:?}", outcome.calibration),
                    at_ms: at,
                },
            )?;
            last_state = Some(outcome.calibration);
        }
        for event in &outcome.events {
            emit(&mut out, &Line::Event(event))?;
        }
        for prompt in &outcome.prompts {
            emit(&mut out, &Line::Prompt { prompt, at_ms: at })?;
        }
    }

    log::info!("replayed {} frames", session.frames_processed());
    Ok(())
}

fn emit(out: &mut impl Write, line: &Line<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, line).context("failed to encode output line")?;
    writeln!(out).context("failed to write output line")?;
    Ok(())
}
