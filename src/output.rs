//! Presentation collaborators driven by the render worker.
//!
//! The rendering surface, speech synthesis and key injection all live outside
//! this crate. These traits are the seams they plug into; the built-in
//! implementations only log or write JSON lines.

use anyhow::{Context, Result};
use image::RgbImage;
use serde::Serialize;
use std::io::Write;

use crate::calibration::CalibrationState;
use crate::classify::Action;
use crate::clock::Timestamp;
use crate::debounce::ConfirmedEvent;
use crate::periodic::Periodic;
use crate::prompt::Prompt;

/// Size of the area the renderer draws into, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for DisplayGeometry {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

/// Status drawn on top of the frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub frame_seq: u64,
    pub captured_at: Timestamp,
    pub calibration: CalibrationState,
    /// Actions currently held past the debounce window.
    pub confirmed: Vec<Action>,
    pub capture_fps: f32,
    pub render_fps: f32,
}

pub trait FrameRenderer: Send {
    /// Current drawable area. Polled periodically, not every cycle.
    fn display_geometry(&mut self) -> Result<DisplayGeometry>;

    fn render(&mut self, image: &RgbImage, overlay: &Overlay) -> Result<()>;
}

pub trait VoicePrompter: Send {
    fn speak(&mut self, prompt: &Prompt) -> Result<()>;
}

pub trait KeyEmitter: Send {
    fn emit(&mut self, event: &ConfirmedEvent) -> Result<()>;
}

/// Renderer that only logs what it would draw.
pub struct LogRenderer {
    geometry: DisplayGeometry,
    rendered: u64,
    report: Periodic,
}

impl LogRenderer {
    pub fn new(geometry: DisplayGeometry) -> Self {
        Self {
            geometry,
            rendered: 0,
            report: Periodic::every_calls(100),
        }
    }

    pub fn rendered(&self) -> u64 {
        self.rendered
    }
}

impl Default for LogRenderer {
    fn default() -> Self {
        Self::new(DisplayGeometry::default())
    }
}

impl FrameRenderer for LogRenderer {
    fn display_geometry(&mut self) -> Result<DisplayGeometry> {
        Ok(self.geometry)
    }

    fn render(&mut self, image: &RgbImage, overlay: &Overlay) -> Result<()> {
        self.rendered += 1;
        if self.report.tick(overlay.captured_at) {
            let confirmed: Vec<&str> = overlay.confirmed.iter().map(|a| a.name()).collect();
            log::debug!(
                "render #{} frame={} {}x{} calibration={:?} confirmed={:?} capture={:.1}fps render={:.1}fps",
                self.rendered,
                overlay.frame_seq,
                image.width(),
                image.height(),
                overlay.calibration,
                confirmed,
                overlay.capture_fps,
                overlay.render_fps
            );
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct LogVoice;

impl VoicePrompter for LogVoice {
    fn speak(&mut self, prompt: &Prompt) -> Result<()> {
        log::info!("voice [{}]: {}", prompt.key, prompt.text);
        Ok(())
    }
}

#[derive(Default)]
pub struct LogKeyEmitter;

impl KeyEmitter for LogKeyEmitter {
    fn emit(&mut self, event: &ConfirmedEvent) -> Result<()> {
        log::info!("key {} ({})", event.key, event.action);
        Ok(())
    }
}

#[derive(Serialize)]
struct KeyLine<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    event: &'a ConfirmedEvent,
}

/// Writes one JSON line per confirmed event for a downstream key injector.
pub struct JsonLinesKeyEmitter<W> {
    writer: W,
}

impl<W: Write + Send> JsonLinesKeyEmitter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl JsonLinesKeyEmitter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> KeyEmitter for JsonLinesKeyEmitter<W> {
    fn emit(&mut self, event: &ConfirmedEvent) -> Result<()> {
        let line = serde_json::to_string(&KeyLine { kind: "key", event })
            .context("failed to encode key event")?;
        writeln!(self.writer, "{}", line).context("failed to write key event")?;
        self.writer.flush().context("failed to flush key event")?;
        Ok(())
    }
}
