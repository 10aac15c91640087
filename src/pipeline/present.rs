//! Render/voice worker: draws the latest snapshot and delivers notices.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::sync::atomic::Ordering;
use std::sync::mpsc::Receiver;
use std::time::Instant;

use crate::clock::Timestamp;
use crate::frame::Frame;
use crate::output::{DisplayGeometry, FrameRenderer, KeyEmitter, Overlay, VoicePrompter};
use crate::periodic::{Periodic, RateMeter};
use crate::pipeline::slot::PipelineSnapshot;
use crate::pipeline::{pace, Notice, WorkerContext};
use crate::prompt::Prompt;

/// State owned by the render worker. Returned intact when it stops.
pub(crate) struct PresentWorker {
    pub(crate) renderer: Box<dyn FrameRenderer>,
    pub(crate) voice: Box<dyn VoicePrompter>,
    pub(crate) keys: Box<dyn KeyEmitter>,
    notices: Receiver<Notice>,
    geometry: DisplayGeometry,
    geometry_refresh: Periodic,
    min_side: u32,
    last_rendered: u64,
    rate: RateMeter,
}

impl PresentWorker {
    pub(crate) fn new(
        renderer: Box<dyn FrameRenderer>,
        voice: Box<dyn VoicePrompter>,
        keys: Box<dyn KeyEmitter>,
        notices: Receiver<Notice>,
        geometry_refresh_cycles: u32,
        min_side: u32,
    ) -> Self {
        Self {
            renderer,
            voice,
            keys,
            notices,
            geometry: DisplayGeometry::default(),
            geometry_refresh: Periodic::every_calls(geometry_refresh_cycles),
            min_side,
            last_rendered: 0,
            rate: RateMeter::default(),
        }
    }

    pub(crate) fn run(mut self, ctx: WorkerContext) -> Self {
        log::info!(
            "render worker started (interval={}ms)",
            ctx.interval.as_millis()
        );
        // New run, new display: fetch the geometry on the first cycle.
        self.geometry_refresh.reset();
        while !ctx.stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            let now = ctx.clock.now();
            if let Err(err) = self.render_latest(&ctx, now) {
                log::warn!("render cycle failed: {:#}", err);
            }
            self.deliver(&ctx);
            pace(started, ctx.interval);
        }
        // Acquisition has already stopped; this drains its last notices.
        self.deliver(&ctx);
        log::info!("render worker stopped");
        self
    }

    fn render_latest(&mut self, ctx: &WorkerContext, now: Timestamp) -> Result<()> {
        if self.geometry_refresh.tick(now) {
            let geometry = self.renderer.display_geometry()?;
            if geometry != self.geometry {
                log::debug!("display geometry {}x{}", geometry.width, geometry.height);
                self.geometry = geometry;
            }
        }

        let snapshot = ctx.slot.read_latest()?;
        if snapshot.seq == self.last_rendered {
            return Ok(());
        }
        let Some(frame) = snapshot.frame.as_ref() else {
            return Ok(());
        };
        self.last_rendered = snapshot.seq;

        let image = scale_to_fit(frame, self.geometry, self.min_side)?;
        if let Some(fps) = self.rate.record(now) {
            log::debug!("render rate {:.1} fps", fps);
        }
        let overlay = overlay_for(&snapshot, frame, self.rate.rate());
        self.renderer.render(&image, &overlay)
    }

    /// Key emission first, then voice.
    fn deliver(&mut self, ctx: &WorkerContext) {
        let mut prompts: Vec<Prompt> = Vec::new();
        for notice in self.notices.try_iter() {
            match notice {
                Notice::Key(event) => {
                    if let Err(err) = self.keys.emit(&event) {
                        log::warn!("key emit for {} failed: {:#}", event.action, err);
                    }
                }
                Notice::Voice(prompt) => prompts.push(prompt),
            }
        }
        if prompts.is_empty() {
            return;
        }
        if !ctx.voice_enabled.load(Ordering::SeqCst) {
            log::debug!("voice muted, skipping {} prompts", prompts.len());
            return;
        }
        for prompt in &prompts {
            if let Err(err) = self.voice.speak(prompt) {
                log::warn!("voice prompt {} failed: {:#}", prompt.key, err);
            }
        }
    }
}

fn overlay_for(snapshot: &PipelineSnapshot, frame: &Frame, render_fps: f32) -> Overlay {
    Overlay {
        frame_seq: frame.seq,
        captured_at: frame.captured_at,
        calibration: snapshot.calibration,
        confirmed: snapshot.confirmed.active().collect(),
        capture_fps: snapshot.capture_fps,
        render_fps,
    }
}

/// Scales `frame` to fit inside `geometry`, keeping its aspect ratio.
///
/// The shorter side never goes below `min_side`.
pub(crate) fn scale_to_fit(frame: &Frame, geometry: DisplayGeometry, min_side: u32) -> Result<RgbImage> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.pixels().to_vec())
        .ok_or_else(|| anyhow!("frame {} does not fit its dimensions", frame.seq))?;
    let (width, height) = fitted_size(frame.width, frame.height, geometry, min_side);
    if (width, height) == (frame.width, frame.height) {
        return Ok(image);
    }
    Ok(imageops::resize(&image, width, height, FilterType::Triangle))
}

fn fitted_size(width: u32, height: u32, geometry: DisplayGeometry, min_side: u32) -> (u32, u32) {
    let fit = f64::min(
        f64::from(geometry.width) / f64::from(width.max(1)),
        f64::from(geometry.height) / f64::from(height.max(1)),
    );
    let floor = f64::from(min_side) / f64::from(width.min(height).max(1));
    let scale = fit.max(floor);
    let scaled = |side: u32| ((f64::from(side) * scale).round() as u32).max(1);
    (scaled(width), scaled(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitted_size_keeps_aspect_ratio() {
        let screen = DisplayGeometry {
            width: 800,
            height: 800,
        };
        assert_eq!(fitted_size(640, 480, screen, 32), (800, 600));

        let wide = DisplayGeometry {
            width: 1920,
            height: 540,
        };
        assert_eq!(fitted_size(640, 480, wide, 32), (720, 540));
    }

    #[test]
    fn fitted_size_floor_keeps_aspect_ratio() {
        let tiny = DisplayGeometry {
            width: 10,
            height: 10,
        };
        assert_eq!(fitted_size(640, 480, tiny, 32), (43, 32));
        assert_eq!(fitted_size(480, 640, tiny, 32), (32, 43));
    }

    #[test]
    fn scale_to_fit_resizes_frame() -> Result<()> {
        let frame = Frame::new(vec![128u8; 64 * 48 * 3], 64, 48, 0, Timestamp::ZERO)?;
        let image = scale_to_fit(
            &frame,
            DisplayGeometry {
                width: 128,
                height: 128,
            },
            32,
        )?;
        assert_eq!(image.dimensions(), (128, 96));

        let same = scale_to_fit(
            &frame,
            DisplayGeometry {
                width: 64,
                height: 48,
            },
            32,
        )?;
        assert_eq!(same.dimensions(), (64, 48));

        let floored = scale_to_fit(
            &frame,
            DisplayGeometry {
                width: 8,
                height: 8,
            },
            32,
        )?;
        assert_eq!(floored.dimensions(), (43, 32));
        Ok(())
    }
}
