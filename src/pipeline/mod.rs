//! Frame pipeline coordinator.
//!
//! Two workers run at their own cadence:
//! - acquisition: capture, pose estimation, classification, debounce, publish
//! - render/voice: draw the latest published snapshot, emit keys, speak prompts
//!
//! The only state they share is the `SnapshotSlot`. Confirmed events and
//! prompts travel over an unbounded channel so a slow renderer never loses
//! one. Calibration, debounce and cooldown state belong to the acquisition
//! worker and survive `stop()`/`start()`.

mod acquire;
mod present;
mod slot;

pub use slot::{PipelineSnapshot, SnapshotSlot};

use anyhow::{anyhow, bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::classify::{Action, ClassifierResult};
use crate::clock::SessionClock;
use crate::debounce::ConfirmedEvent;
use crate::detect::PoseEstimator;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::landmark::LandmarkSnapshot;
use crate::output::{FrameRenderer, KeyEmitter, VoicePrompter};
use crate::prompt::Prompt;
use crate::session::{SessionCommand, SessionContext};
use acquire::AcquireWorker;
use present::PresentWorker;

/// Messages from the acquisition worker to the render worker.
#[derive(Clone, Debug)]
pub(crate) enum Notice {
    Key(ConfirmedEvent),
    Voice(Prompt),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub capture_interval: Duration,
    pub render_interval: Duration,
    /// Render cycles between display-geometry refreshes.
    pub geometry_refresh_cycles: u32,
    /// Smallest side of the scaled frame, in pixels.
    pub min_render_side: u32,
}

impl PipelineSettings {
    pub fn from_rates(capture_fps: f32, render_fps: f32) -> Self {
        Self {
            capture_interval: interval_for(capture_fps),
            render_interval: interval_for(render_fps),
            ..Self::default()
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            capture_interval: Duration::from_millis(40),
            render_interval: Duration::from_millis(40),
            geometry_refresh_cycles: 15,
            min_render_side: 32,
        }
    }
}

fn interval_for(fps: f32) -> Duration {
    Duration::from_micros((1_000_000.0 / fps.max(0.1)).round() as u64)
}

/// Presentation collaborators handed to the render worker.
pub struct Outputs {
    pub renderer: Box<dyn FrameRenderer>,
    pub voice: Box<dyn VoicePrompter>,
    pub keys: Box<dyn KeyEmitter>,
}

pub(crate) struct WorkerContext {
    pub(crate) stop: Arc<AtomicBool>,
    pub(crate) slot: Arc<SnapshotSlot>,
    pub(crate) clock: SessionClock,
    pub(crate) interval: Duration,
    pub(crate) voice_enabled: Arc<AtomicBool>,
}

/// Sleeps out the rest of the cycle. An overrunning cycle starts the next one at once.
pub(crate) fn pace(started: Instant, interval: Duration) {
    let elapsed = started.elapsed();
    if elapsed < interval {
        std::thread::sleep(interval - elapsed);
    }
}

/// Each worker has its own stop flag so the render worker outlives the
/// acquisition worker's last iteration and drains every notice it produced.
struct Running {
    acquire_stop: Arc<AtomicBool>,
    present_stop: Arc<AtomicBool>,
    acquire: JoinHandle<AcquireWorker>,
    present: JoinHandle<PresentWorker>,
}

struct Idle {
    acquire: AcquireWorker,
    present: PresentWorker,
}

enum Workers {
    Stopped(Idle),
    Running(Running),
    /// A worker panicked; its state is gone.
    Failed,
}

pub struct Coordinator {
    settings: PipelineSettings,
    clock: SessionClock,
    slot: Arc<SnapshotSlot>,
    voice_enabled: Arc<AtomicBool>,
    commands: Sender<SessionCommand>,
    workers: Workers,
}

impl Coordinator {
    pub fn new(
        settings: PipelineSettings,
        source: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
        session: SessionContext,
        outputs: Outputs,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel();
        let (notice_tx, notice_rx) = mpsc::channel();
        let acquire = AcquireWorker::new(source, estimator, session, command_rx, notice_tx);
        let present = PresentWorker::new(
            outputs.renderer,
            outputs.voice,
            outputs.keys,
            notice_rx,
            settings.geometry_refresh_cycles,
            settings.min_render_side,
        );
        Self {
            settings,
            clock: SessionClock::new(),
            slot: Arc::new(SnapshotSlot::new()),
            voice_enabled: Arc::new(AtomicBool::new(true)),
            commands,
            workers: Workers::Stopped(Idle { acquire, present }),
        }
    }

    /// Uses `clock` for frame timestamps instead of a fresh one.
    pub fn with_clock(mut self, clock: SessionClock) -> Self {
        self.clock = clock;
        self
    }

    /// Connects the source and spawns both workers.
    pub fn start(&mut self) -> Result<()> {
        let mut idle = match std::mem::replace(&mut self.workers, Workers::Failed) {
            Workers::Stopped(idle) => idle,
            Workers::Running(running) => {
                self.workers = Workers::Running(running);
                bail!("pipeline already running");
            }
            Workers::Failed => bail!("pipeline workers failed; create a new coordinator"),
        };

        if let Err(err) = idle
            .acquire
            .source
            .connect()
            .and_then(|_| idle.acquire.estimator.warm_up())
        {
            idle.acquire.source.close();
            self.workers = Workers::Stopped(idle);
            return Err(err.context("failed to start pipeline"));
        }

        let acquire_stop = Arc::new(AtomicBool::new(false));
        let present_stop = Arc::new(AtomicBool::new(false));
        let acquire_ctx = self.worker_context(&acquire_stop, self.settings.capture_interval);
        let present_ctx = self.worker_context(&present_stop, self.settings.render_interval);
        let Idle { acquire, present } = idle;
        let acquire = std::thread::Builder::new()
            .name("pose-acquire".to_string())
            .spawn(move || acquire.run(acquire_ctx))?;
        let present = match std::thread::Builder::new()
            .name("pose-render".to_string())
            .spawn(move || present.run(present_ctx))
        {
            Ok(handle) => handle,
            Err(err) => {
                acquire_stop.store(true, Ordering::SeqCst);
                let _ = acquire.join();
                return Err(anyhow!("failed to spawn render worker: {}", err));
            }
        };

        log::info!("pipeline started");
        self.workers = Workers::Running(Running {
            acquire_stop,
            present_stop,
            acquire,
            present,
        });
        Ok(())
    }

    /// Stops the acquisition worker after its current iteration, then the
    /// render worker once it has delivered everything acquisition produced.
    /// Worker state is kept for the next `start()`. Stopping a stopped
    /// pipeline is a no-op.
    pub fn stop(&mut self) -> Result<()> {
        let running = match std::mem::replace(&mut self.workers, Workers::Failed) {
            Workers::Running(running) => running,
            other => {
                self.workers = other;
                return Ok(());
            }
        };
        running.acquire_stop.store(true, Ordering::SeqCst);
        let acquire = running.acquire.join();
        running.present_stop.store(true, Ordering::SeqCst);
        let present = running.present.join();
        match (acquire, present) {
            (Ok(acquire), Ok(present)) => {
                self.workers = Workers::Stopped(Idle { acquire, present });
                log::info!("pipeline stopped");
                Ok(())
            }
            (Err(_), _) => Err(anyhow!("acquisition worker panicked")),
            (_, Err(_)) => Err(anyhow!("render worker panicked")),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.workers, Workers::Running(_))
    }

    /// Publishes a snapshot into the hand-off slot. Returns its sequence number.
    ///
    /// The acquisition worker is the only writer while the pipeline runs, so
    /// this is refused until `stop()`.
    pub fn publish(
        &self,
        frame: Frame,
        snapshot: Arc<LandmarkSnapshot>,
        result: ClassifierResult,
        events: Vec<ConfirmedEvent>,
    ) -> Result<u64> {
        if self.is_running() {
            bail!("pipeline running; the acquisition worker owns the snapshot slot");
        }
        self.slot
            .publish(PipelineSnapshot::new(frame, snapshot, result, events))
    }

    pub fn read_latest(&self) -> Result<Arc<PipelineSnapshot>> {
        self.slot.read_latest()
    }

    /// Applied by the acquisition worker at the start of its next iteration.
    pub fn reset_calibration(&self) -> Result<()> {
        self.send(SessionCommand::ResetCalibration)
    }

    pub fn set_action_enabled(&self, action: Action, enabled: bool) -> Result<()> {
        self.send(SessionCommand::SetActionEnabled(action, enabled))
    }

    pub fn set_voice_enabled(&self, enabled: bool) {
        log::info!("voice {}", if enabled { "unmuted" } else { "muted" });
        self.voice_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled.load(Ordering::SeqCst)
    }

    /// Session state, available while the pipeline is stopped.
    pub fn session(&self) -> Option<&SessionContext> {
        match &self.workers {
            Workers::Stopped(idle) => Some(&idle.acquire.session),
            _ => None,
        }
    }

    /// Failed acquisition cycles so far, available while stopped.
    pub fn failed_cycles(&self) -> Option<u64> {
        match &self.workers {
            Workers::Stopped(idle) => Some(idle.acquire.failures()),
            _ => None,
        }
    }

    pub fn clock(&self) -> SessionClock {
        self.clock
    }

    pub fn slot(&self) -> Arc<SnapshotSlot> {
        Arc::clone(&self.slot)
    }

    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("acquisition worker is gone"))
    }

    fn worker_context(&self, stop: &Arc<AtomicBool>, interval: Duration) -> WorkerContext {
        WorkerContext {
            stop: Arc::clone(stop),
            slot: Arc::clone(&self.slot),
            clock: self.clock,
            interval,
            voice_enabled: Arc::clone(&self.voice_enabled),
        }
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("pipeline shutdown failed: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intervals_follow_rates() {
        let settings = PipelineSettings::from_rates(25.0, 20.0);
        assert_eq!(settings.capture_interval, Duration::from_millis(40));
        assert_eq!(settings.render_interval, Duration::from_millis(50));
        assert_eq!(settings.geometry_refresh_cycles, 15);
    }

    #[test]
    fn pace_returns_immediately_after_overrun() {
        let started = Instant::now() - Duration::from_millis(100);
        let before = Instant::now();
        pace(started, Duration::from_millis(40));
        assert!(before.elapsed() < Duration::from_millis(20));
    }
}
