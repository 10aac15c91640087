//! Acquisition worker: capture, estimate, classify, debounce, publish.

use anyhow::{anyhow, Result};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Instant;

use crate::clock::Timestamp;
use crate::detect::PoseEstimator;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::landmark::LandmarkSnapshot;
use crate::periodic::{Periodic, RateMeter};
use crate::pipeline::slot::PipelineSnapshot;
use crate::pipeline::{pace, Notice, WorkerContext};
use crate::session::{SessionCommand, SessionContext};

/// State owned by the acquisition worker. Returned intact when it stops.
pub(crate) struct AcquireWorker {
    pub(crate) source: Box<dyn FrameSource>,
    pub(crate) estimator: Box<dyn PoseEstimator>,
    pub(crate) session: SessionContext,
    commands: Receiver<SessionCommand>,
    notices: Sender<Notice>,
    rate: RateMeter,
    health_log: Periodic,
    failures: u64,
}

impl AcquireWorker {
    pub(crate) fn new(
        source: Box<dyn FrameSource>,
        estimator: Box<dyn PoseEstimator>,
        session: SessionContext,
        commands: Receiver<SessionCommand>,
        notices: Sender<Notice>,
    ) -> Self {
        Self {
            source,
            estimator,
            session,
            commands,
            notices,
            rate: RateMeter::default(),
            health_log: Periodic::every_calls(100),
            failures: 0,
        }
    }

    pub(crate) fn failures(&self) -> u64 {
        self.failures
    }

    pub(crate) fn run(mut self, ctx: WorkerContext) -> Self {
        log::info!(
            "acquisition worker started (estimator={}, interval={}ms)",
            self.estimator.name(),
            ctx.interval.as_millis()
        );
        while !ctx.stop.load(Ordering::SeqCst) {
            let started = Instant::now();
            self.drain_commands();
            if let Err(err) = self.step(&ctx, ctx.clock.now()) {
                self.failures += 1;
                log::warn!("acquisition cycle failed: {:#}", err);
            }
            pace(started, ctx.interval);
        }
        self.source.close();
        log::info!(
            "acquisition worker stopped after {} frames ({} failed cycles)",
            self.session.frames_processed(),
            self.failures
        );
        self
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.session.apply(command);
        }
    }

    fn step(&mut self, ctx: &WorkerContext, now: Timestamp) -> Result<()> {
        let Some(frame) = self.source.next_frame(now)? else {
            if self.health_log.tick(now) && !self.source.is_healthy() {
                log::warn!("frame source {} unhealthy", self.source.stats().url);
            }
            return Ok(());
        };

        let observation = self.estimate(&frame)?;
        let outcome = self.session.process(&frame, observation);

        for event in &outcome.events {
            self.send(Notice::Key(event.clone()));
        }
        for prompt in &outcome.prompts {
            self.send(Notice::Voice(prompt.clone()));
        }

        if let Some(fps) = self.rate.record(now) {
            log::debug!("capture rate {:.1} fps", fps);
        }

        ctx.slot.publish(PipelineSnapshot {
            seq: 0,
            frame: Some(frame),
            landmarks: Some(outcome.snapshot),
            result: outcome.result,
            confirmed: outcome.confirmed,
            events: outcome.events,
            calibration: outcome.calibration,
            capture_fps: self.rate.rate(),
        })?;
        Ok(())
    }

    /// Runs the estimator, turning a panic into a failed cycle.
    fn estimate(&mut self, frame: &Frame) -> Result<Option<LandmarkSnapshot>> {
        let estimator = &mut self.estimator;
        match panic::catch_unwind(AssertUnwindSafe(|| estimator.estimate(frame))) {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "pose estimator {} panicked on frame {}",
                self.estimator.name(),
                frame.seq
            )),
        }
    }

    fn send(&self, notice: Notice) {
        if self.notices.send(notice).is_err() {
            log::warn!("render worker gone, dropping notice");
        }
    }
}
