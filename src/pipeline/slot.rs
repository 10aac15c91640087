use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};

use crate::calibration::CalibrationState;
use crate::classify::{ActionSet, ClassifierResult};
use crate::debounce::ConfirmedEvent;
use crate::frame::Frame;
use crate::landmark::LandmarkSnapshot;

/// Everything the render worker needs from one acquisition step.
#[derive(Clone, Debug)]
pub struct PipelineSnapshot {
    /// Publish counter, assigned by the slot.
    pub seq: u64,
    pub frame: Option<Frame>,
    pub landmarks: Option<Arc<LandmarkSnapshot>>,
    pub result: ClassifierResult,
    pub confirmed: ActionSet<bool>,
    /// Events confirmed by the step that produced this snapshot.
    pub events: Vec<ConfirmedEvent>,
    pub calibration: CalibrationState,
    pub capture_fps: f32,
}

impl PipelineSnapshot {
    pub fn new(
        frame: Frame,
        landmarks: Arc<LandmarkSnapshot>,
        result: ClassifierResult,
        events: Vec<ConfirmedEvent>,
    ) -> Self {
        Self {
            seq: 0,
            frame: Some(frame),
            landmarks: Some(landmarks),
            result,
            confirmed: ActionSet::filled(false),
            events,
            calibration: CalibrationState::Absent,
            capture_fps: 0.0,
        }
    }
}

impl Default for PipelineSnapshot {
    fn default() -> Self {
        Self {
            seq: 0,
            frame: None,
            landmarks: None,
            result: ClassifierResult::default(),
            confirmed: ActionSet::filled(false),
            events: Vec::new(),
            calibration: CalibrationState::Absent,
            capture_fps: 0.0,
        }
    }
}

/// Single-writer hand-off of the latest `PipelineSnapshot`.
///
/// The lock is held only to swap or clone an `Arc`, so readers get either
/// the previous snapshot or the new one in full.
pub struct SnapshotSlot {
    latest: Mutex<Arc<PipelineSnapshot>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(Arc::new(PipelineSnapshot::default())),
        }
    }

    /// Replaces the latest snapshot. Returns the sequence number it was given.
    pub(crate) fn publish(&self, mut snapshot: PipelineSnapshot) -> Result<u64> {
        let mut latest = self
            .latest
            .lock()
            .map_err(|_| anyhow!("snapshot slot lock poisoned"))?;
        snapshot.seq = latest.seq + 1;
        let seq = snapshot.seq;
        *latest = Arc::new(snapshot);
        Ok(seq)
    }

    pub fn read_latest(&self) -> Result<Arc<PipelineSnapshot>> {
        let latest = self
            .latest
            .lock()
            .map_err(|_| anyhow!("snapshot slot lock poisoned"))?;
        Ok(Arc::clone(&latest))
    }
}

impl Default for SnapshotSlot {
    fn default() -> Self {
        Self::new()
    }
}
