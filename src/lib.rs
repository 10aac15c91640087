//! Pose Trigger
//!
//! Real-time gesture recognition that turns sustained body poses into
//! debounced key events and spoken prompts.
//!
//! # Architecture
//!
//! Each captured frame flows through the same chain:
//!
//! 1. **Capture**: a `FrameSource` yields RGB frames stamped on the session clock.
//! 2. **Estimation**: a `PoseEstimator` turns the frame into a `LandmarkSnapshot`
//!    (or reports no pose).
//! 3. **Calibration**: the first well-framed, level frames become the
//!    neutral-stance baseline.
//! 4. **Classification**: seven geometric predicates are evaluated against the
//!    baseline.
//! 5. **Debounce**: an action is confirmed once it has held for the debounce
//!    window; prompts are rate limited by a keyed cooldown.
//! 6. **Presentation**: the render worker draws the latest snapshot, emits keys
//!    and speaks prompts.
//!
//! Steps 1-5 run on the acquisition worker and are bundled in
//! `SessionContext`, which can also be driven directly (offline replay).
//!
//! # Module Structure
//!
//! - `landmark`, `frame`, `clock`: core data types
//! - `calibration`, `classify`, `debounce`: per-frame decision logic
//! - `session`: one acquisition step
//! - `pipeline`: the two-worker coordinator and snapshot hand-off
//! - `ingest`, `detect`, `output`: collaborator seams and built-in backends
//! - `config`: file + environment configuration

pub mod calibration;
pub mod classify;
pub mod clock;
pub mod config;
pub mod debounce;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod landmark;
pub mod output;
pub mod periodic;
pub mod pipeline;
pub mod prompt;
pub mod session;

pub use calibration::{
    CalibrationBaseline, CalibrationIssue, CalibrationManager, CalibrationSettings,
    CalibrationState,
};
pub use classify::{classify, Action, ActionSet, ClassifierResult, ClassifierSettings, Thresholds};
pub use clock::{SessionClock, Timestamp};
pub use config::PoseTriggerConfig;
pub use debounce::{
    ActionPhase, ActionState, ConfirmedEvent, CooldownGate, DebounceEngine, DebouncePolicy,
};
pub use detect::{JsonLinesEstimator, PoseEstimator, ScriptStep, ScriptedEstimator, Stance};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SourceConfig, SourceStats, SyntheticSource};
pub use landmark::{Joint, Landmark, LandmarkSnapshot};
pub use output::{
    DisplayGeometry, FrameRenderer, JsonLinesKeyEmitter, KeyEmitter, LogKeyEmitter, LogRenderer,
    LogVoice, Overlay, VoicePrompter,
};
pub use pipeline::{Coordinator, Outputs, PipelineSettings, PipelineSnapshot, SnapshotSlot};
pub use prompt::{Messages, Prompt};
pub use session::{FrameOutcome, SessionCommand, SessionContext, SessionSettings};
