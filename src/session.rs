//! Per-session processing state.
//!
//! `SessionContext` owns everything one acquisition step mutates: the
//! calibration manager, classifier settings, debounce engine and prompt
//! catalogue. It is driven by the acquisition worker, or directly by offline
//! replay and tests.

use std::sync::Arc;
use std::time::Duration;

use crate::calibration::{CalibrationManager, CalibrationSettings, CalibrationState};
use crate::classify::{classify, Action, ActionSet, ClassifierResult, ClassifierSettings};
use crate::clock::Timestamp;
use crate::debounce::{ConfirmedEvent, CooldownGate, DebounceEngine, DebouncePolicy};
use crate::frame::Frame;
use crate::landmark::LandmarkSnapshot;
use crate::prompt::{self, Messages, Prompt};

/// Control requests applied between acquisition steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionCommand {
    ResetCalibration,
    SetActionEnabled(Action, bool),
}

#[derive(Clone, Debug)]
pub struct SessionSettings {
    pub calibration: CalibrationSettings,
    pub classifier: ClassifierSettings,
    pub debounce: DebouncePolicy,
    pub cooldown_window: Duration,
    pub action_prompt_window: Duration,
    /// Extra per-prefix cooldown windows.
    pub cooldown_overrides: Vec<(String, Duration)>,
    /// Speak an acknowledgement for every confirmed action.
    pub announce_actions: bool,
    pub messages: Messages,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            calibration: CalibrationSettings::default(),
            classifier: ClassifierSettings::default(),
            debounce: DebouncePolicy::default(),
            cooldown_window: Duration::from_secs(10),
            action_prompt_window: Duration::from_secs(2),
            cooldown_overrides: Vec::new(),
            announce_actions: true,
            messages: Messages::default(),
        }
    }
}

/// Everything one acquisition step produced.
#[derive(Clone, Debug)]
pub struct FrameOutcome {
    pub seq: u64,
    pub snapshot: Arc<LandmarkSnapshot>,
    pub result: ClassifierResult,
    /// Actions currently held past the debounce window.
    pub confirmed: ActionSet<bool>,
    pub events: Vec<ConfirmedEvent>,
    pub prompts: Vec<Prompt>,
    pub calibration: CalibrationState,
}

pub struct SessionContext {
    calibration: CalibrationManager,
    classifier: ClassifierSettings,
    engine: DebounceEngine,
    messages: Messages,
    announce_actions: bool,
    frames: u64,
}

impl SessionContext {
    pub fn new(settings: SessionSettings) -> Self {
        let mut cooldowns = CooldownGate::new(settings.cooldown_window);
        cooldowns.set_window("action:", settings.action_prompt_window);
        for (prefix, window) in settings.cooldown_overrides {
            cooldowns.set_window(prefix, window);
        }
        let mut engine = DebounceEngine::new(settings.debounce, cooldowns);
        for (action, enabled) in settings.classifier.enabled.iter() {
            engine.set_enabled(action, enabled);
        }
        Self {
            calibration: CalibrationManager::new(settings.calibration),
            classifier: settings.classifier,
            engine,
            messages: settings.messages,
            announce_actions: settings.announce_actions,
            frames: 0,
        }
    }

    /// Runs one acquisition step. `observation` is `None` when no pose was found.
    pub fn process(&mut self, frame: &Frame, observation: Option<LandmarkSnapshot>) -> FrameOutcome {
        self.frames += 1;
        let now = frame.captured_at;
        let snapshot =
            Arc::new(observation.unwrap_or_else(|| LandmarkSnapshot::empty(now)));
        let mut prompts = Vec::new();

        let was_valid = self.calibration.state().is_valid();
        let calibration = self.calibration.accumulate(&snapshot);
        match (was_valid, calibration) {
            (false, CalibrationState::Valid) => {
                self.push_prompt(prompt::CALIBRATION_SUCCESS, now, &mut prompts);
            }
            (true, state) if !state.is_valid() => {
                self.engine.reset(None);
            }
            (_, CalibrationState::Invalid(issue)) => {
                self.push_prompt(issue.prompt_key(), now, &mut prompts);
            }
            _ => {}
        }

        let result = classify(&snapshot, self.calibration.baseline(), &self.classifier);
        let events = self.engine.update(&result, now);
        if self.announce_actions {
            for event in &events {
                self.push_prompt(&prompt::action_key(event.action), now, &mut prompts);
            }
        }

        FrameOutcome {
            seq: frame.seq,
            snapshot,
            result,
            confirmed: self.engine.confirmed(),
            events,
            prompts,
            calibration,
        }
    }

    fn push_prompt(&mut self, key: &str, now: Timestamp, prompts: &mut Vec<Prompt>) {
        if self.engine.check_cooldown(key, now) {
            prompts.push(self.messages.prompt(key));
        }
    }

    pub fn apply(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::ResetCalibration => self.reset_calibration(),
            SessionCommand::SetActionEnabled(action, enabled) => {
                self.set_action_enabled(action, enabled)
            }
        }
    }

    /// Discards the baseline and returns every action to Idle. Cooldowns persist.
    pub fn reset_calibration(&mut self) {
        log::info!("calibration reset requested");
        self.calibration.reset();
        self.engine.reset(None);
    }

    pub fn set_action_enabled(&mut self, action: Action, enabled: bool) {
        log::info!(
            "action {} {}",
            action,
            if enabled { "enabled" } else { "disabled" }
        );
        self.classifier.enabled[action] = enabled;
        self.engine.set_enabled(action, enabled);
    }

    pub fn calibration_state(&self) -> CalibrationState {
        self.calibration.state()
    }

    pub fn calibration(&self) -> &CalibrationManager {
        &self.calibration
    }

    pub fn engine(&self) -> &DebounceEngine {
        &self.engine
    }

    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new(SessionSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Stance;

    fn frame(seq: u64) -> Frame {
        Frame::new(vec![0u8; 3], 1, 1, seq, Timestamp::from_millis(seq * 50)).unwrap()
    }

    fn step(session: &mut SessionContext, seq: u64, stance: Stance) -> FrameOutcome {
        let f = frame(seq);
        let observation = stance.observe(true, f.captured_at);
        session.process(&f, observation)
    }

    #[test]
    fn calibrates_then_confirms_action() {
        let mut session = SessionContext::default();
        let mut prompts = Vec::new();
        for seq in 0..15 {
            prompts.extend(step(&mut session, seq, Stance::Neutral).prompts);
        }
        assert!(session.calibration_state().is_valid());
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].key, prompt::CALIBRATION_SUCCESS);

        let mut events = Vec::new();
        for seq in 15..=35 {
            let outcome = step(&mut session, seq, Stance::RightHandUp);
            assert!(outcome.result[Action::RightHandRaised]);
            events.extend(outcome.events);
            prompts.extend(outcome.prompts);
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key, 'B');
        assert_eq!(events[0].confirmed_at, Timestamp::from_millis(1750));
        assert_eq!(prompts.last().map(|p| p.key.as_str()), Some("action:right_hand_raised"));
    }

    #[test]
    fn no_pose_reports_incomplete_body_under_cooldown() {
        let mut session = SessionContext::default();
        let mut keys = Vec::new();
        for seq in 0..=600 {
            let f = frame(seq);
            for p in session.process(&f, None).prompts {
                keys.push((p.key, f.captured_at));
            }
        }
        let expected: Vec<(String, Timestamp)> = [0u64, 10_000, 20_000, 30_000]
            .into_iter()
            .map(|ms| ("body_incomplete".to_string(), Timestamp::from_millis(ms)))
            .collect();
        assert_eq!(keys, expected);
        assert_eq!(session.frames_processed(), 601);
    }

    #[test]
    fn reset_requires_recalibration() {
        let mut session = SessionContext::default();
        for seq in 0..15 {
            step(&mut session, seq, Stance::Neutral);
        }
        assert!(session.calibration_state().is_valid());

        session.apply(SessionCommand::ResetCalibration);
        assert_eq!(session.calibration_state(), CalibrationState::Absent);
        let outcome = step(&mut session, 15, Stance::LeftHandUp);
        assert!(!outcome.result.any());
    }

    #[test]
    fn disabled_action_never_fires() {
        let mut session = SessionContext::default();
        session.apply(SessionCommand::SetActionEnabled(Action::LeftFootRaised, false));
        for seq in 0..15 {
            step(&mut session, seq, Stance::Neutral);
        }
        for seq in 15..60 {
            let outcome = step(&mut session, seq, Stance::LeftFootUp);
            assert!(!outcome.result[Action::LeftFootRaised]);
            assert!(outcome.events.is_empty());
        }
    }
}
