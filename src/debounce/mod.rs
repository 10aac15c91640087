//! Debounce and cooldown engine.
//!
//! Raw classifier output flickers frame to frame. The engine keeps one
//! independent hold timer per action and reports a `ConfirmedEvent` exactly
//! once per continuous true-run, when the run first reaches the debounce
//! window. Advisory prompts are rate limited separately by a keyed cooldown
//! gate that is never cleared.

mod action;
mod cooldown;

pub use action::{ActionPhase, ActionState, ConfirmedEvent, DebouncePolicy};
pub use cooldown::CooldownGate;

use crate::classify::{Action, ActionSet, ClassifierResult};
use crate::clock::Timestamp;

pub struct DebounceEngine {
    policy: DebouncePolicy,
    states: [ActionState; Action::COUNT],
    enabled: ActionSet<bool>,
    cooldowns: CooldownGate,
}

impl DebounceEngine {
    pub fn new(policy: DebouncePolicy, cooldowns: CooldownGate) -> Self {
        Self {
            policy,
            states: Action::ALL.map(ActionState::new),
            enabled: ActionSet::filled(true),
            cooldowns,
        }
    }

    pub fn policy(&self) -> &DebouncePolicy {
        &self.policy
    }

    /// Feeds one frame of raw classifier output.
    pub fn update(&mut self, result: &ClassifierResult, now: Timestamp) -> Vec<ConfirmedEvent> {
        let mut events = Vec::new();
        for action in Action::ALL {
            let state = &mut self.states[action.index()];
            if !self.enabled[action] {
                state.end_run();
                continue;
            }
            if let Some(event) = state.observe(result[action], now, &self.policy) {
                log::info!(
                    "action confirmed: {} key={} held={}ms",
                    action,
                    event.key,
                    now.since(event.held_since).as_millis()
                );
                events.push(event);
            }
        }
        events
    }

    /// Returns true when the prompt `key` may fire now, recording the firing.
    pub fn check_cooldown(&mut self, key: &str, now: Timestamp) -> bool {
        let allowed = self.cooldowns.check(key, now);
        if !allowed {
            log::trace!("prompt {} suppressed by cooldown", key);
        }
        allowed
    }

    /// Returns one action, or all of them, to Idle. Cooldowns are untouched.
    pub fn reset(&mut self, action: Option<Action>) {
        match action {
            Some(action) => self.states[action.index()].end_run(),
            None => self.states.iter_mut().for_each(ActionState::end_run),
        }
    }

    /// Disabled actions are pinned to Idle until re-enabled.
    pub fn set_enabled(&mut self, action: Action, enabled: bool) {
        self.enabled[action] = enabled;
        if !enabled {
            self.states[action.index()].end_run();
        }
    }

    pub fn is_enabled(&self, action: Action) -> bool {
        self.enabled[action]
    }

    pub fn state(&self, action: Action) -> &ActionState {
        &self.states[action.index()]
    }

    pub fn phase(&self, action: Action) -> ActionPhase {
        self.states[action.index()].phase()
    }

    /// Actions currently held past the debounce window.
    pub fn confirmed(&self) -> ActionSet<bool> {
        let mut set = ActionSet::filled(false);
        for state in &self.states {
            set[state.action] = state.confirmed;
        }
        set
    }

    pub fn cooldowns(&self) -> &CooldownGate {
        &self.cooldowns
    }
}

impl Default for DebounceEngine {
    fn default() -> Self {
        Self::new(DebouncePolicy::default(), CooldownGate::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    fn only(action: Action) -> ClassifierResult {
        let mut result = ClassifierResult::default();
        result[action] = true;
        result
    }

    #[test]
    fn left_hand_hold_confirms_at_one_second() {
        let mut engine = DebounceEngine::default();
        let raised = only(Action::LeftHandRaised);
        let mut events = Vec::new();
        for i in 0..28 {
            events.extend(engine.update(&raised, ms(i * 50)));
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, Action::LeftHandRaised);
        assert_eq!(events[0].confirmed_at, ms(1000));
        assert_eq!(engine.phase(Action::LeftHandRaised), ActionPhase::Confirmed);

        assert!(engine.update(&ClassifierResult::default(), ms(1400)).is_empty());
        assert_eq!(engine.phase(Action::LeftHandRaised), ActionPhase::Idle);
    }

    #[test]
    fn timers_are_independent() {
        let mut engine = DebounceEngine::default();
        let mut events = Vec::new();
        for i in 0..=40u64 {
            let mut result = ClassifierResult::default();
            result[Action::RightFootRaised] = true;
            result[Action::HeadTurnedLeft] = i >= 10;
            events.extend(engine.update(&result, ms(i * 50)));
        }
        let fired: Vec<(Action, Timestamp)> =
            events.iter().map(|e| (e.action, e.confirmed_at)).collect();
        assert_eq!(
            fired,
            vec![
                (Action::RightFootRaised, ms(1000)),
                (Action::HeadTurnedLeft, ms(1500)),
            ]
        );
        assert_eq!(engine.phase(Action::LeftHandRaised), ActionPhase::Idle);
    }

    #[test]
    fn disabled_action_stays_idle() {
        let mut engine = DebounceEngine::default();
        engine.set_enabled(Action::BothHandsRaised, false);
        let raised = only(Action::BothHandsRaised);
        for i in 0..40 {
            assert!(engine.update(&raised, ms(i * 50)).is_empty());
            assert_eq!(engine.phase(Action::BothHandsRaised), ActionPhase::Idle);
        }

        engine.set_enabled(Action::BothHandsRaised, true);
        let events: Vec<_> = (40..=60)
            .flat_map(|i| engine.update(&raised, ms(i * 50)))
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].confirmed_at, ms(3000));
    }

    #[test]
    fn reset_returns_actions_to_idle_but_keeps_cooldowns() {
        let mut engine = DebounceEngine::default();
        let mut result = only(Action::LeftHandRaised);
        result[Action::RightHandRaised] = true;
        engine.update(&result, ms(0));
        assert!(engine.check_cooldown("body_incomplete", ms(0)));

        engine.reset(Some(Action::LeftHandRaised));
        assert_eq!(engine.phase(Action::LeftHandRaised), ActionPhase::Idle);
        assert_eq!(engine.phase(Action::RightHandRaised), ActionPhase::Rising);

        engine.reset(None);
        assert_eq!(engine.phase(Action::RightHandRaised), ActionPhase::Idle);
        assert!(!engine.check_cooldown("body_incomplete", ms(500)));
        assert_eq!(engine.cooldowns().last_fired("body_incomplete"), Some(ms(0)));
    }

    #[test]
    fn confirmed_set_tracks_held_actions() {
        let mut engine = DebounceEngine::default();
        let raised = only(Action::HeadTurnedRight);
        for i in 0..=20 {
            engine.update(&raised, ms(i * 50));
        }
        let confirmed = engine.confirmed();
        assert!(confirmed[Action::HeadTurnedRight]);
        assert_eq!(confirmed.active().count(), 1);
    }
}
