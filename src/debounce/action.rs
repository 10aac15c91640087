use serde::Serialize;
use std::time::Duration;

use crate::classify::Action;
use crate::clock::Timestamp;

/// Hold requirements shared by all actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Continuous-true time needed before an action is confirmed.
    pub window: Duration,
    /// False gaps shorter than this do not end a run. Zero means any false
    /// frame ends it.
    pub dropout_tolerance: Duration,
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(1),
            dropout_tolerance: Duration::ZERO,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionPhase {
    Idle,
    Rising,
    Confirmed,
}

/// One-shot notification that an action has been held long enough.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfirmedEvent {
    pub action: Action,
    pub key: char,
    #[serde(rename = "confirmed_at_ms")]
    pub confirmed_at: Timestamp,
    #[serde(rename = "held_since_ms")]
    pub held_since: Timestamp,
}

/// Debounce state of one action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActionState {
    pub action: Action,
    pub currently_true: bool,
    pub true_since: Option<Timestamp>,
    pub confirmed: bool,
    pub last_confirmed_at: Option<Timestamp>,
    false_since: Option<Timestamp>,
}

impl ActionState {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            currently_true: false,
            true_since: None,
            confirmed: false,
            last_confirmed_at: None,
            false_since: None,
        }
    }

    pub fn phase(&self) -> ActionPhase {
        if self.confirmed {
            ActionPhase::Confirmed
        } else if self.true_since.is_some() {
            ActionPhase::Rising
        } else {
            ActionPhase::Idle
        }
    }

    /// Advances the state with one raw sample.
    ///
    /// Returns an event exactly when the current run first reaches the window.
    pub fn observe(
        &mut self,
        raw: bool,
        now: Timestamp,
        policy: &DebouncePolicy,
    ) -> Option<ConfirmedEvent> {
        if !raw {
            self.currently_true = false;
            if self.true_since.is_some() {
                let gap_start = *self.false_since.get_or_insert(now);
                if now.since(gap_start) >= policy.dropout_tolerance {
                    self.end_run();
                }
            }
            return None;
        }

        self.currently_true = true;
        self.false_since = None;
        let since = *self.true_since.get_or_insert(now);
        if self.confirmed || now.since(since) < policy.window {
            return None;
        }
        self.confirmed = true;
        self.last_confirmed_at = Some(now);
        Some(ConfirmedEvent {
            action: self.action,
            key: self.action.key(),
            confirmed_at: now,
            held_since: since,
        })
    }

    /// Returns to Idle, keeping `last_confirmed_at`.
    pub fn end_run(&mut self) {
        self.currently_true = false;
        self.true_since = None;
        self.false_since = None;
        self.confirmed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Timestamp {
        Timestamp::from_millis(v)
    }

    /// Feeds `(time_ms, raw)` samples and returns confirmation times.
    fn run(samples: &[(u64, bool)], policy: DebouncePolicy) -> Vec<u64> {
        let mut state = ActionState::new(Action::LeftHandRaised);
        samples
            .iter()
            .filter_map(|(t, raw)| state.observe(*raw, ms(*t), &policy))
            .map(|event| event.confirmed_at.as_duration().as_millis() as u64)
            .collect()
    }

    #[test]
    fn fires_once_when_window_is_crossed() {
        let mut state = ActionState::new(Action::LeftHandRaised);
        let policy = DebouncePolicy::default();
        let mut events = Vec::new();
        for i in 0..28 {
            let t = ms(i * 50);
            if let Some(event) = state.observe(true, t, &policy) {
                events.push(event);
            }
            if i == 10 {
                assert_eq!(state.phase(), ActionPhase::Rising);
            }
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].confirmed_at, ms(1000));
        assert_eq!(events[0].held_since, ms(0));
        assert_eq!(events[0].key, 'A');
        assert_eq!(state.phase(), ActionPhase::Confirmed);

        assert!(state.observe(false, ms(1400), &policy).is_none());
        assert_eq!(state.phase(), ActionPhase::Idle);
        assert!(!state.confirmed);
        assert_eq!(state.last_confirmed_at, Some(ms(1000)));
    }

    #[test]
    fn short_runs_never_fire() {
        let samples: Vec<(u64, bool)> = (0..40).map(|i| (i * 50, i % 19 != 18)).collect();
        assert!(run(&samples, DebouncePolicy::default()).is_empty());
    }

    #[test]
    fn each_long_run_fires_once() {
        let mut samples: Vec<(u64, bool)> = (0..=30).map(|i| (i * 50, true)).collect();
        samples.push((1550, false));
        samples.extend((32..=60).map(|i| (i * 50, true)));
        assert_eq!(run(&samples, DebouncePolicy::default()), vec![1000, 2600]);
    }

    #[test]
    fn single_false_frame_restarts_by_default() {
        let mut samples: Vec<(u64, bool)> = (0..=18).map(|i| (i * 50, true)).collect();
        samples.push((950, false));
        samples.extend((20..=30).map(|i| (i * 50, true)));
        assert!(run(&samples, DebouncePolicy::default()).is_empty());
    }

    #[test]
    fn dropout_tolerance_bridges_short_gaps() {
        let policy = DebouncePolicy {
            window: Duration::from_secs(1),
            dropout_tolerance: Duration::from_millis(120),
        };
        let mut samples: Vec<(u64, bool)> = (0..=18).map(|i| (i * 50, true)).collect();
        samples.push((950, false));
        samples.extend((20..=30).map(|i| (i * 50, true)));
        assert_eq!(run(&samples, policy), vec![1000]);

        // A gap longer than the tolerance still ends the run.
        let mut samples: Vec<(u64, bool)> = (0..=10).map(|i| (i * 50, true)).collect();
        samples.extend((11..=15).map(|i| (i * 50, false)));
        samples.extend((16..=30).map(|i| (i * 50, true)));
        assert!(run(&samples, policy).is_empty());
    }
}
