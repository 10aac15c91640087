use std::collections::HashMap;
use std::time::Duration;

use crate::clock::Timestamp;

/// Rate limiter for advisory prompts, keyed by prompt key.
///
/// A key may fire when it has never fired or when its window has elapsed
/// since the last time it fired. Attempts that are refused do not move the
/// window. Entries are only ever inserted or updated.
#[derive(Clone, Debug)]
pub struct CooldownGate {
    default_window: Duration,
    /// Per-prefix windows; the longest matching prefix wins.
    prefix_windows: Vec<(String, Duration)>,
    last_fired: HashMap<String, Timestamp>,
}

impl CooldownGate {
    pub fn new(default_window: Duration) -> Self {
        Self {
            default_window,
            prefix_windows: Vec::new(),
            last_fired: HashMap::new(),
        }
    }

    /// Overrides the window for every key starting with `prefix`.
    pub fn set_window(&mut self, prefix: impl Into<String>, window: Duration) {
        let prefix = prefix.into();
        match self.prefix_windows.iter_mut().find(|(p, _)| *p == prefix) {
            Some(entry) => entry.1 = window,
            None => self.prefix_windows.push((prefix, window)),
        }
    }

    pub fn window_for(&self, key: &str) -> Duration {
        self.prefix_windows
            .iter()
            .filter(|(prefix, _)| key.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, window)| *window)
            .unwrap_or(self.default_window)
    }

    /// Returns true and records the firing when `key` may fire at `now`.
    pub fn check(&mut self, key: &str, now: Timestamp) -> bool {
        let window = self.window_for(key);
        let may_fire = match self.last_fired.get(key) {
            None => true,
            Some(last) => now.since(*last) >= window,
        };
        if may_fire {
            self.last_fired.insert(key.to_string(), now);
        }
        may_fire
    }

    pub fn last_fired(&self, key: &str) -> Option<Timestamp> {
        self.last_fired.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.last_fired.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_fired.is_empty()
    }
}

impl Default for CooldownGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}
