//! Periodic-action policies and rate measurement.
//!
//! Work that should only happen "now and then" (refreshing the display
//! geometry, logging progress, reporting frame rates) goes through a
//! `Periodic` instead of ad-hoc frame counters.

use std::time::Duration;

use crate::clock::Timestamp;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cadence {
    /// Fire on every `n`th call (the first call fires).
    EveryCalls(u32),
    /// Fire when at least this much time has passed since the last firing.
    EveryInterval(Duration),
}

#[derive(Clone, Debug)]
pub struct Periodic {
    cadence: Cadence,
    calls: u64,
    last_fired: Option<Timestamp>,
}

impl Periodic {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            cadence,
            calls: 0,
            last_fired: None,
        }
    }

    pub fn every_calls(n: u32) -> Self {
        Self::new(Cadence::EveryCalls(n.max(1)))
    }

    pub fn every(interval: Duration) -> Self {
        Self::new(Cadence::EveryInterval(interval))
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Records one call and reports whether the action should run now.
    pub fn tick(&mut self, now: Timestamp) -> bool {
        let fire = match self.cadence {
            Cadence::EveryCalls(n) => self.calls % u64::from(n.max(1)) == 0,
            Cadence::EveryInterval(interval) => match self.last_fired {
                None => true,
                Some(last) => now.since(last) >= interval,
            },
        };
        self.calls += 1;
        if fire {
            self.last_fired = Some(now);
        }
        fire
    }

    pub fn reset(&mut self) {
        self.calls = 0;
        self.last_fired = None;
    }
}

/// Counts events and reports a rate once per measurement window.
#[derive(Clone, Debug)]
pub struct RateMeter {
    window: Duration,
    window_start: Option<Timestamp>,
    count: u32,
    rate: f32,
}

impl RateMeter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: None,
            count: 0,
            rate: 0.0,
        }
    }

    /// Records one event. Returns the fresh rate when a window just closed.
    pub fn record(&mut self, now: Timestamp) -> Option<f32> {
        let start = *self.window_start.get_or_insert(now);
        self.count += 1;
        let elapsed = now.since(start);
        if elapsed >= self.window && !elapsed.is_zero() {
            self.rate = self.count as f32 / elapsed.as_secs_f32();
            self.count = 0;
            self.window_start = Some(now);
            return Some(self.rate);
        }
        None
    }

    /// Last completed measurement in events per second.
    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_calls_fires_on_first_and_each_nth() {
        let mut p = Periodic::every_calls(3);
        let fired: Vec<bool> = (0..7).map(|_| p.tick(Timestamp::ZERO)).collect();
        assert_eq!(fired, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn interval_measures_from_last_firing() {
        let mut p = Periodic::every(Duration::from_millis(100));
        assert!(p.tick(Timestamp::from_millis(0)));
        assert!(!p.tick(Timestamp::from_millis(60)));
        assert!(p.tick(Timestamp::from_millis(110)));
        assert!(!p.tick(Timestamp::from_millis(200)));
        assert!(p.tick(Timestamp::from_millis(210)));
    }

    #[test]
    fn rate_meter_reports_once_per_window() {
        let mut meter = RateMeter::new(Duration::from_secs(1));
        let mut reports = Vec::new();
        for i in 0..=40 {
            if let Some(rate) = meter.record(Timestamp::from_millis(i * 50)) {
                reports.push(rate);
            }
        }
        assert_eq!(reports.len(), 2);
        assert!((reports[0] - 21.0).abs() < 0.01);
        assert!((meter.rate() - 20.0).abs() < 0.01);
    }
}
