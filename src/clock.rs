//! Session-relative monotonic time.
//!
//! Every component reasons about `Timestamp`s measured from the start of the
//! session rather than `Instant`s, so recorded fixtures and tests can replay
//! exact timings.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::time::{Duration, Instant};

/// Monotonic time since the session clock was created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "millis")] Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn from_millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs.max(0.0)))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Elapsed time since `earlier`, saturating at zero.
    pub fn since(self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Duration {
        self.since(rhs)
    }
}

/// Source of session timestamps. Cheap to copy into each worker.
#[derive(Clone, Copy, Debug)]
pub struct SessionClock {
    origin: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed())
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_saturates_when_earlier_is_later() {
        let a = Timestamp::from_millis(500);
        let b = Timestamp::from_millis(800);
        assert_eq!(a.since(b), Duration::ZERO);
        assert_eq!(b - a, Duration::from_millis(300));
    }

    #[test]
    fn serializes_as_integer_millis() {
        let ts = Timestamp::from_millis(1250);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1250");
        let back: Timestamp = serde_json::from_str("1250").unwrap();
        assert_eq!(back, ts);
    }
}
