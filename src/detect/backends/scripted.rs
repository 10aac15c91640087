use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clock::Timestamp;
use crate::detect::backend::PoseEstimator;
use crate::detect::stance::Stance;
use crate::frame::Frame;
use crate::landmark::{Joint, Landmark, LandmarkSnapshot};

/// One scripted stance held for a fixed time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    pub stance: Stance,
    #[serde(rename = "hold_ms", with = "hold_millis")]
    pub hold: Duration,
}

impl ScriptStep {
    pub fn new(stance: Stance, hold: Duration) -> Self {
        Self { stance, hold }
    }
}

/// Estimator that ignores pixels and plays back a stance script.
///
/// Timing follows the frames' capture times, measured from the first frame
/// it sees. Coordinates get uniform jitter from a seeded RNG so runs are
/// reproducible.
pub struct ScriptedEstimator {
    steps: Vec<ScriptStep>,
    total: Duration,
    looping: bool,
    mirrored: bool,
    jitter: f32,
    rng: StdRng,
    started_at: Option<Timestamp>,
}

impl ScriptedEstimator {
    pub fn new(steps: Vec<ScriptStep>, mirrored: bool) -> Result<Self> {
        if steps.is_empty() {
            return Err(anyhow!("stance script must have at least one step"));
        }
        let total = steps.iter().map(|step| step.hold).sum();
        Ok(Self {
            steps,
            total,
            looping: true,
            mirrored,
            jitter: 0.0,
            rng: StdRng::seed_from_u64(0),
            started_at: None,
        })
    }

    /// Calibrate, then cycle through every action with rests in between.
    pub fn demo(mirrored: bool) -> Self {
        let rest = Duration::from_millis(1500);
        let hold = Duration::from_millis(1600);
        let mut steps = vec![ScriptStep::new(Stance::Neutral, Duration::from_secs(3))];
        for stance in [
            Stance::LeftHandUp,
            Stance::RightHandUp,
            Stance::BothHandsUp,
            Stance::LeftFootUp,
            Stance::RightFootUp,
            Stance::HeadLeft,
            Stance::HeadRight,
        ] {
            steps.push(ScriptStep::new(stance, hold));
            steps.push(ScriptStep::new(Stance::Neutral, rest));
        }
        steps.push(ScriptStep::new(Stance::Absent, Duration::from_secs(2)));
        let total = steps.iter().map(|step| step.hold).sum();
        Self {
            steps,
            total,
            looping: true,
            mirrored,
            jitter: 0.003,
            rng: StdRng::seed_from_u64(7),
            started_at: None,
        }
    }

    pub fn with_jitter(mut self, jitter: f32, seed: u64) -> Self {
        self.jitter = jitter.abs();
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Holds the last stance forever instead of restarting the script.
    pub fn once(mut self) -> Self {
        self.looping = false;
        self
    }

    fn stance_at(&self, elapsed: Duration) -> Stance {
        let mut offset = if self.looping && !self.total.is_zero() {
            Duration::from_nanos((elapsed.as_nanos() % self.total.as_nanos()) as u64)
        } else {
            elapsed
        };
        for step in &self.steps {
            if offset < step.hold {
                return step.stance;
            }
            offset -= step.hold;
        }
        self.steps
            .last()
            .map(|step| step.stance)
            .unwrap_or(Stance::Absent)
    }

    fn jittered(&mut self, snapshot: LandmarkSnapshot) -> LandmarkSnapshot {
        if !(self.jitter.is_finite() && self.jitter > 0.0) {
            return snapshot;
        }
        let jitter = self.jitter;
        let mut joints = [(Joint::Nose, Landmark::default()); Joint::COUNT];
        for (slot, (joint, landmark)) in joints.iter_mut().zip(snapshot.iter()) {
            let mut landmark = *landmark;
            if landmark.visibility > 0.0 {
                landmark.x += self.rng.gen_range(-jitter..=jitter);
                landmark.y += self.rng.gen_range(-jitter..=jitter);
            }
            *slot = (joint, landmark);
        }
        LandmarkSnapshot::from_joints(snapshot.captured_at(), joints)
    }
}

impl PoseEstimator for ScriptedEstimator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn estimate(&mut self, frame: &Frame) -> Result<Option<LandmarkSnapshot>> {
        let now = frame.captured_at;
        let start = *self.started_at.get_or_insert(now);
        let stance = self.stance_at(now.since(start));
        Ok(stance
            .observe(self.mirrored, now)
            .map(|snapshot| self.jittered(snapshot)))
    }
}

mod hold_millis {
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

    fn frame_at(ms: u64) -> Frame {
        Frame::new(vec![0u8; 2 * 2 * 3], 2, 2, ms, Timestamp::from_millis(ms)).unwrap()
    }

    #[test]
    fn follows_script_and_loops() {
        let mut estimator = ScriptedEstimator::new(
            vec![
                ScriptStep::new(Stance::Neutral, Duration::from_millis(100)),
                ScriptStep::new(Stance::Absent, Duration::from_millis(100)),
            ],
            true,
        )
        .unwrap();
        assert!(estimator.estimate(&frame_at(1000)).unwrap().is_some());
        assert!(estimator.estimate(&frame_at(1150)).unwrap().is_none());
        assert!(estimator.estimate(&frame_at(1210)).unwrap().is_some());
    }

    #[test]
    fn once_holds_last_stance() {
        let mut estimator = ScriptedEstimator::new(
            vec![
                ScriptStep::new(Stance::Absent, Duration::from_millis(100)),
                ScriptStep::new(Stance::Neutral, Duration::from_millis(100)),
            ],
            true,
        )
        .unwrap()
        .once();
        assert!(estimator.estimate(&frame_at(0)).unwrap().is_none());
        assert!(estimator.estimate(&frame_at(5000)).unwrap().is_some());
    }

    #[test]
    fn jitter_is_seeded() {
        let run = || {
            let mut estimator = ScriptedEstimator::new(
                vec![ScriptStep::new(Stance::Neutral, Duration::from_secs(1))],
                true,
            )
            .unwrap()
            .with_jitter(0.01, 42);
            estimator.estimate(&frame_at(0)).unwrap().unwrap()
        };
        let a = run();
        assert_eq!(a, run());
        assert_ne!(a, Stance::Neutral.snapshot(true, Timestamp::ZERO));
    }

    #[test]
    fn non_finite_jitter_is_ignored() {
        for jitter in [f32::INFINITY, f32::NAN] {
            let mut estimator = ScriptedEstimator::new(
                vec![ScriptStep::new(Stance::Neutral, Duration::from_secs(1))],
                true,
            )
            .unwrap()
            .with_jitter(jitter, 7);
            let snapshot = estimator.estimate(&frame_at(0)).unwrap().unwrap();
            assert_eq!(snapshot, Stance::Neutral.snapshot(true, Timestamp::ZERO));
        }
    }

    #[test]
    fn parses_script_json() {
        let steps: Vec<ScriptStep> =
            serde_json::from_str(r#"[{"stance": "left_hand_up", "hold_ms": 1200}]"#).unwrap();
        assert_eq!(steps[0], ScriptStep::new(Stance::LeftHandUp, Duration::from_millis(1200)));
    }
}
