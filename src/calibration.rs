//! Calibration baseline management.
//!
//! The manager watches early frames for a complete, level, well-framed body.
//! Once enough consecutive frames pass, their mean becomes the neutral-stance
//! baseline every action threshold is measured against. A valid baseline is
//! frozen until `reset()` is called or the body has been out of view for
//! longer than the loss timeout.

use std::time::Duration;

use crate::clock::Timestamp;
use crate::landmark::{Joint, Landmark, LandmarkSnapshot, Side};
use crate::periodic::Periodic;

/// Joints that must be visible for calibration and for tracking to count as present.
pub const REQUIRED_JOINTS: [Joint; 9] = [
    Joint::Nose,
    Joint::LeftShoulder,
    Joint::RightShoulder,
    Joint::LeftHip,
    Joint::RightHip,
    Joint::LeftWrist,
    Joint::RightWrist,
    Joint::LeftAnkle,
    Joint::RightAnkle,
];

#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationSettings {
    /// Consecutive passing frames needed before the baseline is taken.
    pub required_frames: u32,
    pub visibility_threshold: f32,
    /// Required joints must stay this far inside every frame edge.
    pub edge_margin: f32,
    pub min_shoulder_width: f32,
    pub max_shoulder_width: f32,
    /// Limit on shoulder tilt, hip tilt and torso lean.
    pub stability_tolerance: f32,
    /// Continuous body loss after which a valid baseline is discarded.
    pub loss_timeout: Duration,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            required_frames: 15,
            visibility_threshold: 0.5,
            edge_margin: 0.05,
            min_shoulder_width: 0.12,
            max_shoulder_width: 0.25,
            stability_tolerance: 0.08,
            loss_timeout: Duration::from_secs(3),
        }
    }
}

/// Why a frame could not be used for calibration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationIssue {
    /// A required joint is below the visibility threshold.
    BodyIncomplete(Joint),
    /// A required joint is too close to the frame edge.
    OutOfFrame(Joint),
    TooClose,
    TooFar,
    Unstable,
}

impl CalibrationIssue {
    /// Advisory prompt key for this issue.
    pub fn prompt_key(self) -> &'static str {
        match self {
            CalibrationIssue::BodyIncomplete(_) | CalibrationIssue::OutOfFrame(_) => {
                "body_incomplete"
            }
            CalibrationIssue::TooClose => "distance_too_close",
            CalibrationIssue::TooFar => "distance_too_far",
            CalibrationIssue::Unstable => "unstable_pose",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationState {
    Absent,
    Pending { stable_frames: u32, required: u32 },
    Invalid(CalibrationIssue),
    Valid,
}

impl CalibrationState {
    pub fn is_valid(&self) -> bool {
        matches!(self, CalibrationState::Valid)
    }
}

/// Neutral-stance reference positions.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibrationBaseline {
    positions: [Landmark; Joint::COUNT],
    captured_at: Timestamp,
}

impl CalibrationBaseline {
    fn from_mean(sums: &[[f64; 4]; Joint::COUNT], frames: u32, captured_at: Timestamp) -> Self {
        let n = f64::from(frames.max(1));
        let mut positions = [Landmark::default(); Joint::COUNT];
        for (slot, sum) in positions.iter_mut().zip(sums.iter()) {
            *slot = Landmark {
                x: (sum[0] / n) as f32,
                y: (sum[1] / n) as f32,
                z: (sum[2] / n) as f32,
                visibility: (sum[3] / n) as f32,
            };
        }
        Self {
            positions,
            captured_at,
        }
    }

    pub fn position(&self, joint: Joint) -> &Landmark {
        &self.positions[joint.index()]
    }

    /// Time of the frame that completed calibration.
    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    pub fn shoulder_line_y(&self) -> f32 {
        (self.position(Joint::LeftShoulder).y + self.position(Joint::RightShoulder).y) / 2.0
    }

    pub fn hip_line_y(&self) -> f32 {
        (self.position(Joint::LeftHip).y + self.position(Joint::RightHip).y) / 2.0
    }

    pub fn head_position(&self) -> &Landmark {
        self.position(Joint::Nose)
    }

    pub fn shoulder_width(&self) -> f32 {
        (self.position(Joint::LeftShoulder).x - self.position(Joint::RightShoulder).x).abs()
    }

    /// Nose x relative to the shoulder midpoint.
    pub fn head_offset_x(&self) -> f32 {
        let mid =
            (self.position(Joint::LeftShoulder).x + self.position(Joint::RightShoulder).x) / 2.0;
        self.head_position().x - mid
    }

    /// Vertical hip-to-ankle distance on one estimator side.
    pub fn leg_length(&self, side: Side) -> f32 {
        self.position(side.ankle()).y - self.position(side.hip()).y
    }
}

pub struct CalibrationManager {
    settings: CalibrationSettings,
    state: CalibrationState,
    sums: [[f64; 4]; Joint::COUNT],
    stable_frames: u32,
    baseline: Option<CalibrationBaseline>,
    lost_since: Option<Timestamp>,
    progress_log: Periodic,
}

impl CalibrationManager {
    pub fn new(settings: CalibrationSettings) -> Self {
        Self {
            settings,
            state: CalibrationState::Absent,
            sums: [[0.0; 4]; Joint::COUNT],
            stable_frames: 0,
            baseline: None,
            lost_since: None,
            progress_log: Periodic::every_calls(5),
        }
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    pub fn state(&self) -> CalibrationState {
        self.state
    }

    /// The baseline, only while calibration is valid.
    pub fn baseline(&self) -> Option<&CalibrationBaseline> {
        self.baseline.as_ref()
    }

    /// Feeds one frame into the calibration state machine.
    pub fn accumulate(&mut self, snapshot: &LandmarkSnapshot) -> CalibrationState {
        if self.baseline.is_some() {
            self.track_loss(snapshot);
            return self.state;
        }

        match self.check(snapshot) {
            Err(issue) => {
                if self.stable_frames > 0 {
                    log::debug!(
                        "calibration interrupted at {}/{}: {:?}",
                        self.stable_frames,
                        self.settings.required_frames,
                        issue
                    );
                }
                self.clear_accumulation();
                self.state = CalibrationState::Invalid(issue);
            }
            Ok(()) => {
                self.add_frame(snapshot);
                if self.stable_frames >= self.settings.required_frames {
                    let baseline = CalibrationBaseline::from_mean(
                        &self.sums,
                        self.stable_frames,
                        snapshot.captured_at(),
                    );
                    log::info!(
                        "calibration complete: shoulder_y={:.3} hip_y={:.3} shoulder_width={:.3}",
                        baseline.shoulder_line_y(),
                        baseline.hip_line_y(),
                        baseline.shoulder_width()
                    );
                    self.baseline = Some(baseline);
                    self.clear_accumulation();
                    self.state = CalibrationState::Valid;
                } else {
                    if self.progress_log.tick(snapshot.captured_at()) {
                        log::debug!(
                            "calibration progress {}/{}",
                            self.stable_frames,
                            self.settings.required_frames
                        );
                    }
                    self.state = CalibrationState::Pending {
                        stable_frames: self.stable_frames,
                        required: self.settings.required_frames,
                    };
                }
            }
        }
        self.state
    }

    /// Discards the baseline and any partial accumulation.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.lost_since = None;
        self.clear_accumulation();
        self.state = CalibrationState::Absent;
    }

    /// Checks that every required joint is visible and inside the frame margin.
    pub fn check_body_complete(&self, snapshot: &LandmarkSnapshot) -> Result<(), CalibrationIssue> {
        let margin = self.settings.edge_margin;
        for joint in REQUIRED_JOINTS {
            let landmark = snapshot.get(joint);
            if landmark.visibility < self.settings.visibility_threshold {
                return Err(CalibrationIssue::BodyIncomplete(joint));
            }
            if landmark.x < margin
                || landmark.x > 1.0 - margin
                || landmark.y < margin
                || landmark.y > 1.0 - margin
            {
                return Err(CalibrationIssue::OutOfFrame(joint));
            }
        }
        Ok(())
    }

    fn check(&self, snapshot: &LandmarkSnapshot) -> Result<(), CalibrationIssue> {
        self.check_body_complete(snapshot)?;

        let ls = snapshot.get(Joint::LeftShoulder);
        let rs = snapshot.get(Joint::RightShoulder);
        let lh = snapshot.get(Joint::LeftHip);
        let rh = snapshot.get(Joint::RightHip);

        let shoulder_width = (ls.x - rs.x).abs();
        if shoulder_width > self.settings.max_shoulder_width {
            return Err(CalibrationIssue::TooClose);
        }
        if shoulder_width < self.settings.min_shoulder_width {
            return Err(CalibrationIssue::TooFar);
        }

        let tol = self.settings.stability_tolerance;
        let shoulder_tilt = (ls.y - rs.y).abs();
        let hip_tilt = (lh.y - rh.y).abs();
        let lean = ((ls.x + rs.x) / 2.0 - (lh.x + rh.x) / 2.0).abs();
        if shoulder_tilt >= tol || hip_tilt >= tol || lean >= tol {
            return Err(CalibrationIssue::Unstable);
        }
        Ok(())
    }

    /// A tracked body only needs its required joints visible. Raised limbs may
    /// legitimately sit inside the edge margin.
    fn tracking(&self, snapshot: &LandmarkSnapshot) -> bool {
        REQUIRED_JOINTS
            .iter()
            .all(|joint| snapshot.visible(*joint, self.settings.visibility_threshold).is_some())
    }

    fn add_frame(&mut self, snapshot: &LandmarkSnapshot) {
        for (sum, (_, landmark)) in self.sums.iter_mut().zip(snapshot.iter()) {
            sum[0] += f64::from(landmark.x);
            sum[1] += f64::from(landmark.y);
            sum[2] += f64::from(landmark.z);
            sum[3] += f64::from(landmark.visibility);
        }
        self.stable_frames += 1;
    }

    fn clear_accumulation(&mut self) {
        self.sums = [[0.0; 4]; Joint::COUNT];
        self.stable_frames = 0;
        self.progress_log.reset();
    }

    fn track_loss(&mut self, snapshot: &LandmarkSnapshot) {
        let now = snapshot.captured_at();
        if self.tracking(snapshot) {
            self.lost_since = None;
            return;
        }
        let since = *self.lost_since.get_or_insert(now);
        if now.since(since) >= self.settings.loss_timeout {
            log::warn!(
                "body out of view for {:.1}s, discarding calibration",
                now.since(since).as_secs_f32()
            );
            self.reset();
        }
    }
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new(CalibrationSettings::default())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::detect::Stance;

    pub fn neutral_snapshot() -> LandmarkSnapshot {
        Stance::Neutral.snapshot(true, Timestamp::ZERO)
    }

    pub fn valid_baseline() -> CalibrationBaseline {
        let mut manager = CalibrationManager::default();
        for i in 0..manager.settings().required_frames {
            let at = Timestamp::from_millis(u64::from(i) * 50);
            manager.accumulate(&Stance::Neutral.snapshot(true, at));
        }
        manager.baseline().cloned().expect("neutral stance calibrates")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Stance;

    fn at(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn becomes_valid_after_required_frames() {
        let mut manager = CalibrationManager::default();
        assert_eq!(manager.state(), CalibrationState::Absent);
        for i in 0..14 {
            let state = manager.accumulate(&Stance::Neutral.snapshot(true, at(i * 50)));
            assert_eq!(
                state,
                CalibrationState::Pending {
                    stable_frames: i as u32 + 1,
                    required: 15
                }
            );
        }
        assert!(manager.baseline().is_none());
        let state = manager.accumulate(&Stance::Neutral.snapshot(true, at(700)));
        assert!(state.is_valid());
        assert!(manager.baseline().is_some());
    }

    #[test]
    fn incomplete_body_does_not_advance() {
        let mut manager = CalibrationManager::default();
        for i in 0..5 {
            manager.accumulate(&Stance::Neutral.snapshot(true, at(i * 50)));
        }
        let state = manager.accumulate(&Stance::AnklesHidden.snapshot(true, at(300)));
        assert_eq!(
            state,
            CalibrationState::Invalid(CalibrationIssue::BodyIncomplete(Joint::LeftAnkle))
        );
        let state = manager.accumulate(&Stance::Neutral.snapshot(true, at(350)));
        assert_eq!(
            state,
            CalibrationState::Pending {
                stable_frames: 1,
                required: 15
            }
        );
    }

    #[test]
    fn no_pose_reports_body_incomplete() {
        let mut manager = CalibrationManager::default();
        let state = manager.accumulate(&LandmarkSnapshot::empty(at(0)));
        assert_eq!(state, CalibrationState::Invalid(CalibrationIssue::BodyIncomplete(Joint::Nose)));
        assert_eq!(CalibrationIssue::BodyIncomplete(Joint::Nose).prompt_key(), "body_incomplete");
    }

    #[test]
    fn distance_and_stability_checks() {
        let manager = CalibrationManager::default();
        assert_eq!(
            manager.check(&Stance::TooClose.snapshot(true, at(0))),
            Err(CalibrationIssue::TooClose)
        );
        assert_eq!(
            manager.check(&Stance::Leaning.snapshot(true, at(0))),
            Err(CalibrationIssue::Unstable)
        );
    }

    #[test]
    fn valid_baseline_is_frozen() {
        let mut manager = CalibrationManager::default();
        for i in 0..15 {
            manager.accumulate(&Stance::Neutral.snapshot(true, at(i * 50)));
        }
        let frozen = manager.baseline().cloned().unwrap();
        for i in 15..40 {
            let state = manager.accumulate(&Stance::BothHandsUp.snapshot(true, at(i * 50)));
            assert!(state.is_valid());
        }
        assert_eq!(manager.baseline(), Some(&frozen));
    }

    #[test]
    fn reset_then_recalibration_reproduces_baseline() {
        let mut manager = CalibrationManager::default();
        let feed = |manager: &mut CalibrationManager| {
            for i in 0..15 {
                manager.accumulate(&Stance::Neutral.snapshot(true, at(i * 50)));
            }
        };
        feed(&mut manager);
        let first = manager.baseline().cloned().unwrap();
        manager.reset();
        assert_eq!(manager.state(), CalibrationState::Absent);
        assert!(manager.baseline().is_none());
        feed(&mut manager);
        let second = manager.baseline().cloned().unwrap();
        for joint in Joint::ALL {
            assert!((first.position(joint).x - second.position(joint).x).abs() < 1e-6);
            assert!((first.position(joint).y - second.position(joint).y).abs() < 1e-6);
        }
    }

    #[test]
    fn prolonged_loss_discards_baseline() {
        let mut manager = CalibrationManager::default();
        for i in 0..15 {
            manager.accumulate(&Stance::Neutral.snapshot(true, at(i * 50)));
        }
        assert!(manager.state().is_valid());
        // Short dropout keeps the baseline.
        manager.accumulate(&LandmarkSnapshot::empty(at(1000)));
        manager.accumulate(&LandmarkSnapshot::empty(at(2500)));
        manager.accumulate(&Stance::Neutral.snapshot(true, at(2600)));
        assert!(manager.state().is_valid());

        manager.accumulate(&LandmarkSnapshot::empty(at(3000)));
        assert!(manager.state().is_valid());
        let state = manager.accumulate(&LandmarkSnapshot::empty(at(6000)));
        assert_eq!(state, CalibrationState::Absent);
        assert!(manager.baseline().is_none());
    }

    /// Left hand up (mirrored view) with the wrist inside the top edge margin.
    fn hand_at_top_edge(now: Timestamp) -> LandmarkSnapshot {
        let raised = Stance::LeftHandUp.snapshot(true, now);
        LandmarkSnapshot::from_joints(
            now,
            raised.iter().map(|(joint, landmark)| match joint {
                Joint::RightWrist => (joint, Landmark::new(landmark.x, 0.04, 0.95)),
                _ => (joint, *landmark),
            }),
        )
    }

    #[test]
    fn raised_hand_near_top_edge_keeps_baseline() {
        let mut manager = CalibrationManager::default();
        for i in 0..15 {
            manager.accumulate(&Stance::Neutral.snapshot(true, at(i * 50)));
        }
        let frozen = manager.baseline().cloned().unwrap();

        for i in 0..120 {
            let state = manager.accumulate(&hand_at_top_edge(at(750 + i * 50)));
            assert_eq!(state, CalibrationState::Valid);
        }
        assert_eq!(manager.baseline(), Some(&frozen));

        // The same framing still fails a fresh calibration.
        manager.reset();
        assert_eq!(
            manager.accumulate(&hand_at_top_edge(at(7000))),
            CalibrationState::Invalid(CalibrationIssue::OutOfFrame(Joint::RightWrist))
        );
    }
}
