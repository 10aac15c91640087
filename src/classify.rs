//! Geometric action classifier.
//!
//! `classify` is a pure function of a landmark snapshot and the calibration
//! baseline. Every action is evaluated on its own; an action whose joints are
//! not visible enough simply evaluates to false.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::calibration::CalibrationBaseline;
use crate::landmark::{Joint, LandmarkSnapshot, Side};

/// The seven recognised body actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    LeftHandRaised,
    RightHandRaised,
    BothHandsRaised,
    LeftFootRaised,
    RightFootRaised,
    HeadTurnedLeft,
    HeadTurnedRight,
}

impl Action {
    pub const COUNT: usize = 7;

    pub const ALL: [Action; Action::COUNT] = [
        Action::LeftHandRaised,
        Action::RightHandRaised,
        Action::BothHandsRaised,
        Action::LeftFootRaised,
        Action::RightFootRaised,
        Action::HeadTurnedLeft,
        Action::HeadTurnedRight,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Action::LeftHandRaised => "left_hand_raised",
            Action::RightHandRaised => "right_hand_raised",
            Action::BothHandsRaised => "both_hands_raised",
            Action::LeftFootRaised => "left_foot_raised",
            Action::RightFootRaised => "right_foot_raised",
            Action::HeadTurnedLeft => "head_turned_left",
            Action::HeadTurnedRight => "head_turned_right",
        }
    }

    /// Key emitted when the action is confirmed.
    pub fn key(self) -> char {
        match self {
            Action::LeftHandRaised => 'A',
            Action::RightHandRaised => 'B',
            Action::BothHandsRaised => 'C',
            Action::LeftFootRaised => 'D',
            Action::RightFootRaised => 'F',
            Action::HeadTurnedLeft => '1',
            Action::HeadTurnedRight => '2',
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        Action::ALL
            .iter()
            .copied()
            .find(|action| action.name() == wanted)
            .ok_or_else(|| anyhow!("unknown action '{}'", s))
    }
}

/// Fixed-size per-action table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActionSet<T>([T; Action::COUNT]);

impl<T: Copy> ActionSet<T> {
    pub fn filled(value: T) -> Self {
        Self([value; Action::COUNT])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Action, T)> + '_ {
        Action::ALL.iter().map(move |action| (*action, self.0[action.index()]))
    }
}

impl ActionSet<bool> {
    pub fn any(&self) -> bool {
        self.0.iter().any(|v| *v)
    }

    pub fn active(&self) -> impl Iterator<Item = Action> + '_ {
        self.iter().filter(|(_, on)| *on).map(|(action, _)| action)
    }
}

impl<T> Index<Action> for ActionSet<T> {
    type Output = T;

    fn index(&self, action: Action) -> &T {
        &self.0[action.index()]
    }
}

impl<T> IndexMut<Action> for ActionSet<T> {
    fn index_mut(&mut self, action: Action) -> &mut T {
        &mut self.0[action.index()]
    }
}

/// Raw per-frame classifier output.
pub type ClassifierResult = ActionSet<bool>;

/// Tunable geometric thresholds, in normalized frame units unless noted.
#[derive(Clone, Debug, PartialEq)]
pub struct Thresholds {
    /// Minimum rise of the wrist relative to its shoulder, versus baseline.
    pub hand_raise: f32,
    /// Maximum difference between the two hand rises for "both hands".
    pub both_hands_symmetry: f32,
    /// Ankle rise as a fraction of the baseline hip-to-ankle distance.
    pub foot_raise_ratio: f32,
    /// Nose shift relative to the shoulder midpoint as a fraction of baseline shoulder width.
    pub head_turn_ratio: f32,
    /// Joints below this visibility are treated as not seen.
    pub min_visibility: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            hand_raise: 0.15,
            both_hands_symmetry: 0.075,
            foot_raise_ratio: 0.25,
            head_turn_ratio: 0.12,
            min_visibility: 0.5,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClassifierSettings {
    pub thresholds: Thresholds,
    /// The camera image is flipped before estimation, so the user's left arm
    /// carries the estimator's right-side labels.
    pub mirrored: bool,
    pub enabled: ActionSet<bool>,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            mirrored: true,
            enabled: ActionSet::filled(true),
        }
    }
}

impl ClassifierSettings {
    /// Estimator side carrying the user's `side` limb.
    fn labelled(&self, side: Side) -> Side {
        if self.mirrored {
            side.opposite()
        } else {
            side
        }
    }
}

/// Evaluates every enabled action against the baseline.
///
/// Returns all-false when no valid baseline is available.
pub fn classify(
    snapshot: &LandmarkSnapshot,
    baseline: Option<&CalibrationBaseline>,
    settings: &ClassifierSettings,
) -> ClassifierResult {
    let mut result = ClassifierResult::default();
    let Some(baseline) = baseline else {
        return result;
    };
    let t = &settings.thresholds;

    let left_rise = hand_rise(snapshot, baseline, settings.labelled(Side::Left), t);
    let right_rise = hand_rise(snapshot, baseline, settings.labelled(Side::Right), t);
    let left_up = left_rise.is_some_and(|rise| rise > t.hand_raise);
    let right_up = right_rise.is_some_and(|rise| rise > t.hand_raise);

    if settings.enabled[Action::LeftHandRaised] {
        result[Action::LeftHandRaised] = left_up;
    }
    if settings.enabled[Action::RightHandRaised] {
        result[Action::RightHandRaised] = right_up;
    }
    if settings.enabled[Action::BothHandsRaised] {
        result[Action::BothHandsRaised] = match (left_rise, right_rise) {
            (Some(l), Some(r)) if left_up && right_up => (l - r).abs() < t.both_hands_symmetry,
            _ => false,
        };
    }
    if settings.enabled[Action::LeftFootRaised] {
        result[Action::LeftFootRaised] =
            foot_raised(snapshot, baseline, settings.labelled(Side::Left), t);
    }
    if settings.enabled[Action::RightFootRaised] {
        result[Action::RightFootRaised] =
            foot_raised(snapshot, baseline, settings.labelled(Side::Right), t);
    }

    if let Some(shift) = head_shift(snapshot, baseline, t) {
        // Image-space shift toward smaller x is the user's left in a mirrored view.
        let user_left = if settings.mirrored { -shift } else { shift };
        if settings.enabled[Action::HeadTurnedLeft] {
            result[Action::HeadTurnedLeft] = user_left > t.head_turn_ratio;
        }
        if settings.enabled[Action::HeadTurnedRight] {
            result[Action::HeadTurnedRight] = -user_left > t.head_turn_ratio;
        }
    }

    result
}

/// Upward wrist movement relative to its shoulder, compared with the baseline.
fn hand_rise(
    snapshot: &LandmarkSnapshot,
    baseline: &CalibrationBaseline,
    side: Side,
    t: &Thresholds,
) -> Option<f32> {
    let wrist = snapshot.visible(side.wrist(), t.min_visibility)?;
    let shoulder = snapshot.visible(side.shoulder(), t.min_visibility)?;
    let base_wrist = baseline.position(side.wrist());
    let base_shoulder = baseline.position(side.shoulder());
    let baseline_offset = base_wrist.y - base_shoulder.y;
    let current_offset = wrist.y - shoulder.y;
    Some(baseline_offset - current_offset)
}

fn foot_raised(
    snapshot: &LandmarkSnapshot,
    baseline: &CalibrationBaseline,
    side: Side,
    t: &Thresholds,
) -> bool {
    let Some(ankle) = snapshot.visible(side.ankle(), t.min_visibility) else {
        return false;
    };
    let base_ankle = baseline.position(side.ankle());
    let leg = baseline.leg_length(side);
    if leg <= f32::EPSILON {
        return false;
    }
    (base_ankle.y - ankle.y) > t.foot_raise_ratio * leg
}

/// Horizontal nose shift relative to the shoulder midpoint, as a fraction of
/// the baseline shoulder width. Positive means toward larger image x.
fn head_shift(
    snapshot: &LandmarkSnapshot,
    baseline: &CalibrationBaseline,
    t: &Thresholds,
) -> Option<f32> {
    let nose = snapshot.visible(Joint::Nose, t.min_visibility)?;
    let left = snapshot.visible(Joint::LeftShoulder, t.min_visibility)?;
    let right = snapshot.visible(Joint::RightShoulder, t.min_visibility)?;
    let width = baseline.shoulder_width();
    if width <= f32::EPSILON {
        return None;
    }
    let current = nose.x - (left.x + right.x) / 2.0;
    Some((current - baseline.head_offset_x()) / width)
}
