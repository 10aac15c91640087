//! Canonical body stances used by the scripted estimator and test fixtures.
//!
//! Stances are described from the user's point of view. `mirrored` selects
//! whether the estimator sees a flipped image, in which case the user's left
//! limbs carry right-side labels.

use serde::{Deserialize, Serialize};

use crate::clock::Timestamp;
use crate::landmark::{Joint, Landmark, LandmarkSnapshot, Side};

const VISIBLE: f32 = 0.95;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stance {
    Neutral,
    LeftHandUp,
    RightHandUp,
    BothHandsUp,
    LeftFootUp,
    RightFootUp,
    HeadLeft,
    HeadRight,
    /// Ankles out of view.
    AnklesHidden,
    /// Shoulders wider than the calibration limit.
    TooClose,
    /// Torso leaning sideways.
    Leaning,
    /// Nobody in view.
    Absent,
}

impl Stance {
    /// Landmark snapshot for this stance, or `None` for `Absent`.
    pub fn observe(self, mirrored: bool, at: Timestamp) -> Option<LandmarkSnapshot> {
        match self {
            Stance::Absent => None,
            other => Some(other.snapshot(mirrored, at)),
        }
    }

    /// Landmark snapshot for this stance. `Absent` yields an empty snapshot.
    pub fn snapshot(self, mirrored: bool, at: Timestamp) -> LandmarkSnapshot {
        if self == Stance::Absent {
            return LandmarkSnapshot::empty(at);
        }
        let mut joints = neutral();
        let labelled = |user: Side| if mirrored { user.opposite() } else { user };
        let set = |joints: &mut [(f32, f32, f32); Joint::COUNT], joint: Joint, x: f32, y: f32| {
            let entry = &mut joints[joint.index()];
            entry.0 = x;
            entry.1 = y;
        };

        match self {
            Stance::LeftHandUp => raise_hand(&mut joints, labelled(Side::Left)),
            Stance::RightHandUp => raise_hand(&mut joints, labelled(Side::Right)),
            Stance::BothHandsUp => {
                raise_hand(&mut joints, Side::Left);
                raise_hand(&mut joints, Side::Right);
            }
            Stance::LeftFootUp => raise_foot(&mut joints, labelled(Side::Left)),
            Stance::RightFootUp => raise_foot(&mut joints, labelled(Side::Right)),
            Stance::HeadLeft | Stance::HeadRight => {
                // The user's left is toward smaller image x in a mirrored view.
                let toward_user_left = if mirrored { -0.04 } else { 0.04 };
                let dx = if self == Stance::HeadLeft {
                    toward_user_left
                } else {
                    -toward_user_left
                };
                for joint in [
                    Joint::Nose,
                    Joint::LeftEye,
                    Joint::RightEye,
                    Joint::LeftEar,
                    Joint::RightEar,
                ] {
                    joints[joint.index()].0 += dx;
                }
            }
            Stance::AnklesHidden => {
                joints[Joint::LeftAnkle.index()].2 = 0.0;
                joints[Joint::RightAnkle.index()].2 = 0.0;
            }
            Stance::TooClose => {
                set(&mut joints, Joint::LeftShoulder, 0.65, 0.30);
                set(&mut joints, Joint::RightShoulder, 0.35, 0.30);
            }
            Stance::Leaning => {
                for joint in [
                    Joint::Nose,
                    Joint::LeftEye,
                    Joint::RightEye,
                    Joint::LeftEar,
                    Joint::RightEar,
                    Joint::LeftShoulder,
                    Joint::RightShoulder,
                ] {
                    joints[joint.index()].0 += 0.1;
                }
            }
            Stance::Neutral | Stance::Absent => {}
        }

        LandmarkSnapshot::from_joints(
            at,
            Joint::ALL.iter().map(|joint| {
                let (x, y, visibility) = joints[joint.index()];
                (*joint, Landmark::new(x, y, visibility))
            }),
        )
    }
}

fn neutral() -> [(f32, f32, f32); Joint::COUNT] {
    let mut joints = [(0.0, 0.0, VISIBLE); Joint::COUNT];
    let place = [
        (Joint::Nose, 0.50, 0.20),
        (Joint::LeftEye, 0.52, 0.18),
        (Joint::RightEye, 0.48, 0.18),
        (Joint::LeftEar, 0.54, 0.19),
        (Joint::RightEar, 0.46, 0.19),
        (Joint::LeftShoulder, 0.58, 0.30),
        (Joint::RightShoulder, 0.42, 0.30),
        (Joint::LeftElbow, 0.61, 0.42),
        (Joint::RightElbow, 0.39, 0.42),
        (Joint::LeftWrist, 0.62, 0.55),
        (Joint::RightWrist, 0.38, 0.55),
        (Joint::LeftHip, 0.55, 0.55),
        (Joint::RightHip, 0.45, 0.55),
        (Joint::LeftKnee, 0.55, 0.72),
        (Joint::RightKnee, 0.45, 0.72),
        (Joint::LeftAnkle, 0.55, 0.90),
        (Joint::RightAnkle, 0.45, 0.90),
    ];
    for (joint, x, y) in place {
        joints[joint.index()] = (x, y, VISIBLE);
    }
    joints
}

fn raise_hand(joints: &mut [(f32, f32, f32); Joint::COUNT], side: Side) {
    let elbow = match side {
        Side::Left => Joint::LeftElbow,
        Side::Right => Joint::RightElbow,
    };
    joints[elbow.index()].1 = 0.22;
    joints[side.wrist().index()].1 = 0.10;
}

fn raise_foot(joints: &mut [(f32, f32, f32); Joint::COUNT], side: Side) {
    let knee = match side {
        Side::Left => Joint::LeftKnee,
        Side::Right => Joint::RightKnee,
    };
    joints[knee.index()].1 = 0.62;
    joints[side.ankle().index()].1 = 0.75;
}
