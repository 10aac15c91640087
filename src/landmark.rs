//! Per-frame skeletal landmarks.
//!
//! A `LandmarkSnapshot` is produced once per camera frame by a pose estimator
//! and is never mutated afterwards. Joints the estimator could not see are
//! stored with zero visibility rather than omitted, so consumers only ever
//! deal with "low confidence", never "missing".

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::clock::Timestamp;

/// Tracked body joints, in COCO keypoint order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joint {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const COUNT: usize = 17;

    pub const ALL: [Joint; Joint::COUNT] = [
        Joint::Nose,
        Joint::LeftEye,
        Joint::RightEye,
        Joint::LeftEar,
        Joint::RightEar,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Body side as labelled by the pose estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    pub fn shoulder(self) -> Joint {
        match self {
            Side::Left => Joint::LeftShoulder,
            Side::Right => Joint::RightShoulder,
        }
    }

    pub fn wrist(self) -> Joint {
        match self {
            Side::Left => Joint::LeftWrist,
            Side::Right => Joint::RightWrist,
        }
    }

    pub fn hip(self) -> Joint {
        match self {
            Side::Left => Joint::LeftHip,
            Side::Right => Joint::RightHip,
        }
    }

    pub fn ankle(self) -> Joint {
        match self {
            Side::Left => Joint::LeftAnkle,
            Side::Right => Joint::RightAnkle,
        }
    }
}

/// One joint position. `x`/`y` are normalized to the frame, `y` grows downward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    /// Estimator confidence in [0, 1].
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility: visibility.clamp(0.0, 1.0),
        }
    }
}

/// Immutable set of joint positions for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "SnapshotRecord", into = "SnapshotRecord")]
pub struct LandmarkSnapshot {
    captured_at: Timestamp,
    joints: [Landmark; Joint::COUNT],
}

impl LandmarkSnapshot {
    pub fn new(captured_at: Timestamp, joints: [Landmark; Joint::COUNT]) -> Self {
        Self {
            captured_at,
            joints,
        }
    }

    /// Snapshot standing in for a "no pose detected" frame.
    pub fn empty(captured_at: Timestamp) -> Self {
        Self::new(captured_at, [Landmark::default(); Joint::COUNT])
    }

    /// Builds a snapshot from the joints the estimator reported; the rest are
    /// left invisible.
    pub fn from_joints(
        captured_at: Timestamp,
        joints: impl IntoIterator<Item = (Joint, Landmark)>,
    ) -> Self {
        let mut all = [Landmark::default(); Joint::COUNT];
        for (joint, landmark) in joints {
            all[joint.index()] = landmark;
        }
        Self::new(captured_at, all)
    }

    pub fn captured_at(&self) -> Timestamp {
        self.captured_at
    }

    pub fn get(&self, joint: Joint) -> &Landmark {
        &self.joints[joint.index()]
    }

    /// Returns the landmark only when its visibility reaches `min_visibility`.
    pub fn visible(&self, joint: Joint, min_visibility: f32) -> Option<&Landmark> {
        let landmark = self.get(joint);
        (landmark.visibility >= min_visibility).then_some(landmark)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Joint, &Landmark)> {
        Joint::ALL.iter().map(move |joint| (*joint, self.get(*joint)))
    }

    /// Copy of this snapshot re-stamped with a new capture time.
    pub fn restamped(&self, captured_at: Timestamp) -> Self {
        Self::new(captured_at, self.joints)
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct SnapshotRecord {
    #[serde(rename = "timestamp_ms")]
    captured_at: Timestamp,
    landmarks: BTreeMap<Joint, Landmark>,
}

impl From<SnapshotRecord> for LandmarkSnapshot {
    fn from(record: SnapshotRecord) -> Self {
        LandmarkSnapshot::from_joints(record.captured_at, record.landmarks)
    }
}

impl From<LandmarkSnapshot> for SnapshotRecord {
    fn from(snapshot: LandmarkSnapshot) -> Self {
        SnapshotRecord {
            captured_at: snapshot.captured_at,
            landmarks: snapshot
                .iter()
                .filter(|(_, landmark)| landmark.visibility > 0.0)
                .map(|(joint, landmark)| (joint, *landmark))
                .collect(),
        }
    }
}
