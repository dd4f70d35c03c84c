//! Change detection between authoritative snapshots
//!
//! The tracked set is closed: position and rotation. Each property has its
//! own equality rule:
//! - Position: exact component-wise equality
//! - Rotation: `1 - |dot(a, b)| <= epsilon`, so `q` and `-q` compare equal
//!   and the quaternion double cover never reports a spurious change

use smallvec::SmallVec;

use crate::game::constants::detection::ROTATION_EPSILON;
use crate::game::state::Pose;
use crate::net::tick_store::Snapshot;
use crate::util::quat::Quat;
use crate::util::vec3::Vec3;

/// Properties of a snapshot that are compared between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackedProperty {
    Position,
    Rotation,
}

impl TrackedProperty {
    pub const ALL: [TrackedProperty; 2] = [TrackedProperty::Position, TrackedProperty::Rotation];

    pub fn name(&self) -> &'static str {
        match self {
            TrackedProperty::Position => "position",
            TrackedProperty::Rotation => "rotation",
        }
    }

    /// Change of this property between two poses, if any
    pub fn compare(&self, previous: &Pose, current: &Pose, rotation_epsilon: f32) -> Option<PropertyChange> {
        match self {
            TrackedProperty::Position => {
                (previous.position != current.position).then_some(PropertyChange::Position {
                    previous: previous.position,
                    current: current.position,
                })
            }
            TrackedProperty::Rotation => {
                (!previous.rotation.same_rotation(current.rotation, rotation_epsilon)).then_some(
                    PropertyChange::Rotation {
                        previous: previous.rotation,
                        current: current.rotation,
                    },
                )
            }
        }
    }
}

/// One changed property with its previous and current value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyChange {
    Position { previous: Vec3, current: Vec3 },
    Rotation { previous: Quat, current: Quat },
}

impl PropertyChange {
    pub fn property(&self) -> TrackedProperty {
        match self {
            PropertyChange::Position { .. } => TrackedProperty::Position,
            PropertyChange::Rotation { .. } => TrackedProperty::Rotation,
        }
    }
}

/// Changed properties, in [`TrackedProperty::ALL`] order
pub type ChangeSet = SmallVec<[PropertyChange; 2]>;

/// Compare two poses property by property
pub fn detect(previous: &Pose, current: &Pose, rotation_epsilon: f32) -> ChangeSet {
    TrackedProperty::ALL
        .iter()
        .filter_map(|property| property.compare(previous, current, rotation_epsilon))
        .collect()
}

/// Remembers the last observed pose of one entity and reports what changed
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    observed: Pose,
    observed_tick: Option<u64>,
    rotation_epsilon: f32,
}

impl ChangeDetector {
    /// Start from a known pose (usually the spawn pose)
    pub fn new(baseline: Pose) -> Self {
        Self::with_epsilon(baseline, ROTATION_EPSILON)
    }

    pub fn with_epsilon(baseline: Pose, rotation_epsilon: f32) -> Self {
        Self {
            observed: baseline,
            observed_tick: None,
            rotation_epsilon,
        }
    }

    /// Changes between the last observed pose and `current`
    ///
    /// Only reported properties move the baseline, so a rotation drifting
    /// below the epsilon each tick is still reported once the total drift
    /// exceeds it.
    pub fn detect_changes(&mut self, current: &Snapshot) -> ChangeSet {
        let pose = current.pose();
        let changes = detect(&self.observed, &pose, self.rotation_epsilon);

        for change in &changes {
            match change {
                PropertyChange::Position { current, .. } => self.observed.position = *current,
                PropertyChange::Rotation { current, .. } => self.observed.rotation = *current,
            }
        }
        self.observed_tick = Some(current.tick());

        changes
    }

    pub fn observed(&self) -> Pose {
        self.observed
    }

    pub fn rotation_epsilon(&self) -> f32 {
        self.rotation_epsilon
    }

    /// Tick of the last snapshot passed to [`ChangeDetector::detect_changes`]
    pub fn observed_tick(&self) -> Option<u64> {
        self.observed_tick
    }
}
