//! Local interpolation of authoritative snapshots
//!
//! A participant that drives a body with its input but does not simulate it
//! only sees the body move when a replicated snapshot arrives, once per fixed
//! tick. The interpolator turns those discrete snapshots into a smooth pose
//! sampled at the render rate:
//!
//! 1. New snapshot values shift the window (previous := old current,
//!    current := new) and reset the timer
//! 2. The timer advances by the render frame time
//! 3. `t = clamp(timer / fixed_tick_duration, 0, 1)`
//! 4. At `t >= 1` the window collapses (previous := current), so output
//!    never runs past the last snapshot if updates stop
//! 5. Output is lerp(position) and slerp(rotation) at `t`
//!
//! Latency added is at most one tick.

use tracing::debug;

use crate::game::state::{EntityId, Pose};
use crate::net::authority::AuthorityView;
use crate::net::change_detector::{ChangeDetector, PropertyChange};
use crate::net::tick_store::{AuthoritativeTickStore, Snapshot};
use crate::util::quat::Quat;
use crate::util::vec3::Vec3;

/// Values that can be blended between two snapshots
pub trait Interpolate: Copy {
    fn interpolate(&self, to: &Self, t: f32) -> Self;
}

impl Interpolate for Vec3 {
    fn interpolate(&self, to: &Self, t: f32) -> Self {
        self.lerp(*to, t)
    }
}

impl Interpolate for Quat {
    fn interpolate(&self, to: &Self, t: f32) -> Self {
        self.slerp(*to, t)
    }
}

/// The two most recent values of one tracked property
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterpolationWindow<T> {
    previous: T,
    current: T,
}

impl<T: Interpolate> InterpolationWindow<T> {
    /// Degenerate window holding `value` twice
    pub fn new(value: T) -> Self {
        Self {
            previous: value,
            current: value,
        }
    }

    /// Shift in a newer value
    pub fn push(&mut self, value: T) {
        self.previous = self.current;
        self.current = value;
    }

    /// Drop the previous value (previous := current)
    pub fn collapse(&mut self) {
        self.previous = self.current;
    }

    pub fn sample(&self, t: f32) -> T {
        self.previous.interpolate(&self.current, t)
    }

    pub fn previous(&self) -> T {
        self.previous
    }

    pub fn current(&self) -> T {
        self.current
    }
}

/// Whether the interpolator drives the rendered pose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpolatorState {
    /// Local participant either simulates the entity or does not drive it
    Idle,
    /// Input authority without state authority: smoothing replicated snapshots
    Tracking,
}

/// Per-entity smoothing state owned by one observing participant
#[derive(Debug, Clone)]
pub struct LocalInterpolator {
    entity: EntityId,
    state: InterpolatorState,
    detector: ChangeDetector,
    position: InterpolationWindow<Vec3>,
    rotation: InterpolationWindow<Quat>,
    timer: f32,
    fixed_tick_duration: f32,
    collapses: u64,
}

impl LocalInterpolator {
    /// `initial` is the last known pose (spawn pose until a snapshot arrives)
    pub fn new(entity: EntityId, initial: Pose, fixed_tick_duration: f32) -> Self {
        Self::with_detector(entity, ChangeDetector::new(initial), fixed_tick_duration)
    }

    pub fn with_detector(entity: EntityId, detector: ChangeDetector, fixed_tick_duration: f32) -> Self {
        let initial = detector.observed();
        Self {
            entity,
            state: InterpolatorState::Idle,
            detector,
            position: InterpolationWindow::new(initial.position),
            rotation: InterpolationWindow::new(initial.rotation),
            timer: 0.0,
            fixed_tick_duration,
            collapses: 0,
        }
    }

    /// Input authority without state authority
    pub fn engages<V: AuthorityView + ?Sized>(view: &V, entity: EntityId) -> bool {
        view.has_input_authority(entity) && !view.is_authority_holder(entity)
    }

    /// One render step
    ///
    /// Returns the smoothed pose while tracking, `None` when idle (the caller
    /// renders the entity's own pose).
    pub fn render<V: AuthorityView + ?Sized>(
        &mut self,
        view: &V,
        store: &AuthoritativeTickStore,
        elapsed: f32,
    ) -> Option<Pose> {
        if !Self::engages(view, self.entity) {
            if self.state == InterpolatorState::Tracking {
                debug!("Interpolator for entity {} going idle", self.entity);
            }
            self.state = InterpolatorState::Idle;
            return None;
        }

        if self.state == InterpolatorState::Idle {
            debug!("Interpolator for entity {} tracking", self.entity);
            self.state = InterpolatorState::Tracking;
        }

        if let Some(snapshot) = store.latest(self.entity) {
            self.observe(&snapshot);
        }

        Some(self.advance(elapsed))
    }

    /// Feed a snapshot; returns true if the window shifted
    pub fn observe(&mut self, snapshot: &Snapshot) -> bool {
        let changes = self.detector.detect_changes(snapshot);
        if changes.is_empty() {
            return false;
        }

        for change in &changes {
            match *change {
                PropertyChange::Position { current, .. } => self.position.push(current),
                PropertyChange::Rotation { current, .. } => self.rotation.push(current),
            }
        }
        self.timer = 0.0;
        true
    }

    /// Advance the timer by `elapsed` seconds and sample the window
    pub fn advance(&mut self, elapsed: f32) -> Pose {
        self.timer += elapsed.max(0.0);

        let t = if self.fixed_tick_duration > 0.0 {
            (self.timer / self.fixed_tick_duration).clamp(0.0, 1.0)
        } else {
            1.0
        };

        if t >= 1.0 {
            self.timer = 0.0;
            self.position.collapse();
            self.rotation.collapse();
            self.collapses += 1;
        }

        Pose::new(self.position.sample(t), self.rotation.sample(t))
    }

    /// Re-seed both windows at `pose` (teleport, respawn)
    pub fn reset(&mut self, pose: Pose) {
        self.detector = ChangeDetector::with_epsilon(pose, self.detector.rotation_epsilon());
        self.position = InterpolationWindow::new(pose.position);
        self.rotation = InterpolationWindow::new(pose.rotation);
        self.timer = 0.0;
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn state(&self) -> InterpolatorState {
        self.state
    }

    pub fn timer(&self) -> f32 {
        self.timer
    }

    pub fn position_window(&self) -> &InterpolationWindow<Vec3> {
        &self.position
    }

    pub fn rotation_window(&self) -> &InterpolationWindow<Quat> {
        &self.rotation
    }

    /// Number of times the window collapsed after a full tick
    pub fn collapse_count(&self) -> u64 {
        self.collapses
    }
}
