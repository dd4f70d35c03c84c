//! Goal triggers and the goal event relay
//!
//! Every participant evaluates the ball against the goal volumes, but only
//! the ball's state authority holder raises "entered goal". Observers track
//! overlap state the same way and stay silent, so one physical overlap
//! produces exactly one event session-wide.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::game::constants::field;
use crate::game::state::EntityId;
use crate::net::authority::AuthorityView;
use crate::util::vec3::Vec3;

/// Goal volume identifier
pub type GoalId = u32;

/// Subscription handle returned by [`GoalRelay::subscribe`]
pub type ListenerId = u64;

/// Collision layer of a trigger volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CollisionLayer {
    Default,
    Goal,
}

/// Axis-aligned box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Box spanning two corners in any order
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Sphere touches or overlaps the box
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        let closest = center.max(self.min).min(self.max);
        closest.distance_sq_to(center) <= radius * radius
    }
}

/// A trigger volume the ball can overlap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerVolume {
    pub id: GoalId,
    pub layer: CollisionLayer,
    pub bounds: Aabb,
}

impl TriggerVolume {
    /// Volume on the goal layer
    pub fn goal(id: GoalId, bounds: Aabb) -> Self {
        Self {
            id,
            layer: CollisionLayer::Goal,
            bounds,
        }
    }

    pub fn is_goal(&self) -> bool {
        self.layer == CollisionLayer::Goal
    }
}

/// The two goals at either end of the field
pub fn default_goals() -> Vec<TriggerVolume> {
    let half_width = field::GOAL_WIDTH * 0.5;
    let near = field::HALF_LENGTH;
    let far = field::HALF_LENGTH + field::GOAL_DEPTH;

    vec![
        TriggerVolume::goal(
            0,
            Aabb::new(
                Vec3::new(-half_width, -1.0, near),
                Vec3::new(half_width, field::GOAL_HEIGHT, far),
            ),
        ),
        TriggerVolume::goal(
            1,
            Aabb::new(
                Vec3::new(-half_width, -1.0, -near),
                Vec3::new(half_width, field::GOAL_HEIGHT, -far),
            ),
        ),
    ]
}

/// Ball entered a goal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoalEvent {
    pub ball: EntityId,
    pub goal: GoalId,
    pub tick: u64,
}

type GoalListener = Box<dyn FnMut(&GoalEvent) + Send>;

/// Listener lists keyed by ball entity plus per-goal overlap state
pub struct GoalRelay {
    listeners: HashMap<EntityId, Vec<(ListenerId, GoalListener)>>,
    overlapping: HashSet<(EntityId, GoalId)>,
    next_listener: ListenerId,
}

impl GoalRelay {
    pub fn new() -> Self {
        Self {
            listeners: HashMap::new(),
            overlapping: HashSet::new(),
            next_listener: 1,
        }
    }

    /// Listen for goals scored by `ball`; listeners run in subscription order
    pub fn subscribe<F>(&mut self, ball: EntityId, listener: F) -> ListenerId
    where
        F: FnMut(&GoalEvent) + Send + 'static,
    {
        let id = self.next_listener;
        self.next_listener += 1;
        self.listeners
            .entry(ball)
            .or_default()
            .push((id, Box::new(listener)));
        id
    }

    /// Remove one listener; false if it was not subscribed
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|(listener_id, _)| *listener_id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Remove every listener tied to `ball`; returns how many were removed
    pub fn unsubscribe_entity(&mut self, ball: EntityId) -> usize {
        self.listeners.remove(&ball).map_or(0, |list| list.len())
    }

    /// Drop all state for a despawned ball
    pub fn forget(&mut self, ball: EntityId) -> usize {
        self.overlapping.retain(|(entity, _)| *entity != ball);
        self.unsubscribe_entity(ball)
    }

    pub fn listener_count(&self, ball: EntityId) -> usize {
        self.listeners.get(&ball).map_or(0, Vec::len)
    }

    pub fn is_overlapping(&self, ball: EntityId, goal: GoalId) -> bool {
        self.overlapping.contains(&(ball, goal))
    }

    /// One overlap evaluation of `ball` against `triggers`
    ///
    /// Raises an event on each overlap start with a goal-layer volume, and
    /// only if `view` holds state authority over the ball. Returns the
    /// number of events raised.
    pub fn evaluate<V: AuthorityView + ?Sized>(
        &mut self,
        view: &V,
        ball: EntityId,
        position: Vec3,
        radius: f32,
        triggers: &[TriggerVolume],
        tick: u64,
    ) -> usize {
        let authoritative = view.is_authority_holder(ball);
        let mut raised = 0;

        for trigger in triggers.iter().filter(|t| t.is_goal()) {
            let key = (ball, trigger.id);
            let overlapping = trigger.bounds.intersects_sphere(position, radius);

            if !overlapping {
                self.overlapping.remove(&key);
                continue;
            }

            // Still inside since the last evaluation
            if !self.overlapping.insert(key) {
                continue;
            }

            if !authoritative {
                debug!("Ball {} entered goal {} (observer, not raising)", ball, trigger.id);
                continue;
            }

            let event = GoalEvent {
                ball,
                goal: trigger.id,
                tick,
            };
            info!("Ball {} entered goal {} on tick {}", ball, trigger.id, tick);

            if let Some(list) = self.listeners.get_mut(&ball) {
                for (_, listener) in list.iter_mut() {
                    listener(&event);
                }
            }
            raised += 1;
        }

        raised
    }
}

impl Default for GoalRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Flags {
        state: bool,
    }

    impl AuthorityView for Flags {
        fn is_authority_holder(&self, _entity: EntityId) -> bool {
            self.state
        }

        fn has_input_authority(&self, _entity: EntityId) -> bool {
            false
        }
    }

    const HOLDER: Flags = Flags { state: true };
    const OBSERVER: Flags = Flags { state: false };
    const BALL: EntityId = 9;

    fn goal() -> Vec<TriggerVolume> {
        vec![TriggerVolume::goal(
            0,
            Aabb::new(Vec3::new(-1.0, -1.0, 10.0), Vec3::new(1.0, 1.0, 12.0)),
        )]
    }

    fn inside() -> Vec3 {
        Vec3::new(0.0, 0.0, 11.0)
    }

    fn outside() -> Vec3 {
        Vec3::ZERO
    }

    fn recording(relay: &mut GoalRelay) -> Arc<Mutex<Vec<GoalEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        relay.subscribe(BALL, move |e| sink.lock().unwrap().push(*e));
        events
    }

    #[test]
    fn test_aabb_sphere_intersection() {
        let bounds = Aabb::new(Vec3::new(1.0, 1.0, 1.0), Vec3::new(-1.0, -1.0, -1.0));
        assert!(bounds.intersects_sphere(Vec3::ZERO, 0.1));
        assert!(bounds.intersects_sphere(Vec3::new(1.2, 0.0, 0.0), 0.25));
        assert!(!bounds.intersects_sphere(Vec3::new(2.0, 0.0, 0.0), 0.5));
        // Corner-touching counts
        assert!(bounds.intersects_sphere(Vec3::new(1.0, -1.0, 0.0), 0.0));
    }

    #[test]
    fn test_only_authority_holder_raises() {
        let triggers = goal();
        let mut host = GoalRelay::new();
        let mut client = GoalRelay::new();
        let host_events = recording(&mut host);
        let client_events = recording(&mut client);

        assert_eq!(host.evaluate(&HOLDER, BALL, inside(), 0.25, &triggers, 5), 1);
        assert_eq!(client.evaluate(&OBSERVER, BALL, inside(), 0.25, &triggers, 5), 0);

        assert_eq!(
            *host_events.lock().unwrap(),
            vec![GoalEvent {
                ball: BALL,
                goal: 0,
                tick: 5
            }]
        );
        assert!(client_events.lock().unwrap().is_empty());
        assert!(client.is_overlapping(BALL, 0));
    }

    #[test]
    fn test_once_per_overlap_start() {
        let triggers = goal();
        let mut relay = GoalRelay::new();
        let events = recording(&mut relay);

        for tick in 0..5 {
            relay.evaluate(&HOLDER, BALL, inside(), 0.25, &triggers, tick);
        }
        assert_eq!(events.lock().unwrap().len(), 1);

        relay.evaluate(&HOLDER, BALL, outside(), 0.25, &triggers, 5);
        relay.evaluate(&HOLDER, BALL, inside(), 0.25, &triggers, 6);
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_non_goal_layer_is_ignored() {
        let triggers = vec![TriggerVolume {
            id: 3,
            layer: CollisionLayer::Default,
            bounds: Aabb::new(Vec3::new(-1.0, -1.0, -1.0), Vec3::ONE),
        }];
        let mut relay = GoalRelay::new();
        assert_eq!(relay.evaluate(&HOLDER, BALL, Vec3::ZERO, 0.25, &triggers, 0), 0);
    }

    #[test]
    fn test_listeners_run_in_subscription_order() {
        let triggers = goal();
        let mut relay = GoalRelay::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let order = order.clone();
            relay.subscribe(BALL, move |_| order.lock().unwrap().push(n));
        }
        relay.evaluate(&HOLDER, BALL, inside(), 0.25, &triggers, 0);

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe() {
        let triggers = goal();
        let mut relay = GoalRelay::new();
        let events = Arc::new(Mutex::new(0));
        let sink = events.clone();
        let id = relay.subscribe(BALL, move |_| *sink.lock().unwrap() += 1);

        assert!(relay.unsubscribe(id));
        assert!(!relay.unsubscribe(id));
        assert_eq!(relay.listener_count(BALL), 0);

        // Still raised, nobody listening
        assert_eq!(relay.evaluate(&HOLDER, BALL, inside(), 0.25, &triggers, 0), 1);
        assert_eq!(*events.lock().unwrap(), 0);
    }

    #[test]
    fn test_forget_clears_listeners_and_overlap() {
        let triggers = goal();
        let mut relay = GoalRelay::new();
        recording(&mut relay);
        recording(&mut relay);
        relay.evaluate(&HOLDER, BALL, inside(), 0.25, &triggers, 0);

        assert_eq!(relay.forget(BALL), 2);
        assert!(!relay.is_overlapping(BALL, 0));
        assert_eq!(relay.listener_count(BALL), 0);
    }

    #[test]
    fn test_default_goals_are_at_both_ends() {
        let goals = default_goals();
        assert_eq!(goals.len(), 2);
        assert!(goals.iter().all(TriggerVolume::is_goal));
        assert!(goals[0].bounds.min.z > 0.0);
        assert!(goals[1].bounds.max.z < 0.0);
    }
}
