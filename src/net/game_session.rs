//! Game session of one participant
//!
//! Owns everything a participant knows about the match and is driven by two
//! external loops: `fixed_tick` at the simulation rate and `render` once per
//! frame. The host simulates, writes the tick store through the authority
//! gate and replicates. A client applies what it receives and smooths the
//! body it drives.

use std::sync::Arc;
use std::time::Instant;

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::game::goal::{default_goals, GoalEvent, GoalRelay, ListenerId, TriggerVolume};
use crate::game::input_buffer::{InputBuffer, InputBufferError, InputSender};
use crate::game::interpolation::LocalInterpolator;
use crate::game::movement;
use crate::game::state::{EntityId, NetworkedEntity, ParticipantId, Pose, PrefabKind, World};
use crate::lobby::participant::Participant;
use crate::lobby::spawner::{EntityLifecycle, SpawnPlacement};
use crate::metrics::Metrics;
use crate::net::authority::{AuthorityTable, StateAuthority};
use crate::net::change_detector::ChangeDetector;
use crate::net::protocol::ReplicationMessage;
use crate::net::replication::{ReplicationHub, ReplicationLink};
use crate::net::tick_store::AuthoritativeTickStore;
use crate::net::transport::{EntityHandle, InputFrame, InputSource, LoopbackTransport};

/// Pose to draw for one entity this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedPose {
    pub entity: EntityId,
    pub kind: PrefabKind,
    pub pose: Pose,
    /// Produced by the local interpolator rather than read from the store
    pub smoothed: bool,
}

/// Outcome of one fixed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    /// Snapshots written (host) or applied (client)
    pub snapshots: usize,
    pub goals: usize,
}

/// Channels handed to a client when it connects to the host
pub struct ClientConnection {
    pub replication: ReplicationLink,
    pub input: InputSender,
}

struct HostLink {
    hub: ReplicationHub,
    lifecycle: EntityLifecycle,
    inputs: InputBuffer,
    latest_inputs: HashMap<ParticipantId, InputFrame>,
}

struct ClientLink {
    replication: ReplicationLink,
    input: InputSender,
}

enum Peer {
    Host(HostLink),
    Client(ClientLink),
}

pub struct GameSession {
    local: Participant,
    config: SessionConfig,
    world: World,
    authority: AuthorityTable,
    store: AuthoritativeTickStore,
    relay: GoalRelay,
    triggers: Vec<TriggerVolume>,
    interpolators: HashMap<EntityId, LocalInterpolator>,
    tick: u64,
    metrics: Arc<Metrics>,
    peer: Peer,
}

impl GameSession {
    /// Session of the participant that runs the match
    pub fn host(local: Participant, config: SessionConfig, metrics: Arc<Metrics>) -> Self {
        let placement = SpawnPlacement::new(config.spawn_spacing, config.max_participants);
        let peer = Peer::Host(HostLink {
            hub: ReplicationHub::with_metrics(metrics.clone()),
            lifecycle: EntityLifecycle::new(placement),
            inputs: InputBuffer::default(),
            latest_inputs: HashMap::new(),
        });
        info!("Host session {} created at {} Hz", local.id, config.tick_rate);
        Self::with_peer(local, config, metrics, peer)
    }

    /// Session of a participant connected to a host
    pub fn client(
        local: Participant,
        config: SessionConfig,
        connection: ClientConnection,
        metrics: Arc<Metrics>,
    ) -> Self {
        let peer = Peer::Client(ClientLink {
            replication: connection.replication,
            input: connection.input,
        });
        info!("Client session {} created", local.id);
        Self::with_peer(local, config, metrics, peer)
    }

    fn with_peer(local: Participant, config: SessionConfig, metrics: Arc<Metrics>, peer: Peer) -> Self {
        Self {
            local,
            config,
            world: World::new(),
            authority: AuthorityTable::new(),
            store: AuthoritativeTickStore::new(),
            relay: GoalRelay::new(),
            triggers: default_goals(),
            interpolators: HashMap::new(),
            tick: 0,
            metrics,
            peer,
        }
    }

    /// Replace the trigger volumes checked for goals
    pub fn with_triggers(mut self, triggers: Vec<TriggerVolume>) -> Self {
        self.triggers = triggers;
        self
    }

    pub fn local(&self) -> Participant {
        self.local
    }

    pub fn is_host(&self) -> bool {
        matches!(self.peer, Peer::Host(_))
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn authority(&self) -> &AuthorityTable {
        &self.authority
    }

    pub fn store(&self) -> &AuthoritativeTickStore {
        &self.store
    }

    pub fn interpolator(&self, entity: EntityId) -> Option<&LocalInterpolator> {
        self.interpolators.get(&entity)
    }

    /// Body driven by `participant`'s input
    pub fn body_of(&self, participant: ParticipantId) -> Option<EntityId> {
        self.authority.input_entity_of(participant)
    }

    /// Open replication and input channels for a new client
    ///
    /// The client immediately receives every entity that already exists
    /// with its latest snapshot. `None` on a client session.
    pub fn connect_client(&mut self, participant: ParticipantId) -> Option<ClientConnection> {
        let Peer::Host(host) = &mut self.peer else {
            warn!("Client session {} cannot accept connections", self.local.id);
            return None;
        };

        let replication = host.hub.connect(participant);
        let input = host.inputs.sender_for(participant);

        let mut entities: Vec<&NetworkedEntity> = self.world.iter().collect();
        entities.sort_by_key(|e| e.id);
        for entity in entities {
            let Some(record) = self.authority.record(entity.id) else {
                continue;
            };
            host.hub.send_to(
                participant,
                &ReplicationMessage::Spawned {
                    entity: entity.id,
                    kind: entity.kind,
                    pose: entity.pose,
                    state_authority: record.state,
                    input_authority: record.input,
                },
            );
            if let Some(snapshot) = self.store.latest(entity.id) {
                host.hub
                    .send_to(participant, &ReplicationMessage::Snapshot(snapshot));
            }
        }

        info!("Client {} connected ({} clients)", participant, host.hub.client_count());
        Some(ClientConnection { replication, input })
    }

    /// Spawn a body for `participant`; host only
    pub fn join(&mut self, participant: &Participant) -> Option<EntityHandle> {
        let Peer::Host(host) = &mut self.peer else {
            debug!("Ignoring join of {} on client session", participant.id);
            return None;
        };

        let before = self.world.len();
        let handle = {
            let mut transport =
                LoopbackTransport::new(self.local.id, &mut self.world, &mut self.authority, &mut host.hub);
            host.lifecycle.on_participant_joined(&mut transport, participant)
        };
        let spawned = self.world.len().saturating_sub(before);
        Metrics::add(&self.metrics.entities_spawned, spawned as u64);
        self.metrics
            .participants
            .store(host.lifecycle.body_count() as u64, std::sync::atomic::Ordering::Relaxed);

        if let Some(handle) = handle {
            if let Some(entity) = self.world.get(handle.id) {
                let pose = entity.pose;
                self.track_if_engaged(handle.id, pose);
            }
        }
        handle
    }

    /// Despawn `participant`'s body and close its channels; host only
    pub fn leave(&mut self, participant: ParticipantId) -> Option<EntityHandle> {
        let Peer::Host(host) = &mut self.peer else {
            debug!("Ignoring leave of {} on client session", participant);
            return None;
        };

        let handle = {
            let mut transport =
                LoopbackTransport::new(self.local.id, &mut self.world, &mut self.authority, &mut host.hub);
            host.lifecycle.on_participant_left(&mut transport, participant)
        };
        host.latest_inputs.remove(&participant);
        host.hub.disconnect(participant);
        self.metrics
            .participants
            .store(host.lifecycle.body_count() as u64, std::sync::atomic::Ordering::Relaxed);

        let handle = handle?;
        Metrics::add(&self.metrics.entities_despawned, 1);
        self.forget_entity(handle.id);
        Some(handle)
    }

    /// Listen for goals scored by the ball; `None` until the ball exists
    pub fn subscribe_goals<F>(&mut self, listener: F) -> Option<ListenerId>
    where
        F: FnMut(&GoalEvent) + Send + 'static,
    {
        let ball = self.world.ball()?.id;
        Some(self.relay.subscribe(ball, listener))
    }

    pub fn unsubscribe_goals(&mut self, id: ListenerId) -> bool {
        self.relay.unsubscribe(id)
    }

    /// One fixed simulation tick
    pub fn fixed_tick<I: InputSource + ?Sized>(&mut self, input: &mut I) -> TickReport {
        let start = Instant::now();
        self.tick += 1;
        let frame = input.collect_input();

        let snapshots = if self.is_host() {
            self.host_tick(frame)
        } else {
            self.client_tick(frame)
        };
        let goals = self.evaluate_goals();

        self.metrics.record_tick_time(start.elapsed());
        TickReport {
            tick: self.tick,
            snapshots,
            goals,
        }
    }

    fn host_tick(&mut self, frame: InputFrame) -> usize {
        let Peer::Host(host) = &mut self.peer else {
            return 0;
        };

        if self.authority.input_entity_of(self.local.id).is_some() {
            host.latest_inputs.insert(self.local.id, frame);
        }
        for (participant, message) in host.inputs.drain_latest() {
            host.latest_inputs.insert(participant, message.frame);
        }

        for (participant, frame) in &host.latest_inputs {
            if let Some(entity) = self.authority.input_entity_of(*participant) {
                movement::apply_input(&mut self.world, entity, frame, self.config.player_speed);
            }
        }
        movement::step(&mut self.world, self.config.fixed_tick_duration(), self.config.ball_drag);

        let view = self.authority.view_for(self.local.id);
        let mut written = 0;
        for entity in self.world.iter() {
            let Some(authority) = StateAuthority::acquire(&view, entity.id) else {
                continue;
            };
            let snapshot = self.store.write(authority, self.tick, entity.pose);
            host.hub.broadcast(&ReplicationMessage::Snapshot(snapshot));
            written += 1;
        }

        Metrics::add(&self.metrics.snapshots_written, written as u64);
        debug!("Host tick {}: wrote {} snapshots", self.tick, written);
        written
    }

    fn client_tick(&mut self, frame: InputFrame) -> usize {
        let messages = match &self.peer {
            Peer::Client(client) => {
                if self.authority.input_entity_of(self.local.id).is_some() {
                    match client.input.try_send(self.tick, frame) {
                        Ok(()) => {}
                        Err(InputBufferError::Full) => {
                            debug!("Input buffer full, dropping input for tick {}", self.tick)
                        }
                        Err(InputBufferError::Disconnected) => {
                            warn!("Host stopped accepting input from {}", self.local.id)
                        }
                    }
                }
                client.replication.drain()
            }
            Peer::Host(_) => return 0,
        };

        let mut applied = 0;
        for message in messages {
            if self.apply_replicated(message) {
                applied += 1;
            }
        }
        applied
    }

    /// Apply one message from the host; true if it was a fresh snapshot
    fn apply_replicated(&mut self, message: ReplicationMessage) -> bool {
        match message {
            ReplicationMessage::Spawned {
                entity,
                kind,
                pose,
                state_authority,
                input_authority,
            } => {
                if self.world.contains(entity) {
                    debug!("Duplicate spawn of {} ignored", entity);
                    return false;
                }
                self.world
                    .insert(NetworkedEntity::new(entity, kind, pose, input_authority));
                self.authority.assign(entity, state_authority, input_authority);
                self.track_if_engaged(entity, pose);
                debug!("Replicated spawn of {:?} {}", kind, entity);
                false
            }
            ReplicationMessage::Despawned { entity } => {
                self.world.despawn(entity);
                self.authority.revoke(entity);
                self.forget_entity(entity);
                debug!("Replicated despawn of {}", entity);
                false
            }
            ReplicationMessage::Snapshot(snapshot) => {
                // Despawned already, or a spawn this client never saw
                let Some(entity) = self.world.get_mut(snapshot.entity()) else {
                    debug!("Snapshot for unknown entity {} ignored", snapshot.entity());
                    return false;
                };
                if !self.store.apply_replicated(snapshot) {
                    Metrics::add(&self.metrics.snapshots_stale, 1);
                    return false;
                }
                entity.pose = snapshot.pose();
                Metrics::add(&self.metrics.snapshots_applied, 1);
                true
            }
        }
    }

    fn evaluate_goals(&mut self) -> usize {
        let Some(ball) = self.world.ball() else {
            return 0;
        };
        let (id, position, radius) = (ball.id, ball.pose.position, ball.radius());

        let view = self.authority.view_for(self.local.id);
        let raised = self
            .relay
            .evaluate(&view, id, position, radius, &self.triggers, self.tick);
        Metrics::add(&self.metrics.goals_raised, raised as u64);
        raised
    }

    /// Poses to draw this frame, ordered by entity id
    pub fn render(&mut self, elapsed: f32) -> Vec<RenderedPose> {
        let view = self.authority.view_for(self.local.id);
        let mut collapses = 0;
        let mut rendered = Vec::with_capacity(self.world.len());

        for entity in self.world.iter() {
            let mut smoothed = None;
            if let Some(interpolator) = self.interpolators.get_mut(&entity.id) {
                let before = interpolator.collapse_count();
                smoothed = interpolator.render(&view, &self.store, elapsed);
                collapses += interpolator.collapse_count() - before;
            }

            let (pose, smoothed) = match smoothed {
                Some(pose) => (pose, true),
                None => (self.store.pose(entity.id).unwrap_or(entity.pose), false),
            };
            rendered.push(RenderedPose {
                entity: entity.id,
                kind: entity.kind,
                pose,
                smoothed,
            });
        }

        Metrics::add(&self.metrics.interpolation_collapses, collapses);
        rendered.sort_by_key(|r| r.entity);
        rendered
    }

    fn track_if_engaged(&mut self, entity: EntityId, pose: Pose) {
        let view = self.authority.view_for(self.local.id);
        if !LocalInterpolator::engages(&view, entity) {
            return;
        }
        let detector = ChangeDetector::with_epsilon(pose, self.config.rotation_epsilon);
        self.interpolators.insert(
            entity,
            LocalInterpolator::with_detector(entity, detector, self.config.fixed_tick_duration()),
        );
        info!("Smoothing own body {} on {}", entity, self.local.id);
    }

    fn forget_entity(&mut self, entity: EntityId) {
        self.store.remove(entity);
        self.interpolators.remove(&entity);
        self.relay.forget(entity);
    }
}
