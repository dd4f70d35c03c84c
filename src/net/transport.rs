//! Transport capability set and the in-process loopback implementation
//!
//! The core never talks to a socket. It asks the transport whether this
//! participant runs the session, and asks it to spawn or despawn networked
//! entities. [`LoopbackTransport`] satisfies that contract inside one process
//! by writing into the host's world and broadcasting over the replication hub.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::game::state::{EntityId, ParticipantId, Pose, PrefabKind, World};
use crate::net::authority::AuthorityTable;
use crate::net::protocol::ReplicationMessage;
use crate::net::replication::ReplicationHub;
use crate::util::quat::Quat;
use crate::util::vec3::Vec3;

/// Handle to a spawned networked entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityHandle {
    pub id: EntityId,
    pub kind: PrefabKind,
}

/// Capabilities the session layer provides to the core
pub trait Transport {
    /// True on the participant that runs the session
    fn is_server(&self) -> bool;

    /// Create a networked entity; state authority goes to the server,
    /// input authority to `owner`
    fn spawn(
        &mut self,
        kind: PrefabKind,
        position: Vec3,
        rotation: Quat,
        owner: Option<ParticipantId>,
    ) -> EntityHandle;

    fn despawn(&mut self, handle: EntityHandle);
}

/// Directional button state for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MoveButtons {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
}

/// Movement intent of one participant for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct InputFrame {
    /// Unnormalized sum of pressed directions on the XZ plane
    pub direction: Vec3,
}

impl InputFrame {
    pub fn new(direction: Vec3) -> Self {
        Self { direction }
    }

    pub fn from_buttons(buttons: MoveButtons) -> Self {
        let mut direction = Vec3::ZERO;
        if buttons.forward {
            direction += Vec3::FORWARD;
        }
        if buttons.back {
            direction += Vec3::BACK;
        }
        if buttons.left {
            direction += Vec3::LEFT;
        }
        if buttons.right {
            direction += Vec3::RIGHT;
        }
        Self { direction }
    }

    pub fn is_idle(&self) -> bool {
        self.direction.is_zero(1e-6)
    }
}

/// Produces the local participant's input once per fixed tick
pub trait InputSource {
    fn collect_input(&mut self) -> InputFrame;
}

impl InputSource for MoveButtons {
    fn collect_input(&mut self) -> InputFrame {
        InputFrame::from_buttons(*self)
    }
}

impl InputSource for InputFrame {
    fn collect_input(&mut self) -> InputFrame {
        *self
    }
}

/// Host-side transport backed by the host's own world
pub struct LoopbackTransport<'a> {
    host: ParticipantId,
    world: &'a mut World,
    authority: &'a mut AuthorityTable,
    hub: &'a mut ReplicationHub,
}

impl<'a> LoopbackTransport<'a> {
    pub fn new(
        host: ParticipantId,
        world: &'a mut World,
        authority: &'a mut AuthorityTable,
        hub: &'a mut ReplicationHub,
    ) -> Self {
        Self {
            host,
            world,
            authority,
            hub,
        }
    }
}

impl Transport for LoopbackTransport<'_> {
    fn is_server(&self) -> bool {
        true
    }

    fn spawn(
        &mut self,
        kind: PrefabKind,
        position: Vec3,
        rotation: Quat,
        owner: Option<ParticipantId>,
    ) -> EntityHandle {
        let pose = Pose::new(position, rotation);
        let id = self.world.spawn(kind, pose, owner);
        self.authority.assign(id, self.host, owner);

        let sent = self.hub.broadcast(&ReplicationMessage::Spawned {
            entity: id,
            kind,
            pose,
            state_authority: self.host,
            input_authority: owner,
        });
        info!("Spawned {:?} {} at ({:.1}, {:.1}, {:.1})", kind, id, position.x, position.y, position.z);
        debug!("Spawn of {} sent to {} clients", id, sent);

        EntityHandle { id, kind }
    }

    fn despawn(&mut self, handle: EntityHandle) {
        if self.world.despawn(handle.id).is_none() {
            debug!("Despawn of unknown entity {}", handle.id);
            return;
        }
        self.authority.revoke(handle.id);
        self.hub
            .broadcast(&ReplicationMessage::Despawned { entity: handle.id });
        info!("Despawned {:?} {}", handle.kind, handle.id);
    }
}
