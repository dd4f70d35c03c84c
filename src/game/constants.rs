/// Simulation timing
pub mod physics {
    /// Default fixed simulation tick rate in Hz
    pub const TICK_RATE: u32 = 30;
    /// Delta time per tick in seconds at the default rate
    pub const DT: f32 = 1.0 / TICK_RATE as f32;
    /// Default render rate in Hz (demo loop only)
    pub const RENDER_RATE: u32 = 60;
}

/// Player body constants
pub mod body {
    /// Collision radius of a player body
    pub const RADIUS: f32 = 0.5;
    /// Default movement speed (units/second)
    pub const SPEED: f32 = 6.0;
}

/// Ball constants
pub mod ball {
    use crate::util::vec3::Vec3;

    /// Collision radius of the ball
    pub const RADIUS: f32 = 0.25;
    /// Where the ball is created
    pub const SPAWN_POSITION: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 6.0,
    };
    /// Default exponential drag per tick
    /// Applied as: velocity *= (1.0 - DRAG)
    pub const DRAG: f32 = 0.02;
    /// Maximum ball speed
    pub const MAX_VELOCITY: f32 = 20.0;
}

/// Spawn placement constants
pub mod spawn {
    /// Distance between neighbouring spawn slots along +X
    pub const SPACING: f32 = 3.0;
    /// Default maximum participants (one spawn slot each)
    pub const MAX_PARTICIPANTS: usize = 8;
    /// Hard upper bound accepted by configuration
    pub const MAX_PARTICIPANTS_LIMIT: usize = 64;
}

/// Change detection thresholds
pub mod detection {
    /// Rotations are equal when `1 - |dot(a, b)|` is at most this
    /// (about 0.16 degrees of rotation)
    pub const ROTATION_EPSILON: f32 = 1e-6;
}

/// Networking constants
pub mod net {
    /// Capacity of each host -> client replication channel (messages)
    pub const REPLICATION_CHANNEL_SIZE: usize = 4096;
    /// Capacity of the client -> host input channel
    pub const INPUT_BUFFER_SIZE: usize = 1024;
}

/// Field geometry
pub mod field {
    /// Distance from the centre spot to each goal line along Z
    pub const HALF_LENGTH: f32 = 12.0;
    /// Goal mouth width along X
    pub const GOAL_WIDTH: f32 = 4.0;
    /// Goal depth behind the line
    pub const GOAL_DEPTH: f32 = 2.0;
    /// Goal height along Y
    pub const GOAL_HEIGHT: f32 = 2.0;
}
