use crate::game::constants::{ball, body, detection, physics, spawn};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Fixed simulation tick rate in Hz
    pub tick_rate: u32,
    /// Render rate in Hz (demo loop only)
    pub render_rate: u32,
    /// Maximum participants (one spawn slot each)
    pub max_participants: usize,
    /// Distance between spawn slots
    pub spawn_spacing: f32,
    /// Body movement speed (units/second)
    pub player_speed: f32,
    /// Exponential ball drag per tick
    pub ball_drag: f32,
    /// Rotation equality threshold for change detection
    pub rotation_epsilon: f32,
    /// Port for the metrics endpoint
    pub metrics_port: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate: physics::TICK_RATE,
            render_rate: physics::RENDER_RATE,
            max_participants: spawn::MAX_PARTICIPANTS,
            spawn_spacing: spawn::SPACING,
            player_speed: body::SPEED,
            ball_drag: ball::DRAG,
            rotation_epsilon: detection::ROTATION_EPSILON,
            metrics_port: 9090,
        }
    }
}

/// Parse `name` from the environment, keeping `current` if unset or rejected
fn env_or<T, F>(name: &str, current: T, accept: F, hint: &str) -> T
where
    T: std::str::FromStr + Copy,
    F: Fn(T) -> bool,
{
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(parsed) if accept(parsed) => parsed,
            Ok(_) => {
                tracing::warn!("{} must be {}, using default", name, hint);
                current
            }
            Err(_) => {
                tracing::warn!("Invalid {} '{}', using default", name, raw);
                current
            }
        },
        Err(_) => current,
    }
}

impl SessionConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let d = Self::default();

        Self {
            tick_rate: env_or("TICK_RATE", d.tick_rate, |v| (1..=240).contains(&v), "1-240"),
            render_rate: env_or("RENDER_RATE", d.render_rate, |v| (1..=1000).contains(&v), "1-1000"),
            max_participants: env_or(
                "MAX_PARTICIPANTS",
                d.max_participants,
                |v| (1..=spawn::MAX_PARTICIPANTS_LIMIT).contains(&v),
                "1-64",
            ),
            spawn_spacing: env_or("SPAWN_SPACING", d.spawn_spacing, |v: f32| v.is_finite() && v > 0.0, "> 0"),
            player_speed: env_or("PLAYER_SPEED", d.player_speed, |v: f32| v.is_finite() && v >= 0.0, ">= 0"),
            ball_drag: env_or("BALL_DRAG", d.ball_drag, |v: f32| (0.0..1.0).contains(&v), "in [0, 1)"),
            rotation_epsilon: env_or(
                "ROTATION_EPSILON",
                d.rotation_epsilon,
                |v: f32| (0.0..1.0).contains(&v),
                "in [0, 1)",
            ),
            metrics_port: env_or("METRICS_PORT", d.metrics_port, |v| v > 0, "> 0"),
        }
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        if self.max_participants == 0 || self.max_participants > spawn::MAX_PARTICIPANTS_LIMIT {
            return Err(ConfigError::ParticipantLimit(self.max_participants));
        }
        if self.spawn_spacing.is_nan() || self.spawn_spacing <= 0.0 {
            return Err(ConfigError::SpawnSpacing(self.spawn_spacing));
        }
        if !(0.0..1.0).contains(&self.ball_drag) {
            return Err(ConfigError::BallDrag(self.ball_drag));
        }
        Ok(())
    }

    /// Seconds per fixed simulation tick
    pub fn fixed_tick_duration(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Seconds per render frame
    pub fn render_frame_duration(&self) -> f32 {
        1.0 / self.render_rate.max(1) as f32
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("tick rate cannot be 0")]
    ZeroTickRate,
    #[error("max participants must be 1-64, got {0}")]
    ParticipantLimit(usize),
    #[error("spawn spacing must be > 0, got {0}")]
    SpawnSpacing(f32),
    #[error("ball drag must be in [0, 1), got {0}")]
    BallDrag(f32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_participants, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_fixed_tick_duration() {
        let config = SessionConfig {
            tick_rate: 10,
            ..Default::default()
        };
        assert!((config.fixed_tick_duration() - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SessionConfig {
            max_participants: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ParticipantLimit(0)));

        let config = SessionConfig {
            spawn_spacing: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            tick_rate: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroTickRate));
    }

    #[test]
    fn test_load_or_default() {
        let config = SessionConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }
}
