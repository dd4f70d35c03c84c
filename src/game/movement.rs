//! Host movement step
//!
//! Bodies move at constant speed along their input direction. The ball has
//! no input: bodies push it and exponential drag slows it down.

use crate::game::constants::ball::MAX_VELOCITY;
use crate::game::state::{EntityId, PrefabKind, World};
use crate::net::transport::InputFrame;
use crate::util::quat::Quat;
use crate::util::vec3::Vec3;

/// Set a body's velocity from its input frame
///
/// Returns false if `entity` is not a body in `world`.
pub fn apply_input(world: &mut World, entity: EntityId, frame: &InputFrame, speed: f32) -> bool {
    let body = match world.get_mut(entity) {
        Some(e) if e.kind == PrefabKind::PlayerBody => e,
        _ => return false,
    };

    let direction = frame.direction.flatten();
    if direction.is_zero(1e-6) {
        body.velocity = Vec3::ZERO;
        return true;
    }

    let direction = direction.normalize();
    body.velocity = direction * speed;
    body.pose.rotation = Quat::from_yaw_towards(direction);
    true
}

/// Advance every entity by `dt` seconds
/// CRITICAL: ball drag is exponential (velocity *= 1 - drag), NOT linear
pub fn step(world: &mut World, dt: f32, ball_drag: f32) {
    for entity in world.iter_mut() {
        if entity.kind == PrefabKind::PlayerBody {
            entity.pose.position += entity.velocity * dt;
        }
    }

    let Some(ball_id) = world.ball().map(|b| b.id) else {
        return;
    };

    let bodies: Vec<(Vec3, Vec3, f32)> = world
        .iter()
        .filter(|e| e.kind == PrefabKind::PlayerBody)
        .map(|e| (e.pose.position, e.velocity, e.radius()))
        .collect();

    let Some(ball) = world.get_mut(ball_id) else {
        return;
    };

    let drag_factor = 1.0 - ball_drag;
    ball.velocity *= drag_factor;
    ball.velocity = ball.velocity.clamp_length(MAX_VELOCITY);
    ball.pose.position += ball.velocity * dt;

    let ball_radius = ball.radius();
    for (position, velocity, radius) in bodies {
        let offset = (ball.pose.position - position).flatten();
        let min_distance = radius + ball_radius;
        if offset.length_sq() >= min_distance * min_distance {
            continue;
        }

        let normal = if offset.is_zero(1e-6) {
            Vec3::FORWARD
        } else {
            offset.normalize()
        };

        // Separate, then carry the ball at least as fast as the body approaches
        let target = position + normal * min_distance;
        ball.pose.position.x = target.x;
        ball.pose.position.z = target.z;

        let approach = velocity.dot(normal) - ball.velocity.dot(normal);
        if approach > 0.0 {
            ball.velocity += normal * approach;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::ball::DRAG;
    use crate::game::constants::body::SPEED;
    use crate::game::constants::physics::DT;
    use crate::game::state::Pose;

    fn approx_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_apply_input_sets_velocity_and_facing() {
        let mut world = World::new();
        let body = world.spawn(PrefabKind::PlayerBody, Pose::default(), None);

        assert!(apply_input(&mut world, body, &InputFrame::new(Vec3::new(1.0, 0.0, 1.0)), SPEED));

        let entity = world.get(body).unwrap();
        assert!(approx_eq(entity.velocity.length(), SPEED));
        let facing = entity.pose.rotation.rotate(Vec3::FORWARD);
        assert!(facing.approx_eq(Vec3::new(1.0, 0.0, 1.0).normalize(), 1e-4));
    }

    #[test]
    fn test_idle_input_stops_body_and_keeps_rotation() {
        let mut world = World::new();
        let body = world.spawn(PrefabKind::PlayerBody, Pose::default(), None);
        apply_input(&mut world, body, &InputFrame::new(Vec3::RIGHT), SPEED);
        let facing = world.get(body).unwrap().pose.rotation;

        apply_input(&mut world, body, &InputFrame::default(), SPEED);

        let entity = world.get(body).unwrap();
        assert_eq!(entity.velocity, Vec3::ZERO);
        assert_eq!(entity.pose.rotation, facing);
    }

    #[test]
    fn test_apply_input_ignores_ball() {
        let mut world = World::new();
        let ball = world.spawn(PrefabKind::Ball, Pose::default(), None);
        assert!(!apply_input(&mut world, ball, &InputFrame::new(Vec3::RIGHT), SPEED));
        assert!(!apply_input(&mut world, 99, &InputFrame::new(Vec3::RIGHT), SPEED));
    }

    #[test]
    fn test_step_integrates_bodies() {
        let mut world = World::new();
        let body = world.spawn(PrefabKind::PlayerBody, Pose::default(), None);
        apply_input(&mut world, body, &InputFrame::new(Vec3::FORWARD), SPEED);

        step(&mut world, DT, DRAG);

        assert!(approx_eq(world.get(body).unwrap().pose.position.z, SPEED * DT));
    }

    #[test]
    fn test_ball_exponential_drag() {
        let mut world = World::new();
        let ball = world.spawn(PrefabKind::Ball, Pose::default(), None);
        world.get_mut(ball).unwrap().velocity = Vec3::new(10.0, 0.0, 0.0);

        step(&mut world, DT, DRAG);

        let speed = world.get(ball).unwrap().velocity.length();
        assert!(approx_eq(speed, 10.0 * (1.0 - DRAG)));
    }

    #[test]
    fn test_body_pushes_ball() {
        let mut world = World::new();
        let body = world.spawn(PrefabKind::PlayerBody, Pose::default(), None);
        let ball = world.spawn(PrefabKind::Ball, Pose::at(Vec3::new(0.0, 0.0, 0.5)), None);
        apply_input(&mut world, body, &InputFrame::new(Vec3::FORWARD), SPEED);

        step(&mut world, DT, DRAG);

        let body_pos = world.get(body).unwrap().pose.position;
        let ball_entity = world.get(ball).unwrap();
        let separation = ball_entity.pose.position.distance_to(body_pos);
        assert!(separation >= PrefabKind::PlayerBody.radius() + PrefabKind::Ball.radius() - 1e-4);
        assert!(ball_entity.velocity.z >= SPEED - 1e-4);
    }

    #[test]
    fn test_step_without_ball() {
        let mut world = World::new();
        world.spawn(PrefabKind::PlayerBody, Pose::default(), None);
        step(&mut world, DT, DRAG);
        assert_eq!(world.len(), 1);
    }
}
