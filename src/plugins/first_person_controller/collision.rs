use std::time::Duration;

use bevy::prelude::*;
use euclid::Angle;

use super::{
    recovery::{recover_roll, upright_orientation, AnimateRoll},
    PlayerParams,
};
use crate::plugins::{
    physics::{
        body::MovingBody,
        obstacle::{resolve_obstacles, Stop},
        PhysicsWorld,
    },
    portal::traversal::{BodyKind, Traversal},
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerResolution {
    pub traversal: Option<Traversal>,
    pub grounded: bool,
}

/// Resolve the candidate position the controller moved `body` to, coming from `prev`.
pub fn resolve_player(
    body: &mut MovingBody,
    recovery: &mut Option<AnimateRoll>,
    prev: Vec3,
    dt: f32,
    world: &PhysicsWorld,
    params: &PlayerParams,
) -> PlayerResolution {
    body.tick_cooldown(dt);

    let half_extents = body.half_extents;
    let on_floor = world
        .chamber
        .clamp(&mut body.position, &mut body.velocity, half_extents);
    // Still standing unless the last frame launched us upward.
    body.grounded = on_floor || (body.grounded && body.velocity.y <= 0.);

    let traversal = world.detector().traverse(body, prev, BodyKind::Player);
    if let Some(traversal) = traversal {
        if traversal.needs_recovery {
            debug!("Player came out upside down, recovering orientation");
            // A running recovery is simply replaced.
            *recovery = Some(AnimateRoll::new(
                body.orientation,
                upright_orientation(body.orientation),
                Duration::from_secs_f32(params.recovery_duration),
            ));
        }
    }

    let resting = resolve_obstacles(
        &mut body.position,
        &mut body.velocity,
        half_extents,
        world.obstacles,
        &Stop,
    );
    body.grounded = resting || (traversal.is_none() && on_floor);

    match recovery {
        Some(animation) => {
            body.orientation = animation.advance(Duration::from_secs_f32(dt));
            if animation.is_finished() {
                *recovery = None;
            }
        }
        None => {
            body.orientation = recover_roll(
                body.orientation,
                dt,
                Angle::degrees(params.roll_recovery_rate),
                params.roll_damping,
            );
        }
    }

    PlayerResolution {
        traversal,
        grounded: body.grounded,
    }
}
