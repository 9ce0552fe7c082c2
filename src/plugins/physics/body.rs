use bevy::prelude::*;

use super::obstacle::Aabb;
use crate::plugins::portal::geometry::Pose;

/// Kinematic state shared by everything that can move through a portal: the player and the
/// physics cubes.
#[derive(Debug, Clone, Component)]
pub struct MovingBody {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
    /// Half size of the axis aligned box approximating the body.
    pub half_extents: Vec3,
    /// Seconds left before this body may go through a portal again.
    pub portal_cooldown: f32,
    pub grounded: bool,
}

impl MovingBody {
    pub fn new(position: Vec3, half_extents: Vec3) -> Self {
        MovingBody {
            position,
            orientation: Quat::IDENTITY,
            velocity: Vec3::ZERO,
            half_extents,
            portal_cooldown: 0.,
            grounded: false,
        }
    }

    pub fn cube(position: Vec3, half_extent: f32) -> Self {
        Self::new(position, Vec3::splat(half_extent))
    }

    pub fn tick_cooldown(&mut self, dt: f32) {
        self.portal_cooldown = (self.portal_cooldown - dt).max(0.);
    }

    pub fn can_traverse(&self) -> bool {
        self.portal_cooldown <= 0.
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: self.orientation,
            velocity: self.velocity,
        }
    }

    pub fn set_pose(&mut self, pose: Pose) {
        self.position = pose.position;
        self.orientation = pose.orientation;
        self.velocity = pose.velocity;
    }

    pub fn transform(&self) -> Transform {
        Transform::from_translation(self.position).with_rotation(self.orientation)
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_center(self.position, self.half_extents)
    }
}

pub fn support(half_extents: Vec3, direction: Vec3) -> f32 {
    (half_extents * direction).abs().dot(Vec3::ONE)
}
