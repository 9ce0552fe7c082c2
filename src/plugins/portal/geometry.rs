//! Transforms between two linked portals.
//!
//! Portals use the same local frame as their mesh: +Z is the outward normal, +Y the portal's up
//! and +X its right.

use std::f32::consts::PI;

use bevy::prelude::*;

use super::surface::PortalSurface;

const DEGENERATE_EPSILON: f32 = 1e-4;

/// Position, orientation and velocity of something going through a portal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quat,
    pub velocity: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceKind {
    Wall,
    Floor,
    Ceiling,
}

impl SurfaceKind {
    /// Classify a surface from its outward normal. `threshold` is the dot product with world up
    /// above which a surface counts as horizontal.
    pub fn from_normal(normal: Vec3, threshold: f32) -> Self {
        let up = normal.dot(Vec3::Y);
        if up > threshold {
            SurfaceKind::Floor
        } else if up < -threshold {
            SurfaceKind::Ceiling
        } else {
            SurfaceKind::Wall
        }
    }

    pub fn is_horizontal(self) -> bool {
        self != SurfaceKind::Wall
    }
}

/// Normalize, or return `fallback` when the vector is too short to have a direction.
pub fn normalize_or(v: Vec3, fallback: Vec3) -> Vec3 {
    let len = v.length();
    if len.is_finite() && len > DEGENERATE_EPSILON {
        v / len
    } else {
        fallback
    }
}

/// Orientation whose +Z is `normal` and whose +Y is as close as possible to `up_hint`.
pub fn orientation_from_normal(normal: Vec3, up_hint: Vec3) -> Quat {
    let z = normalize_or(normal, Vec3::Z);
    let mut y = up_hint - z * up_hint.dot(z);
    if y.length_squared() < DEGENERATE_EPSILON {
        // Hint parallel to the normal, pick any world axis that is not.
        let fallback = if z.dot(Vec3::Z).abs() < 0.9 {
            Vec3::Z
        } else {
            Vec3::X
        };
        y = fallback - z * fallback.dot(z);
    }
    let y = y.normalize();
    let x = y.cross(z);
    Quat::from_mat3(&Mat3::from_cols(x, y, z)).normalize()
}

/// The half turn applied between the entry and the exit portal.
///
/// Wall to wall pairs turn about the portal's up axis so world up is preserved. As soon as one
/// side is a floor or a ceiling the turn happens about the portal's right axis instead, which
/// keeps left and right where the viewer expects them. The same rotation is used both ways so
/// going A to B then B to A is the identity.
pub fn flip_rotation(entry: &PortalSurface, exit: &PortalSurface, threshold: f32) -> Quat {
    if entry.kind(threshold).is_horizontal() || exit.kind(threshold).is_horizontal() {
        Quat::from_rotation_x(PI)
    } else {
        Quat::from_rotation_y(PI)
    }
}

/// Rigid transform mapping world space around `entry` to world space around `exit`.
pub fn portal_to_portal(entry: &PortalSurface, exit: &PortalSurface, threshold: f32) -> Transform {
    let rot = Transform::from_rotation(flip_rotation(entry, exit, threshold));
    exit.transform() * rot * rigid_inverse(&entry.transform())
}

/// Inverse of a transform without scale.
pub fn rigid_inverse(transform: &Transform) -> Transform {
    let rotation = transform.rotation.inverse();
    Transform {
        translation: rotation * -transform.translation,
        rotation,
        scale: Vec3::ONE,
    }
}

pub fn transform_through(
    entry: &PortalSurface,
    exit: &PortalSurface,
    pose: &Pose,
    threshold: f32,
) -> Pose {
    let x = portal_to_portal(entry, exit, threshold);
    Pose {
        position: x * pose.position,
        orientation: (x.rotation * pose.orientation).normalize(),
        velocity: x.rotation * pose.velocity,
    }
}

/// Move `position` along the exit normal until it is at least `distance` in front of the exit
/// plane.
pub fn ensure_clearance(position: Vec3, exit: &PortalSurface, distance: f32) -> Vec3 {
    let d = exit.signed_distance(position);
    if d < distance {
        position + exit.normal() * (distance - d)
    } else {
        position
    }
}
