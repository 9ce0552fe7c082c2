//! Deciding when a moving body goes through a portal.

use bevy::prelude::*;
use serde::Deserialize;

use super::{
    geometry::{ensure_clearance, transform_through, SurfaceKind},
    surface::{PortalConfig, PortalId, PortalPair, PortalSurface},
};
use crate::plugins::physics::body::{support, MovingBody};

/// Thresholds of the traversal trigger. The per orientation values are tuned by feel.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Multiplier applied to the aperture before rejecting a crossing.
    pub aperture_forgiveness: f32,
    /// Seconds during which a body that just went through cannot go through again.
    pub cooldown: f32,
    /// Slack added to the body extent in the swept test.
    pub contact_epsilon: f32,
    /// Gap left between a body and the exit plane after going through.
    pub exit_clearance: f32,
    /// Heading dot normal below which a wall portal triggers.
    pub wall_trigger_dot: f32,
    /// Heading dot normal below which a floor portal triggers.
    pub floor_trigger_dot: f32,
    /// Downward speed above which free bodies drop through floor portals.
    pub floor_fall_speed: f32,
    /// Upward speed needed to go through a ceiling portal.
    pub ceiling_min_up_speed: f32,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        TraversalConfig {
            aperture_forgiveness: 1.15,
            cooldown: 0.2,
            contact_epsilon: 0.02,
            exit_clearance: 0.02,
            wall_trigger_dot: -0.1,
            floor_trigger_dot: -0.02,
            floor_fall_speed: 1.,
            ceiling_min_up_speed: 1.5,
        }
    }
}

/// Body specific part of the trigger policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    /// Walks, can stand on a floor portal.
    Player,
    /// Cubes and anything else driven by the integrator.
    Free,
}

/// Where and when during the step a body meets a portal plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    /// Point on the portal plane.
    pub point: Vec3,
    /// Fraction of the step at which the crossing happens.
    pub t: f32,
}

/// A successful traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Traversal {
    pub entry: PortalId,
    pub exit: PortalId,
    /// The body came out upside down from a floor or ceiling portal.
    pub needs_recovery: bool,
}

const MIN_SPEED: f32 = 1e-3;

pub struct TraversalDetector<'a> {
    pub portals: &'a PortalPair,
    pub portal_config: &'a PortalConfig,
    pub config: &'a TraversalConfig,
}

impl<'a> TraversalDetector<'a> {
    /// Find where a body moving from `prev` to its current position meets `portal`, if it does
    /// inside the aperture.
    pub fn crossing(&self, portal: &PortalSurface, body: &MovingBody, prev: Vec3) -> Option<Crossing> {
        let next = body.position;
        let d_prev = portal.signed_distance(prev);
        let d_next = portal.signed_distance(next);

        let t = if (d_prev > 0.) != (d_next > 0.) {
            d_prev / (d_prev - d_next)
        } else {
            // Swept test: the box reaches the plane at the end of the step.
            let reach = support(body.half_extents, portal.normal()) + self.config.contact_epsilon;
            if d_next.abs() > reach {
                return None;
            }
            let offset = reach.copysign(d_next);
            if (d_prev - offset).abs() <= f32::EPSILON || (d_prev - offset).signum() == (d_next - offset).signum() {
                // Already in contact before this step.
                1.
            } else {
                (d_prev - offset) / (d_prev - d_next)
            }
        };
        let t = t.clamp(0., 1.);

        let point = prev.lerp(next, t);
        let point = point - portal.normal() * portal.signed_distance(point);
        portal
            .within_aperture(point, self.config.aperture_forgiveness)
            .then_some(Crossing { point, t })
    }

    /// Orientation specific trigger policy.
    pub fn should_trigger(&self, portal: &PortalSurface, body: &MovingBody, prev: Vec3, kind: BodyKind) -> bool {
        let normal = portal.normal();
        let velocity = body.velocity;
        let heading = if velocity.length() > MIN_SPEED {
            velocity.normalize()
        } else {
            let displacement = body.position - prev;
            if displacement.length() > MIN_SPEED * 1e-2 {
                displacement.normalize()
            } else {
                Vec3::ZERO
            }
        };
        let approach = heading.dot(normal);

        match portal.kind(self.portal_config.vertical_threshold) {
            SurfaceKind::Wall => approach < self.config.wall_trigger_dot,
            SurfaceKind::Floor => {
                approach < self.config.floor_trigger_dot
                    || body.grounded
                    || (kind == BodyKind::Free && velocity.y < -self.config.floor_fall_speed)
            }
            SurfaceKind::Ceiling => {
                velocity.y > self.config.ceiling_min_up_speed && velocity.dot(normal) < 0.
            }
        }
    }

    /// First portal, in fixed order, the body goes through during this step.
    pub fn detect(&self, body: &MovingBody, prev: Vec3, kind: BodyKind) -> Option<(PortalId, Crossing)> {
        if !body.can_traverse() {
            return None;
        }
        PortalId::ALL.into_iter().find_map(|id| {
            let (portal, _) = self.portals.linked(id)?;
            let crossing = self.crossing(portal, body, prev)?;
            self.should_trigger(portal, body, prev, kind)
                .then_some((id, crossing))
        })
    }

    /// Detect a crossing and move the body to the other side.
    pub fn traverse(&self, body: &mut MovingBody, prev: Vec3, kind: BodyKind) -> Option<Traversal> {
        let (entry_id, _crossing) = self.detect(body, prev, kind)?;
        let (entry, exit) = self.portals.linked(entry_id)?;
        let threshold = self.portal_config.vertical_threshold;

        let mut pose = transform_through(entry, exit, &body.pose(), threshold);
        let clearance = support(body.half_extents, exit.normal()) + self.config.exit_clearance;
        pose.position = ensure_clearance(pose.position, exit, clearance);
        body.set_pose(pose);
        body.portal_cooldown = self.config.cooldown;
        body.grounded = false;

        let up = pose.orientation * Vec3::Y;
        let needs_recovery = kind == BodyKind::Player
            && (entry.kind(threshold).is_horizontal() || exit.kind(threshold).is_horizontal())
            && up.y < -1e-4;

        info!(
            "Body went through portal {:?} to {:?}, now at {}",
            entry.id, exit.id, pose.position
        );
        Some(Traversal {
            entry: entry.id,
            exit: exit.id,
            needs_recovery,
        })
    }
}
