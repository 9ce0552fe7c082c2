use bevy::prelude::*;

/// Axis aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb {
            min: min.min(max),
            max: min.max(max),
        }
    }

    pub fn from_center(center: Vec3, half_extents: Vec3) -> Self {
        Self::new(center - half_extents, center + half_extents)
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Minkowski sum with a box of the given half extents.
    pub fn expanded(&self, half_extents: Vec3) -> Self {
        Aabb {
            min: self.min - half_extents,
            max: self.max + half_extents,
        }
    }

    /// Strict containment, points on the boundary are outside.
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpgt(self.min).all() && point.cmplt(self.max).all()
    }
}

/// Static piece of level geometry.
#[derive(Debug, Clone, Copy, Component)]
pub struct Obstacle {
    pub bounds: Aabb,
    /// Whether portals may be placed on its faces.
    pub portalable: bool,
    /// Whether it blocks bodies.
    pub solid: bool,
}

/// Interior of the room. Bodies never leave it.
#[derive(Debug, Clone, Copy, Resource)]
pub struct Chamber {
    pub bounds: Aabb,
}

/// Result of pushing a box out of an obstacle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    /// Axis aligned direction the body was pushed along.
    pub normal: Vec3,
    pub depth: f32,
}

impl Contact {
    pub fn is_upward(&self) -> bool {
        self.normal.y > 0.5
    }
}

/// Push a box centered on `position` out of `bounds`, along the axis of least penetration.
pub fn push_out(position: Vec3, half_extents: Vec3, bounds: &Aabb) -> Option<Contact> {
    let expanded = bounds.expanded(half_extents);
    if !expanded.contains(position) {
        return None;
    }

    let below = position - expanded.min;
    let above = expanded.max - position;
    let mut best = Contact {
        normal: Vec3::ZERO,
        depth: f32::MAX,
    };
    for (axis, unit) in [Vec3::X, Vec3::Y, Vec3::Z].into_iter().enumerate() {
        if below[axis] < best.depth {
            best = Contact {
                normal: -unit,
                depth: below[axis],
            };
        }
        if above[axis] < best.depth {
            best = Contact {
                normal: unit,
                depth: above[axis],
            };
        }
    }
    Some(best)
}

/// How a body's velocity reacts when it gets pushed out of something.
pub trait ContactPolicy {
    fn respond(&self, velocity: &mut Vec3, normal: Vec3);
}

/// Reflect the into-surface velocity, scaled by the restitution coefficient of the contact
/// axis. Used by cubes.
#[derive(Debug, Clone, Copy)]
pub struct Bounce {
    pub restitution: Vec3,
    /// Rebound speeds below this are dropped.
    pub settle_speed: f32,
}

impl ContactPolicy for Bounce {
    fn respond(&self, velocity: &mut Vec3, normal: Vec3) {
        let into = velocity.dot(normal);
        if into < 0. {
            let restitution = (normal.abs() * self.restitution).max_element();
            let rebound = -into * restitution;
            let rebound = if rebound < self.settle_speed {
                0.
            } else {
                rebound
            };
            *velocity += normal * (rebound - into);
        }
    }
}

/// Cancel the into-surface velocity and keep the rest. Landing on a floor only removes the
/// downward part, jumps survive.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stop;

impl ContactPolicy for Stop {
    fn respond(&self, velocity: &mut Vec3, normal: Vec3) {
        let into = velocity.dot(normal);
        if into < 0. {
            *velocity -= normal * into;
        }
    }
}

/// Resolve a body against every solid obstacle. Returns whether the body ended up resting on
/// top of one of them.
pub fn resolve_obstacles<P: ContactPolicy>(
    position: &mut Vec3,
    velocity: &mut Vec3,
    half_extents: Vec3,
    obstacles: &[Obstacle],
    policy: &P,
) -> bool {
    let mut resting = false;
    for obstacle in obstacles.iter().filter(|o| o.solid) {
        if let Some(contact) = push_out(*position, half_extents, &obstacle.bounds) {
            *position += contact.normal * contact.depth;
            policy.respond(velocity, contact.normal);
            resting |= contact.is_upward();
        }
    }
    resting
}

const FLOOR_TOLERANCE: f32 = 1e-3;

impl Chamber {
    /// Keep a cube inside the room, bouncing off its faces. Returns whether the cube is on the
    /// floor.
    pub fn bounce(
        &self,
        position: &mut Vec3,
        velocity: &mut Vec3,
        half_extents: Vec3,
        policy: &Bounce,
    ) -> bool {
        let min = self.bounds.min + half_extents;
        let max = self.bounds.max - half_extents;
        for axis in 0..3 {
            let mut unit = Vec3::ZERO;
            unit[axis] = 1.;
            if position[axis] < min[axis] {
                position[axis] = min[axis];
                policy.respond(velocity, unit);
            } else if position[axis] > max[axis] {
                position[axis] = max[axis];
                policy.respond(velocity, -unit);
            }
        }
        position.y <= min.y + FLOOR_TOLERANCE
    }

    /// Clamp the player inside the room: horizontally with its radius as margin, vertically
    /// against the floor only. Returns whether the player stands on the floor.
    pub fn clamp(&self, position: &mut Vec3, velocity: &mut Vec3, half_extents: Vec3) -> bool {
        let min = self.bounds.min + half_extents;
        let max = self.bounds.max - half_extents;
        position.x = position.x.clamp(min.x, max.x.max(min.x));
        position.z = position.z.clamp(min.z, max.z.max(min.z));
        if position.y <= min.y {
            position.y = min.y;
            velocity.y = velocity.y.max(0.);
            true
        } else {
            position.y <= min.y + FLOOR_TOLERANCE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slab() -> Aabb {
        Aabb::new(Vec3::new(-2., -0.5, -2.), Vec3::new(2., 0., 2.))
    }

    #[test]
    fn push_out_picks_least_penetration() {
        let contact = push_out(Vec3::new(0.5, 0.2, 0.), Vec3::splat(0.25), &slab()).unwrap();
        assert_eq!(contact.normal, Vec3::Y);
        assert!((contact.depth - 0.05).abs() < 1e-5);
        assert!(contact.is_upward());

        let contact = push_out(Vec3::new(2.1, -0.25, 0.), Vec3::splat(0.25), &slab()).unwrap();
        assert_eq!(contact.normal, Vec3::X);
        assert!((contact.depth - 0.15).abs() < 1e-5);
    }

    #[test]
    fn touching_is_not_penetrating() {
        assert!(push_out(Vec3::new(0., 0.25, 0.), Vec3::splat(0.25), &slab()).is_none());
    }

    #[test]
    fn bounce_reflects_and_settles() {
        let bounce = Bounce {
            restitution: Vec3::new(0.9, 0.5, 0.9),
            settle_speed: 0.3,
        };
        let mut velocity = Vec3::new(1., -4., 0.);
        bounce.respond(&mut velocity, Vec3::Y);
        assert!(velocity.abs_diff_eq(Vec3::new(1., 2., 0.), 1e-5));

        let mut velocity = Vec3::new(1., -0.4, 0.);
        bounce.respond(&mut velocity, Vec3::Y);
        assert!(velocity.abs_diff_eq(Vec3::new(1., 0., 0.), 1e-5));
    }

    #[test]
    fn stop_keeps_upward_velocity() {
        let mut velocity = Vec3::new(1., 3., 0.);
        Stop.respond(&mut velocity, Vec3::Y);
        assert_eq!(velocity, Vec3::new(1., 3., 0.));

        let mut velocity = Vec3::new(1., -3., 0.);
        Stop.respond(&mut velocity, Vec3::Y);
        assert_eq!(velocity, Vec3::new(1., 0., 0.));
    }

    #[test]
    fn resolve_ignores_non_solid() {
        let obstacles = [Obstacle {
            bounds: slab(),
            portalable: true,
            solid: false,
        }];
        let mut position = Vec3::new(0., -0.1, 0.);
        let mut velocity = Vec3::NEG_Y;
        let resting = resolve_obstacles(
            &mut position,
            &mut velocity,
            Vec3::splat(0.25),
            &obstacles,
            &Stop,
        );
        assert!(!resting);
        assert_eq!(position, Vec3::new(0., -0.1, 0.));
    }

    #[test]
    fn chamber_clamp_uses_radius_margin() {
        let chamber = Chamber {
            bounds: Aabb::new(Vec3::new(-6., 0., -6.), Vec3::new(6., 4., 6.)),
        };
        let half = Vec3::new(0.35, 0.8, 0.35);
        let mut position = Vec3::new(7., 0.5, -5.9);
        let mut velocity = Vec3::new(1., -2., 0.);
        assert!(chamber.clamp(&mut position, &mut velocity, half));
        assert!(position.abs_diff_eq(Vec3::new(5.65, 0.8, -5.65), 1e-5));
        assert_eq!(velocity, Vec3::new(1., 0., 0.));
    }

    #[test]
    fn chamber_bounce_is_per_axis() {
        let chamber = Chamber {
            bounds: Aabb::new(Vec3::new(-6., 0., -6.), Vec3::new(6., 4., 6.)),
        };
        let mut position = Vec3::new(5.9, 0.1, 0.);
        let mut velocity = Vec3::new(2., -2., 0.);
        let on_floor = chamber.bounce(
            &mut position,
            &mut velocity,
            Vec3::splat(0.25),
            &Bounce {
                restitution: Vec3::new(0.5, 0.25, 0.5),
                settle_speed: 0.3,
            },
        );
        assert!(on_floor);
        assert!(position.abs_diff_eq(Vec3::new(5.75, 0.25, 0.), 1e-5));
        assert!(velocity.abs_diff_eq(Vec3::new(-1., 0.5, 0.), 1e-5));
    }
}
