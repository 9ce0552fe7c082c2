//! Integration of the physics cubes.

use bevy::prelude::*;
use serde::Deserialize;

use super::{
    body::MovingBody,
    obstacle::{resolve_obstacles, Bounce},
    PhysicsWorld,
};
use crate::plugins::portal::traversal::{BodyKind, Traversal};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CubeParams {
    pub gravity: f32,
    pub half_extent: f32,
    /// Per axis restitution, lower vertically so cubes settle on floors.
    pub restitution: [f32; 3],
    /// Exponential damping rate of the horizontal velocity while resting.
    pub friction: f32,
    /// Rebound speed below which a cube stops bouncing.
    pub settle_speed: f32,
}

impl Default for CubeParams {
    fn default() -> Self {
        CubeParams {
            gravity: 9.81,
            half_extent: 0.25,
            restitution: [0.4, 0.15, 0.4],
            friction: 4.,
            settle_speed: 0.3,
        }
    }
}

impl CubeParams {
    pub fn bounce(&self) -> Bounce {
        Bounce {
            restitution: Vec3::from(self.restitution),
            settle_speed: self.settle_speed,
        }
    }
}

#[derive(Debug, Clone, Default, Component)]
pub struct PhysicsCube {
    /// Carried by the player, its pose is driven from outside.
    pub held: bool,
    /// On a floor or on top of an obstacle.
    pub resting: bool,
}

/// Advance one cube by `dt`.
pub fn step_cube(
    body: &mut MovingBody,
    cube: &mut PhysicsCube,
    params: &CubeParams,
    world: &PhysicsWorld,
    dt: f32,
) -> Option<Traversal> {
    body.tick_cooldown(dt);
    if cube.held {
        return None;
    }

    let prev = body.position;
    body.velocity.y -= params.gravity * dt;
    body.position += body.velocity * dt;

    let traversal = world.detector().traverse(body, prev, BodyKind::Free);

    let bounce = params.bounce();
    let half_extents = body.half_extents;
    let on_floor = world.chamber.bounce(&mut body.position, &mut body.velocity, half_extents, &bounce);
    let on_obstacle = resolve_obstacles(
        &mut body.position,
        &mut body.velocity,
        half_extents,
        world.obstacles,
        &bounce,
    );

    cube.resting = on_floor || on_obstacle;
    body.grounded = cube.resting;
    if cube.resting {
        let damping = (-params.friction * dt).exp();
        body.velocity.x *= damping;
        body.velocity.z *= damping;
    }
    traversal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{
        physics::obstacle::{Aabb, Chamber, Obstacle},
        portal::{
            surface::{PortalConfig, PortalHit, PortalId, PortalPair},
            traversal::TraversalConfig,
        },
    };

    struct Fixture {
        portals: PortalPair,
        obstacles: Vec<Obstacle>,
        chamber: Chamber,
        portal_config: PortalConfig,
        traversal: TraversalConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let portal_config = PortalConfig::default();
            Fixture {
                portals: PortalPair::linked_pair(&portal_config),
                obstacles: vec![Obstacle {
                    bounds: Aabb::new(Vec3::new(2., 0., -1.), Vec3::new(4., 1., 1.)),
                    portalable: true,
                    solid: true,
                }],
                chamber: Chamber {
                    bounds: Aabb::new(Vec3::new(-6., 0., -6.), Vec3::new(6., 4., 6.)),
                },
                portal_config,
                traversal: TraversalConfig::default(),
            }
        }

        fn world(&self) -> PhysicsWorld<'_> {
            PhysicsWorld {
                portals: &self.portals,
                obstacles: &self.obstacles,
                chamber: &self.chamber,
                portal_config: &self.portal_config,
                traversal: &self.traversal,
            }
        }
    }

    fn simulate(fixture: &Fixture, body: &mut MovingBody, cube: &mut PhysicsCube, seconds: f32) -> Vec<Traversal> {
        let params = CubeParams::default();
        let dt = 1. / 60.;
        let mut traversals = Vec::new();
        for _ in 0..(seconds / dt) as usize {
            traversals.extend(step_cube(body, cube, &params, &fixture.world(), dt));
        }
        traversals
    }

    #[test]
    fn dropped_cube_comes_to_rest_on_floor() {
        let fixture = Fixture::new();
        let mut body = MovingBody::cube(Vec3::new(0., 3., 0.), 0.25);
        let mut cube = PhysicsCube::default();
        simulate(&fixture, &mut body, &mut cube, 3.);
        assert!(cube.resting);
        assert!((body.position.y - 0.25).abs() < 0.01);
        assert!(body.velocity.y.abs() < 0.2);
    }

    #[test]
    fn friction_stops_sliding_cube() {
        let fixture = Fixture::new();
        let mut body = MovingBody::cube(Vec3::new(-4., 0.25, 0.), 0.25);
        body.velocity = Vec3::new(2., 0., 0.);
        let mut cube = PhysicsCube::default();
        simulate(&fixture, &mut body, &mut cube, 2.);
        assert!(body.velocity.x.abs() < 0.01);
        assert!(body.position.x > -4. && body.position.x < -3.);
    }

    #[test]
    fn cube_lands_on_obstacle() {
        let fixture = Fixture::new();
        let mut body = MovingBody::cube(Vec3::new(3., 2., 0.), 0.25);
        let mut cube = PhysicsCube::default();
        simulate(&fixture, &mut body, &mut cube, 2.);
        assert!(cube.resting);
        assert!((body.position.y - 1.25).abs() < 0.01);
    }

    #[test]
    fn cube_falls_through_floor_portal() {
        let mut fixture = Fixture::new();
        let config = fixture.portal_config.clone();
        let floor = Aabb::new(Vec3::new(-6., -0.5, -6.), Vec3::new(6., 0., 6.));
        let wall = Aabb::new(Vec3::new(-6., 0., -6.5), Vec3::new(6., 4., -6.));
        fixture
            .portals
            .place(
                PortalId::A,
                &PortalHit {
                    point: Vec3::new(-2., 0., 2.),
                    normal: Vec3::Y,
                    view_direction: Vec3::NEG_Z,
                    surface: floor,
                    portalable: true,
                },
                &config,
            )
            .unwrap();
        fixture
            .portals
            .place(
                PortalId::B,
                &PortalHit {
                    point: Vec3::new(-2., 2., -6.),
                    normal: Vec3::Z,
                    view_direction: Vec3::NEG_Z,
                    surface: wall,
                    portalable: true,
                },
                &config,
            )
            .unwrap();

        let mut body = MovingBody::cube(Vec3::new(-2., 2., 2.), 0.25);
        let mut cube = PhysicsCube::default();
        let traversals = simulate(&fixture, &mut body, &mut cube, 0.7);
        assert_eq!(traversals.len(), 1);
        assert_eq!(traversals[0].entry, PortalId::A);
        // Flung out of the wall into the room.
        assert!(body.position.z > -6.);
        assert!(body.velocity.z > 0.);
    }

    #[test]
    fn held_cube_only_cools_down() {
        let fixture = Fixture::new();
        let mut body = MovingBody::cube(Vec3::new(0., 3., 0.), 0.25);
        body.portal_cooldown = 0.1;
        let mut cube = PhysicsCube {
            held: true,
            resting: false,
        };
        simulate(&fixture, &mut body, &mut cube, 0.5);
        assert_eq!(body.position, Vec3::new(0., 3., 0.));
        assert_eq!(body.velocity, Vec3::ZERO);
        assert_eq!(body.portal_cooldown, 0.);
    }
}
