//! Grabbing and carrying the physics cubes.

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::*;

use super::{
    config::GameConfig,
    first_person_controller::{eye_transform, FirstPersonController, FirstPersonLabels},
    game::GameState,
    input::Actions,
    physics::{
        body::MovingBody, obstacle::Chamber, rigid_body::PhysicsCube, PhysicsLabels, MAX_DT,
        PROPS_GROUP, RAYCAST_GROUP,
    },
    portal::{
        geometry::transform_through,
        surface::{PortalPair, PortalSurface},
    },
};

/// How far away a cube can be picked up from.
const GRAB_REACH: f32 = 2.5;
/// Distance in front of the eye a held cube is kept at.
const HOLD_DISTANCE: f32 = 1.5;

#[derive(Debug)]
pub struct PropsPlugin;

impl Plugin for PropsPlugin {
    fn build(&self, app: &mut App) {
        app.add_system_set(
            ConditionSet::new()
                .run_in_state(GameState::Playing)
                .after(FirstPersonLabels::ResolveCollisions)
                .before(PhysicsLabels::IntegrateCubes)
                .with_system(grab_props)
                .with_system(carry_props)
                .into(),
        );
    }
}

/// Point a held cube is pulled towards.
pub fn hold_target(eye: &Transform) -> Vec3 {
    eye.translation + eye.forward() * HOLD_DISTANCE
}

/// Move a held cube to `target`, keeping the velocity it would be thrown with on release.
pub fn carry(body: &mut MovingBody, target: Vec3, chamber: &Chamber, dt: f32) {
    let mut target = target;
    let mut velocity = if dt > 0. {
        (target - body.position) / dt
    } else {
        Vec3::ZERO
    };
    chamber.clamp(&mut target, &mut velocity, body.half_extents);
    body.position = target;
    body.velocity = velocity;
}

/// Bring a held cube along when its holder goes from `entry` to `exit`.
///
/// The cube turns with the holder and takes its velocity, the jump from one portal to the other
/// is not motion.
pub fn carry_through(
    body: &mut MovingBody,
    target: Vec3,
    holder: &MovingBody,
    chamber: &Chamber,
    (entry, exit): (&PortalSurface, &PortalSurface),
    threshold: f32,
) {
    let pose = transform_through(entry, exit, &body.pose(), threshold);
    let mut target = target;
    let mut velocity = holder.velocity;
    chamber.clamp(&mut target, &mut velocity, body.half_extents);
    body.orientation = pose.orientation;
    body.position = target;
    body.velocity = velocity;
    body.portal_cooldown = holder.portal_cooldown;
}

fn grab_props(
    config: Res<GameConfig>,
    rapier: Res<RapierContext>,
    player_query: Query<(&ActionState<Actions>, &MovingBody), With<FirstPersonController>>,
    mut cubes: Query<(Entity, &mut PhysicsCube)>,
) {
    let (actions, player) = match player_query.get_single() {
        Ok(player) => player,
        Err(_) => return,
    };
    if !actions.just_pressed(Actions::Grab) {
        return;
    }

    let mut released = false;
    for (entity, mut cube) in &mut cubes {
        if cube.held {
            cube.held = false;
            released = true;
            info!("Released cube {:?}", entity);
        }
    }
    if released {
        return;
    }

    let eye = eye_transform(player, &config.player);
    let hit = rapier.cast_ray(
        eye.translation,
        eye.forward(),
        GRAB_REACH,
        true,
        QueryFilter {
            groups: Some(InteractionGroups::from(CollisionGroups::new(
                RAYCAST_GROUP,
                PROPS_GROUP,
            ))),
            ..default()
        },
    );
    match hit.map(|(entity, _)| (entity, cubes.get_mut(entity))) {
        Some((entity, Ok((_, mut cube)))) => {
            cube.held = true;
            cube.resting = false;
            info!("Grabbed cube {:?}", entity);
        }
        _ => debug!("Nothing to grab"),
    }
}

fn carry_props(
    time: Res<Time>,
    config: Res<GameConfig>,
    chamber: Res<Chamber>,
    portals: Res<PortalPair>,
    player_query: Query<
        (&FirstPersonController, &MovingBody),
        Without<PhysicsCube>,
    >,
    mut cubes: Query<(&PhysicsCube, &mut MovingBody)>,
) {
    let (controller, player) = match player_query.get_single() {
        Ok(player) => player,
        Err(_) => return,
    };
    let dt = time.delta_seconds().min(MAX_DT);
    let target = hold_target(&eye_transform(player, &config.player));
    let through = controller
        .last_traversal
        .and_then(|traversal| portals.linked(traversal.entry));
    for (cube, mut body) in &mut cubes {
        if !cube.held {
            continue;
        }
        match through {
            Some(pair) => {
                carry_through(
                    &mut body,
                    target,
                    player,
                    &chamber,
                    pair,
                    config.portal.vertical_threshold,
                );
                debug!("Held cube followed the player through portal {:?}", pair.0.id);
            }
            None => carry(&mut body, target, &chamber, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{
        first_person_controller::PlayerParams,
        physics::obstacle::Aabb,
        portal::{
            surface::{PortalConfig, PortalHit, PortalId},
            traversal::{BodyKind, TraversalConfig, TraversalDetector},
        },
    };

    fn chamber() -> Chamber {
        Chamber {
            bounds: Aabb::new(Vec3::new(-6., 0., -6.), Vec3::new(6., 4., 6.)),
        }
    }

    #[test]
    fn held_cube_floats_in_front_of_the_eye() {
        let eye = Transform::from_xyz(0., 1.4, 0.).looking_at(Vec3::new(1., 1.4, 0.), Vec3::Y);
        let target = hold_target(&eye);
        assert!(target.abs_diff_eq(Vec3::new(1.5, 1.4, 0.), 1e-5));

        let mut body = MovingBody::cube(Vec3::new(1., 1.4, 0.), 0.25);
        carry(&mut body, target, &chamber(), 0.05);
        assert!(body.position.abs_diff_eq(target, 1e-5));
        assert!(body.velocity.abs_diff_eq(Vec3::new(10., 0., 0.), 1e-3));
    }

    #[test]
    fn carried_cube_stays_in_the_chamber() {
        let mut body = MovingBody::cube(Vec3::new(5., 1., 0.), 0.25);
        carry(&mut body, Vec3::new(7., 1., 0.), &chamber(), 0.05);
        assert!(body.position.x <= 5.75 + 1e-5);
    }

    #[test]
    fn held_cube_follows_the_player_through_a_portal() {
        let portal_config = PortalConfig {
            surface_offset: 0.,
            ..default()
        };
        let mut portals = PortalPair::linked_pair(&portal_config);
        portals
            .place(
                PortalId::A,
                &PortalHit {
                    point: Vec3::new(0., 1.5, -5.),
                    normal: Vec3::Z,
                    view_direction: Vec3::NEG_Z,
                    surface: Aabb::new(Vec3::new(-6., -1., -5.5), Vec3::new(6., 3., -5.)),
                    portalable: true,
                },
                &portal_config,
            )
            .unwrap();
        portals
            .place(
                PortalId::B,
                &PortalHit {
                    point: Vec3::new(6., 1.5, 0.),
                    normal: Vec3::NEG_X,
                    view_direction: Vec3::X,
                    surface: Aabb::new(Vec3::new(6., -1., -6.), Vec3::new(6.5, 3., 6.)),
                    portalable: true,
                },
                &portal_config,
            )
            .unwrap();
        let traversal_config = TraversalConfig::default();
        let detector = TraversalDetector {
            portals: &portals,
            portal_config: &portal_config,
            config: &traversal_config,
        };
        let params = PlayerParams::default();

        let mut player = MovingBody::new(Vec3::new(0., 1.5, -4.95), params.half_extents());
        player.velocity = Vec3::new(0., 0., -2.);
        let held_at = hold_target(&eye_transform(&player, &params));
        let spin = Quat::from_rotation_z(0.3);
        let mut cube = MovingBody::cube(held_at, 0.25);
        cube.orientation = spin;

        let dt = 0.05;
        let prev = player.position;
        player.position += player.velocity * dt;
        let traversal = detector.traverse(&mut player, prev, BodyKind::Player).unwrap();
        assert_eq!(traversal.exit, PortalId::B);

        let target = hold_target(&eye_transform(&player, &params));
        let pair = portals.linked(traversal.entry).unwrap();
        carry_through(&mut cube, target, &player, &chamber(), pair, portal_config.vertical_threshold);

        // Still in front of the eye, on the exit side.
        assert!(cube.position.abs_diff_eq(target, 1e-4));
        assert!(cube.position.x < 6.);
        // Thrown no faster than the player walks.
        assert!(cube.velocity.abs_diff_eq(player.velocity, 1e-4));
        assert!(cube.velocity.length() <= 2. + 1e-4);
        // Turned the same way the player was.
        assert!(cube.orientation.abs_diff_eq(player.orientation * spin, 1e-4));
        assert!(cube.portal_cooldown > 0.);

        // The plain carry would have flung it across the room.
        let mut flung = MovingBody::cube(held_at, 0.25);
        carry(&mut flung, target, &chamber(), dt);
        assert!(flung.velocity.length() > 50.);
    }
}
