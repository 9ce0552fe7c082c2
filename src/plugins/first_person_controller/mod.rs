//! This module contains the first person controller plugin.
//!
//! The controller is kinematic: input and gravity produce a candidate position every frame,
//! which [`collision::resolve_player`] then resolves against the level and the portals.

use std::f32::consts::FRAC_PI_4;

use bevy::{
    input::mouse::MouseMotion, prelude::*, reflect::FromReflect, render::camera::Projection,
};
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::*;
use serde::Deserialize;

pub mod collision;
pub mod recovery;

use self::{collision::resolve_player, recovery::AnimateRoll};
use super::{
    config::GameConfig,
    game::GameState,
    input::{default_input_map, Actions},
    physics::{
        body::MovingBody,
        obstacle::{Chamber, Obstacle},
        PhysicsWorld, MAX_DT,
    },
    portal::{geometry::normalize_or, surface::PortalPair, traversal::Traversal},
};

#[derive(Debug)]
/// First person controller plugin, which registers the required systems to use the first person
/// controller also provided by this module.
pub struct FirstPersonControllerPlugin;

impl Plugin for FirstPersonControllerPlugin {
    fn build(&self, app: &mut App) {
        app.add_system(spawn_controller.label(FirstPersonLabels::SpawnControllers))
            .add_system_set(
                ConditionSet::new()
                    .run_in_state(GameState::Playing)
                    .label(FirstPersonLabels::ProcessInputs)
                    .after(FirstPersonLabels::SpawnControllers)
                    .with_system(process_controller_inputs)
                    .into(),
            )
            .add_system_set(
                ConditionSet::new()
                    .run_in_state(GameState::Playing)
                    .label(FirstPersonLabels::ResolveCollisions)
                    .after(FirstPersonLabels::ProcessInputs)
                    .with_system(resolve_player_collisions)
                    .into(),
            )
            .add_system(
                sync_player_transforms
                    .label(FirstPersonLabels::SyncTransforms)
                    .after(FirstPersonLabels::ResolveCollisions),
            );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
/// Labels for the first person controller systems.
pub enum FirstPersonLabels {
    SpawnControllers,
    ProcessInputs,
    ResolveCollisions,
    SyncTransforms,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerParams {
    pub radius: f32,
    pub half_height: f32,
    /// Camera height above the body center.
    pub eye_height: f32,
    pub walk_speed: f32,
    pub sprint_multiplier: f32,
    pub jump_speed: f32,
    pub gravity: f32,
    /// Radians per mouse count.
    pub mouse_sensitivity: f32,
    /// How fast input steers horizontal velocity while airborne, per second.
    pub air_control: f32,
    /// Seconds taken to turn back upright after an upside down exit.
    pub recovery_duration: f32,
    /// Degrees per second.
    pub roll_recovery_rate: f32,
    pub roll_damping: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for PlayerParams {
    fn default() -> Self {
        PlayerParams {
            radius: 0.35,
            half_height: 0.8,
            eye_height: 0.6,
            walk_speed: 3.,
            sprint_multiplier: 2.,
            jump_speed: 4.5,
            gravity: 9.81,
            mouse_sensitivity: 0.004,
            air_control: 2.,
            recovery_duration: 0.5,
            roll_recovery_rate: 180.,
            roll_damping: 6.,
            fov: FRAC_PI_4,
            near: 0.1,
            far: 1000.,
        }
    }
}

impl PlayerParams {
    pub fn half_extents(&self) -> Vec3 {
        Vec3::new(self.radius, self.half_height, self.radius)
    }
}

#[derive(Debug, Component)]
/// First person controller component.
pub struct FirstPersonController {
    pub camera: Entity,
    /// Position before this frame's movement.
    pub prev_position: Vec3,
    /// Running orientation recovery, locks the camera while present.
    pub recovery: Option<AnimateRoll>,
    /// Portal the player went through this frame, if any.
    pub last_traversal: Option<Traversal>,
}

impl FirstPersonController {
    pub fn is_camera_locked(&self) -> bool {
        self.recovery.is_some()
    }
}

#[derive(Debug, Default, Component, Reflect, FromReflect)]
#[reflect(Component)]
/// Marker trait for first person cameras
pub struct FirstPersonCamera;

#[derive(Debug, Component, Default)]
pub struct FirstPersonControllerSpawner;

#[derive(Debug, Bundle, Default)]
pub struct FirstPersonControllerBundle {
    #[bundle]
    pub spatial: SpatialBundle,
    pub spawner: FirstPersonControllerSpawner,
}

fn spawn_controller(
    mut commands: Commands,
    config: Res<GameConfig>,
    spawners_query: Query<(&Transform, Entity), With<FirstPersonControllerSpawner>>,
) {
    let params = &config.player;
    for (transform, id) in &spawners_query {
        let camera = commands
            .spawn(Camera3dBundle {
                projection: Projection::Perspective(PerspectiveProjection {
                    fov: params.fov,
                    aspect_ratio: 16. / 9.,
                    near: params.near,
                    far: params.far,
                }),
                transform: Transform::from_translation(Vec3::Y * params.eye_height),
                ..default()
            })
            .insert((Name::from("Player camera"), FirstPersonCamera))
            .id();

        let mut body = MovingBody::new(transform.translation, params.half_extents());
        body.orientation = transform.rotation;
        commands
            .entity(id)
            .insert(InputManagerBundle {
                action_state: ActionState::default(),
                input_map: default_input_map(),
            })
            .insert((
                Name::from("Player"),
                FirstPersonController {
                    camera,
                    prev_position: body.position,
                    recovery: None,
                    last_traversal: None,
                },
                body,
            ))
            .add_child(camera)
            .remove::<FirstPersonControllerSpawner>();
        info!("Spawned first person controller at {}", transform.translation);
    }
}

/// Apply a mouse motion, in counts, to a look orientation. Pitch stops short of straight up or
/// down.
pub fn mouse_look(orientation: Quat, delta: Vec2, sensitivity: f32) -> Quat {
    // Yaw turns around world up, pitch around the camera's own right axis.
    let yaw = -delta.x * sensitivity;
    let pitch = -delta.y * sensitivity;
    let yawed = Quat::from_rotation_y(yaw) * orientation;
    let pitched = yawed * Quat::from_rotation_x(pitch);
    if (pitched * Vec3::NEG_Z).y.abs() < 0.99 {
        pitched.normalize()
    } else {
        yawed.normalize()
    }
}

/// Turn input into a look direction and a candidate position.
fn process_controller_inputs(
    time: Res<Time>,
    config: Res<GameConfig>,
    mut mouse_motion: EventReader<MouseMotion>,
    mut player_query: Query<(
        &ActionState<Actions>,
        &mut FirstPersonController,
        &mut MovingBody,
    )>,
) {
    let params = &config.player;
    let dt = time.delta_seconds().min(MAX_DT);
    let mouse_delta: Vec2 = mouse_motion.iter().map(|motion| motion.delta).sum();

    for (input_state, mut controller, mut body) in &mut player_query {
        if !controller.is_camera_locked() && mouse_delta != Vec2::ZERO {
            body.orientation = mouse_look(body.orientation, mouse_delta, params.mouse_sensitivity);
        }

        let forward = body.orientation * Vec3::NEG_Z;
        let fallback = body.orientation * Vec3::Y;
        let forward = normalize_or(
            Vec3::new(forward.x, 0., forward.z),
            normalize_or(Vec3::new(fallback.x, 0., fallback.z), Vec3::NEG_Z),
        );
        let right = forward.cross(Vec3::Y);

        let mut wish = Vec3::ZERO;
        match (
            input_state.pressed(Actions::Forward),
            input_state.pressed(Actions::Backwards),
        ) {
            (true, false) => wish += forward,
            (false, true) => wish -= forward,
            _ => {}
        }
        match (
            input_state.pressed(Actions::StrafeLeft),
            input_state.pressed(Actions::StrafeRight),
        ) {
            (true, false) => wish -= right,
            (false, true) => wish += right,
            _ => {}
        }
        let k = if input_state.pressed(Actions::Sprint) {
            params.sprint_multiplier
        } else {
            1.
        };
        let wish = wish.normalize_or_zero() * params.walk_speed * k;

        let horizontal = Vec3::new(body.velocity.x, 0., body.velocity.z);
        let horizontal = if body.grounded {
            wish
        } else if wish != Vec3::ZERO {
            // Airborne: steer a little, keep most of the momentum from a fling.
            horizontal + (wish - horizontal) * (params.air_control * dt).min(1.)
        } else {
            horizontal
        };
        body.velocity.x = horizontal.x;
        body.velocity.z = horizontal.z;

        if body.grounded && input_state.just_pressed(Actions::Jump) {
            body.velocity.y = params.jump_speed;
        }
        body.velocity.y -= params.gravity * dt;

        controller.prev_position = body.position;
        let velocity = body.velocity;
        body.position += velocity * dt;
    }
}

fn resolve_player_collisions(
    time: Res<Time>,
    config: Res<GameConfig>,
    portals: Res<PortalPair>,
    chamber: Res<Chamber>,
    obstacles_query: Query<&Obstacle>,
    mut player_query: Query<(&mut FirstPersonController, &mut MovingBody)>,
) {
    let dt = time.delta_seconds().min(MAX_DT);
    let obstacles = obstacles_query.iter().copied().collect::<Vec<_>>();
    let world = PhysicsWorld {
        portals: &portals,
        obstacles: &obstacles,
        chamber: &chamber,
        portal_config: &config.portal,
        traversal: &config.traversal,
    };
    for (mut controller, mut body) in &mut player_query {
        let prev = controller.prev_position;
        let resolution = resolve_player(
            &mut body,
            &mut controller.recovery,
            prev,
            dt,
            &world,
            &config.player,
        );
        if let Some(traversal) = resolution.traversal {
            info!(
                "Player went through portal {:?}, recovering: {}",
                traversal.entry, traversal.needs_recovery
            );
        }
        controller.last_traversal = resolution.traversal;
    }
}

/// The player root only carries the position, the camera carries the full orientation.
fn sync_player_transforms(
    config: Res<GameConfig>,
    mut player_query: Query<
        (&FirstPersonController, &MovingBody, &mut Transform),
        Without<FirstPersonCamera>,
    >,
    mut camera_query: Query<&mut Transform, With<FirstPersonCamera>>,
) {
    for (controller, body, mut transform) in &mut player_query {
        transform.translation = body.position;
        transform.rotation = Quat::IDENTITY;
        if let Ok(mut camera_transform) = camera_query.get_mut(controller.camera) {
            camera_transform.translation = Vec3::Y * config.player.eye_height;
            camera_transform.rotation = body.orientation;
        }
    }
}

/// Camera pose the renderer should use for this player.
pub fn eye_transform(body: &MovingBody, params: &PlayerParams) -> Transform {
    Transform::from_translation(body.position + Vec3::Y * params.eye_height)
        .with_rotation(body.orientation)
}
