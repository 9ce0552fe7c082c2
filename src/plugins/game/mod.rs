use std::f32::consts::*;

use crate::{
    plugins::{
        first_person_controller::FirstPersonControllerBundle,
        physics::{body::MovingBody, rigid_body::PhysicsCube},
        *,
    },
    util::scenes::make_test_chamber,
};

use bevy::prelude::*;
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;

const CHAMBER_SIZE: f32 = 12.;
const CHAMBER_HEIGHT: f32 = 4.;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameState {
    Playing,
    Paused,
}

#[derive(Debug)]
/// Main game plugin, responsible for loading the other game plugins and bootstrapping the game.
pub struct GamePlugin;

impl Plugin for GamePlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(DefaultPlugins.set(WindowPlugin {
            window: WindowDescriptor {
                title: "Lost Portal".to_string(),
                width: 1280.,
                height: 720.,
                ..default()
            },
            ..default()
        }));
        app.add_loopless_state(GameState::Playing);

        app.add_plugin(config::ConfigPlugin);
        app.add_plugin(RapierPhysicsPlugin::<NoUserData>::default());
        app.add_plugin(physics::PhysicsPlugin);
        app.add_plugin(input::InputPlugin);
        app.add_plugin(first_person_controller::FirstPersonControllerPlugin);
        app.add_plugin(portal::PortalPlugin);
        app.add_plugin(props::PropsPlugin);
        app.add_plugin(render::RenderPlugin);

        #[cfg(feature = "devel")]
        {
            app.add_plugin(debug::DebugPlugin);
        }

        app.add_startup_system(setup).add_system(toggle_pause);
    }
}

fn toggle_pause(
    mut commands: Commands,
    keys: Res<Input<KeyCode>>,
    state: Res<CurrentState<GameState>>,
) {
    if keys.just_pressed(KeyCode::Escape) {
        let next = match state.0 {
            GameState::Playing => GameState::Paused,
            GameState::Paused => GameState::Playing,
        };
        info!("Game state: {:?}", next);
        commands.insert_resource(NextState(next));
    }
}

/// Perform game initialization
fn setup(
    mut commands: Commands,
    config: Res<config::GameConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let chamber = make_test_chamber(
        &mut commands,
        &mut meshes,
        &mut materials,
        CHAMBER_SIZE,
        CHAMBER_HEIGHT,
    );

    // Light
    commands.spawn(PointLightBundle {
        point_light: PointLight {
            intensity: 3000.,
            range: 30.,
            shadows_enabled: true,
            ..default()
        },
        transform: Transform::from_translation(chamber.bounds.center() + Vec3::Y * 1.5),
        ..default()
    });
    commands.insert_resource(AmbientLight {
        color: Color::ANTIQUE_WHITE,
        brightness: 0.3,
    });

    // Cubes
    let half = config.cube.half_extent;
    let cube_mesh = meshes.add(shape::Cube::new(half * 2.).into());
    let cube_material = materials.add(StandardMaterial::from(Color::rgb(0.55, 0.62, 0.7)));
    for (i, position) in [Vec3::new(-1., 2., 0.), Vec3::new(1., 3., -1.5)]
        .into_iter()
        .enumerate()
    {
        let body = MovingBody::cube(position, half);
        commands
            .spawn(PbrBundle {
                mesh: cube_mesh.clone(),
                material: cube_material.clone(),
                transform: body.transform(),
                ..default()
            })
            .insert((
                Name::from(format!("Cube_{}", i)),
                body,
                PhysicsCube::default(),
                Collider::cuboid(half, half, half),
                CollisionGroups::new(physics::PROPS_GROUP, physics::ALL_GROUPS),
            ));
    }

    // Spawn player
    commands.spawn(FirstPersonControllerBundle {
        spatial: SpatialBundle {
            transform: Transform::from_xyz(0., config.player.half_height, 3.)
                .with_rotation(Quat::from_rotation_y(FRAC_PI_8)),
            ..default()
        },
        ..default()
    });
}
