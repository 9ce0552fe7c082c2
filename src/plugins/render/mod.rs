//! Portal rendering.
//!
//! Every frame the stencil pipeline is run against a [`CommandRecorder`], producing a
//! device-agnostic [`PortalFrame`] that a backend can replay. [`SoftwareTarget`] is such a
//! backend, used by the frame dump and by tests.

use bevy::prelude::*;
use iyes_loopless::prelude::*;

pub mod device;
pub mod mesh;
pub mod pipeline;
pub mod recorder;
pub mod software;

use self::{
    mesh::{PortalMeshes, RenderScene},
    pipeline::{PortalView, StencilRenderPipeline},
    recorder::{CommandRecorder, PortalFrame},
};
use super::{
    config::GameConfig,
    first_person_controller::{eye_transform, FirstPersonController},
    game::GameState,
    physics::{body::MovingBody, obstacle::Obstacle, rigid_body::PhysicsCube, PhysicsLabels},
    portal::{camera_projection::CameraState, surface::PortalPair, PortalLabels},
};

const PORTALABLE_COLOR: Color = Color::rgb(0.82, 0.82, 0.8);
const BARE_COLOR: Color = Color::rgb(0.3, 0.3, 0.33);
const CUBE_COLOR: Color = Color::rgb(0.55, 0.62, 0.7);
const PLAYER_COLOR: Color = Color::rgb(0.9, 0.75, 0.3);

#[derive(Debug)]
pub struct RenderPlugin;

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
pub enum RenderLabels {
    RecordFrame,
}

impl Plugin for RenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PortalFrame>()
            .add_startup_system(setup_portal_meshes)
            .add_system_set(
                ConditionSet::new()
                    .run_in_state(GameState::Playing)
                    .label(RenderLabels::RecordFrame)
                    .after(PortalLabels::SyncVisuals)
                    .after(PhysicsLabels::SyncTransforms)
                    .with_system(record_portal_frame)
                    .into(),
            );
    }
}

fn setup_portal_meshes(mut commands: Commands, config: Res<GameConfig>) {
    commands.insert_resource(PortalMeshes::new(&config.portal));
}

/// Geometry seen by the main and virtual cameras.
pub fn collect_scene<'a>(
    obstacles: impl Iterator<Item = &'a Obstacle>,
    bodies: impl Iterator<Item = (&'a MovingBody, bool)>,
) -> RenderScene {
    let mut scene = RenderScene::default();
    for obstacle in obstacles {
        let color = if obstacle.portalable {
            PORTALABLE_COLOR
        } else {
            BARE_COLOR
        };
        scene.push(obstacle.bounds, color);
    }
    for (body, is_player) in bodies {
        if is_player {
            scene.push_viewer(body.bounds(), PLAYER_COLOR);
        } else {
            scene.push(body.bounds(), CUBE_COLOR);
        }
    }
    scene
}

fn record_portal_frame(
    config: Res<GameConfig>,
    windows: Res<Windows>,
    portals: Res<PortalPair>,
    meshes: Option<Res<PortalMeshes>>,
    mut frame: ResMut<PortalFrame>,
    obstacles_query: Query<&Obstacle>,
    cubes_query: Query<&MovingBody, With<PhysicsCube>>,
    player_query: Query<&MovingBody, With<FirstPersonController>>,
) {
    let (meshes, player) = match (meshes, player_query.get_single()) {
        (Some(meshes), Ok(player)) => (meshes, player),
        _ => return,
    };
    let params = &config.player;
    let aspect_ratio = windows
        .get_primary()
        .map(|w| w.width() / w.height().max(1.))
        .unwrap_or(16. / 9.);
    let camera = CameraState {
        transform: eye_transform(player, params),
        fov: params.fov,
        aspect_ratio,
        near: params.near,
        far: params.far,
    };
    let scene = collect_scene(
        obstacles_query.iter(),
        cubes_query
            .iter()
            .map(|body| (body, false))
            .chain(std::iter::once((player, true))),
    );

    let mut recorder = CommandRecorder::default();
    let virtual_cameras = StencilRenderPipeline::new(&config.portal).render(
        &mut recorder,
        &PortalView {
            scene: &scene,
            camera: &camera,
            portals: &portals,
            meshes: &meshes,
        },
    );
    *frame = PortalFrame {
        scene,
        commands: recorder.into_commands(),
        virtual_cameras,
    };
}
