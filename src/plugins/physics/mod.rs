//! Body integration against the static level, and the glue with Rapier.
//!
//! Rapier only hosts colliders for scene queries (portal shots, grabbing): its physics
//! pipeline is switched off and bodies are moved by the integrators of this crate.

use bevy::prelude::*;
use bevy_rapier3d::prelude::{Group, RapierConfiguration};
use iyes_loopless::prelude::*;

pub mod body;
pub mod obstacle;
pub mod rigid_body;

use self::{
    body::MovingBody,
    obstacle::{Chamber, Obstacle},
    rigid_body::{step_cube, PhysicsCube},
};
use super::{
    config::GameConfig,
    first_person_controller::FirstPersonLabels,
    game::GameState,
    portal::{
        surface::{PortalConfig, PortalPair},
        traversal::{TraversalConfig, TraversalDetector},
    },
};

pub const WALLS_GROUP: Group = Group::GROUP_1;
pub const PROPS_GROUP: Group = Group::GROUP_2;
pub const RAYCAST_GROUP: Group = Group::GROUP_5;
pub const GROUND_GROUP: Group = Group::GROUP_6;
pub const ALL_GROUPS: Group = Group::ALL;

/// Longest step the integrators accept, longer frames are slowed down.
pub const MAX_DT: f32 = 1. / 20.;

#[derive(Debug)]
pub struct PhysicsPlugin;

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
pub enum PhysicsLabels {
    IntegrateCubes,
    SyncTransforms,
}

impl Plugin for PhysicsPlugin {
    fn build(&self, app: &mut App) {
        app.add_startup_system(configure_rapier)
            .add_system_set(
                ConditionSet::new()
                    .run_in_state(GameState::Playing)
                    .label(PhysicsLabels::IntegrateCubes)
                    .after(FirstPersonLabels::ResolveCollisions)
                    .with_system(integrate_cubes)
                    .into(),
            )
            .add_system(
                sync_cube_transforms
                    .label(PhysicsLabels::SyncTransforms)
                    .after(PhysicsLabels::IntegrateCubes),
            );
    }
}

fn configure_rapier(mut config: ResMut<RapierConfiguration>) {
    config.physics_pipeline_active = false;
    config.query_pipeline_active = true;
}

/// Read-only view of everything bodies collide with during a frame.
pub struct PhysicsWorld<'a> {
    pub portals: &'a PortalPair,
    pub obstacles: &'a [Obstacle],
    pub chamber: &'a Chamber,
    pub portal_config: &'a PortalConfig,
    pub traversal: &'a TraversalConfig,
}

impl<'a> PhysicsWorld<'a> {
    pub fn detector(&self) -> TraversalDetector<'a> {
        TraversalDetector {
            portals: self.portals,
            portal_config: self.portal_config,
            config: self.traversal,
        }
    }
}

pub fn integrate_cubes(
    time: Res<Time>,
    config: Res<GameConfig>,
    portals: Res<PortalPair>,
    chamber: Res<Chamber>,
    obstacles_query: Query<&Obstacle>,
    mut cubes: Query<(&mut MovingBody, &mut PhysicsCube)>,
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
    for (mut body, mut cube) in &mut cubes {
        if let Some(traversal) = step_cube(&mut body, &mut cube, &config.cube, &world, dt) {
            debug!("Cube went from {:?} to {:?}", traversal.entry, traversal.exit);
        }
    }
}

fn sync_cube_transforms(
    mut cubes: Query<(&MovingBody, &mut Transform), (With<PhysicsCube>, Changed<MovingBody>)>,
) {
    for (body, mut transform) in &mut cubes {
        *transform = body.transform();
    }
}
