//! Portal placement, linking and the math used to see and travel through them.

use bevy::{
    prelude::*,
    render::{camera::CameraProjectionPlugin, view::{update_frusta, RenderLayers}},
    transform::TransformSystem,
};
use bevy_rapier3d::prelude::*;
use iyes_loopless::prelude::*;
use leafwing_input_manager::prelude::*;

pub mod camera_projection;
pub mod geometry;
pub mod surface;
pub mod traversal;
pub mod view;

use self::{
    camera_projection::PortalCameraProjection,
    surface::{PortalHit, PortalId, PortalPair},
    view::{PortalViewMaterial, PORTAL_LAYER},
};
use super::{
    config::GameConfig,
    first_person_controller::{FirstPersonCamera, FirstPersonController, FirstPersonLabels},
    game::GameState,
    input::Actions,
    physics::{obstacle::Obstacle, GROUND_GROUP, RAYCAST_GROUP, WALLS_GROUP},
    render::{mesh::PortalMeshes, RenderLabels},
};

#[derive(Debug)]
pub struct PortalPlugin;

#[derive(Debug, Clone, PartialEq, Eq, Hash, SystemLabel)]
pub enum PortalLabels {
    ShootPortals,
    SyncVisuals,
}

/// On screen marker of a portal. The aperture shows either the flat fill or the view
/// through the linked portal.
#[derive(Debug, Component)]
pub struct PortalVisual {
    pub id: PortalId,
    fill: Entity,
    view: Entity,
}

impl Plugin for PortalPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(MaterialPlugin::<PortalViewMaterial>::default())
            .add_plugin(CameraProjectionPlugin::<PortalCameraProjection>::default())
            .add_startup_system(setup_portals)
            .add_system_set(
                ConditionSet::new()
                    .run_in_state(GameState::Playing)
                    .label(PortalLabels::ShootPortals)
                    .after(FirstPersonLabels::ProcessInputs)
                    .with_system(fire_portal)
                    .into(),
            )
            .add_system(
                sync_portal_visuals
                    .label(PortalLabels::SyncVisuals)
                    .after(PortalLabels::ShootPortals),
            )
            .add_system(view::show_portals_to_player)
            .add_system(view::resize_portal_views)
            .add_system(view::sync_portal_cameras.after(RenderLabels::RecordFrame))
            .add_system_to_stage(
                CoreStage::PostUpdate,
                update_frusta::<PortalCameraProjection>.after(TransformSystem::TransformPropagate),
            );
    }
}

fn portal_material(color: Color, materials: &mut Assets<StandardMaterial>) -> Handle<StandardMaterial> {
    materials.add(StandardMaterial {
        base_color: color,
        emissive: color,
        unlit: true,
        cull_mode: None,
        ..default()
    })
}

fn setup_portals(
    mut commands: Commands,
    config: Res<GameConfig>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    windows: Res<Windows>,
    mut images: ResMut<Assets<Image>>,
    mut view_materials: ResMut<Assets<PortalViewMaterial>>,
) {
    commands.insert_resource(PortalPair::linked_pair(&config.portal));
    let views = view::create_portal_views(&mut commands, &windows, &mut images, &mut view_materials);

    let portal_meshes = PortalMeshes::new(&config.portal);
    let border = meshes.add(Mesh::from(&portal_meshes.border));
    let aperture = meshes.add(Mesh::from(&portal_meshes.mask));
    for id in PortalId::ALL {
        let fill = commands
            .spawn(PbrBundle {
                mesh: aperture.clone(),
                material: portal_material(id.color() * 0.5, &mut materials),
                visibility: Visibility::INVISIBLE,
                ..default()
            })
            .insert(RenderLayers::layer(PORTAL_LAYER))
            .id();
        let view = commands
            .spawn(MaterialMeshBundle::<PortalViewMaterial> {
                mesh: aperture.clone(),
                material: views.materials[id.index()].clone(),
                visibility: Visibility::INVISIBLE,
                ..default()
            })
            .insert(RenderLayers::layer(PORTAL_LAYER))
            .id();
        commands
            .spawn(PbrBundle {
                mesh: border.clone(),
                material: portal_material(id.color(), &mut materials),
                visibility: Visibility::INVISIBLE,
                ..default()
            })
            .insert((
                Name::from(format!("Portal {:?}", id)),
                PortalVisual { id, fill, view },
                RenderLayers::layer(PORTAL_LAYER),
            ))
            .push_children(&[fill, view]);
    }
    commands.insert_resource(views);
}

/// Cast a portal shot and describe what it hit.
pub fn portal_hit(
    rapier: &RapierContext,
    obstacles: &Query<&Obstacle>,
    origin: Vec3,
    direction: Vec3,
) -> Option<PortalHit> {
    let (entity, intersection) = rapier.cast_ray_and_get_normal(
        origin,
        direction,
        Real::MAX,
        true,
        QueryFilter {
            groups: Some(InteractionGroups::from(CollisionGroups::new(
                RAYCAST_GROUP,
                WALLS_GROUP | GROUND_GROUP,
            ))),
            ..default()
        },
    )?;
    let obstacle = obstacles.get(entity).ok()?;
    Some(PortalHit {
        point: intersection.point,
        normal: intersection.normal,
        view_direction: direction,
        surface: obstacle.bounds,
        portalable: obstacle.portalable,
    })
}

/// On left click/right click, shoot a portal.
fn fire_portal(
    config: Res<GameConfig>,
    rapier: Res<RapierContext>,
    mut portals: ResMut<PortalPair>,
    player_query: Query<&ActionState<Actions>, With<FirstPersonController>>,
    camera_query: Query<&GlobalTransform, With<FirstPersonCamera>>,
    obstacles: Query<&Obstacle>,
) {
    let (actions, camera) = match (player_query.get_single(), camera_query.get_single()) {
        (Ok(actions), Ok(camera)) => (actions, camera),
        _ => return,
    };
    for (id, action) in [
        (PortalId::A, Actions::FirePortalA),
        (PortalId::B, Actions::FirePortalB),
    ] {
        if !actions.just_pressed(action) {
            continue;
        }
        let hit = match portal_hit(&rapier, &obstacles, camera.translation(), camera.forward()) {
            Some(hit) => hit,
            None => {
                debug!("Portal {:?} shot hit nothing", id);
                continue;
            }
        };
        match portals.place(id, &hit, &config.portal) {
            Ok(()) => info!("Placed portal {:?} at {}", id, portals.get(id).center),
            Err(err) => info!("Portal {:?} rejected: {}", id, err),
        }
    }
}

fn sync_portal_visuals(
    portals: Res<PortalPair>,
    mut visuals: Query<(&PortalVisual, &mut Transform, &mut Visibility)>,
    mut apertures: Query<&mut Visibility, Without<PortalVisual>>,
) {
    if !portals.is_changed() {
        return;
    }
    for (visual, mut transform, mut visibility) in &mut visuals {
        let portal = portals.get(visual.id);
        *transform = portal.transform();
        visibility.is_visible = portal.is_placed;
        // Linked portals are seen through, closed ones are filled.
        let linked = portals.linked(visual.id).is_some();
        if let Ok(mut fill) = apertures.get_mut(visual.fill) {
            fill.is_visible = !linked;
        }
        if let Ok(mut view) = apertures.get_mut(visual.view) {
            view.is_visible = linked;
        }
    }
}
