//! On screen portal views.
//!
//! Each portal owns a camera rendering to a texture. Every frame the camera takes the pose and
//! oblique projection of the matching virtual camera from the recorded [`PortalFrame`], and the
//! portal aperture shows the texture in screen space.

use bevy::{
    pbr::{MaterialPipeline, MaterialPipelineKey},
    prelude::*,
    reflect::TypeUuid,
    render::{
        camera::{Projection, RenderTarget},
        mesh::MeshVertexBufferLayout,
        render_resource::{
            AsBindGroup, Extent3d, RenderPipelineDescriptor, ShaderRef,
            SpecializedMeshPipelineError, TextureDescriptor, TextureDimension, TextureFormat,
            TextureUsages,
        },
        view::RenderLayers,
    },
    window::WindowResized,
};

use super::{camera_projection::PortalCameraProjection, surface::PortalId};
use crate::plugins::{first_person_controller::FirstPersonCamera, render::recorder::PortalFrame};

/// Render layer of the portal meshes. Portal cameras never see portals.
pub const PORTAL_LAYER: u8 = 1;

/// Used until the primary window reports its size.
const FALLBACK_TARGET_SIZE: UVec2 = UVec2::new(1280, 720);

/// Samples the portal camera texture at the fragment's screen position.
#[derive(AsBindGroup, Debug, Clone, TypeUuid)]
#[uuid = "6f3e9b2c-84d1-4c57-a0e2-3b9d71c5e812"]
pub struct PortalViewMaterial {
    #[texture(0)]
    #[sampler(1)]
    pub texture: Handle<Image>,
}

impl Material for PortalViewMaterial {
    fn fragment_shader() -> ShaderRef {
        "shaders/portal_view.wgsl".into()
    }

    fn specialize(
        _pipeline: &MaterialPipeline<Self>,
        descriptor: &mut RenderPipelineDescriptor,
        _layout: &MeshVertexBufferLayout,
        _key: MaterialPipelineKey<Self>,
    ) -> Result<(), SpecializedMeshPipelineError> {
        descriptor.primitive.cull_mode = None;
        Ok(())
    }
}

/// Render target and aperture material of each portal, indexed by [`PortalId::index`].
#[derive(Debug, Resource)]
pub struct PortalViews {
    pub targets: [Handle<Image>; 2],
    pub materials: [Handle<PortalViewMaterial>; 2],
}

#[derive(Debug, Component)]
pub struct PortalViewCamera {
    pub id: PortalId,
}

fn target_extent(size: UVec2) -> Extent3d {
    Extent3d {
        width: size.x.max(1),
        height: size.y.max(1),
        ..default()
    }
}

fn render_target(size: UVec2) -> Image {
    let size = target_extent(size);
    let mut image = Image {
        texture_descriptor: TextureDescriptor {
            label: None,
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format: TextureFormat::Bgra8UnormSrgb,
            usage: TextureUsages::TEXTURE_BINDING
                | TextureUsages::COPY_DST
                | TextureUsages::RENDER_ATTACHMENT,
        },
        ..default()
    };
    image.resize(size);
    image
}

fn primary_size(windows: &Windows) -> UVec2 {
    windows
        .get_primary()
        .map(|w| UVec2::new(w.physical_width(), w.physical_height()))
        .unwrap_or(FALLBACK_TARGET_SIZE)
}

/// Create the render targets and spawn one inactive camera per portal.
pub fn create_portal_views(
    commands: &mut Commands,
    windows: &Windows,
    images: &mut Assets<Image>,
    materials: &mut Assets<PortalViewMaterial>,
) -> PortalViews {
    let size = primary_size(windows);
    let mut targets: [Handle<Image>; 2] = default();
    let mut view_materials: [Handle<PortalViewMaterial>; 2] = default();
    for id in PortalId::ALL {
        let i = id.index();
        targets[i] = images.add(render_target(size));
        view_materials[i] = materials.add(PortalViewMaterial {
            texture: targets[i].clone(),
        });
        commands
            .spawn(Camera3dBundle {
                camera: Camera {
                    // Render before the main camera.
                    priority: -1 - i as isize,
                    target: RenderTarget::Image(targets[i].clone()),
                    is_active: false,
                    ..default()
                },
                ..default()
            })
            .insert((
                Name::from(format!("Portal {:?} camera", id)),
                PortalViewCamera { id },
                PortalCameraProjection::default(),
            ))
            .remove::<Projection>();
    }
    PortalViews {
        targets,
        materials: view_materials,
    }
}

/// The player camera is the only one seeing the portal meshes.
pub fn show_portals_to_player(
    mut commands: Commands,
    cameras: Query<Entity, Added<FirstPersonCamera>>,
) {
    for entity in &cameras {
        commands
            .entity(entity)
            .insert(RenderLayers::default().with(PORTAL_LAYER));
    }
}

/// Copy the virtual cameras of the last recorded frame onto the portal cameras.
pub fn sync_portal_cameras(
    frame: Res<PortalFrame>,
    mut cameras: Query<(
        &PortalViewCamera,
        &mut Camera,
        &mut Transform,
        &mut PortalCameraProjection,
    )>,
) {
    if !frame.is_changed() {
        return;
    }
    for (view, mut camera, mut transform, mut projection) in &mut cameras {
        match frame.virtual_cameras[view.id.index()] {
            Some(virtual_camera) => {
                camera.is_active = true;
                *transform = virtual_camera.transform;
                *projection = virtual_camera.projection;
            }
            None if camera.is_active => camera.is_active = false,
            None => {}
        }
    }
}

/// Keep the portal textures at the resolution of the window they are shown in.
pub fn resize_portal_views(
    mut resized: EventReader<WindowResized>,
    windows: Res<Windows>,
    views: Res<PortalViews>,
    mut images: ResMut<Assets<Image>>,
) {
    if resized.iter().last().is_none() {
        return;
    }
    let size = target_extent(primary_size(&windows));
    for handle in &views.targets {
        if let Some(image) = images.get_mut(handle) {
            if image.texture_descriptor.size != size {
                debug!("Resizing portal view to {}x{}", size.width, size.height);
                image.resize(size);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::portal::camera_projection::VirtualCamera;

    #[test]
    fn render_targets_match_the_requested_size() {
        let image = render_target(UVec2::new(320, 180));
        assert_eq!(image.size(), Vec2::new(320., 180.));
        assert_eq!(image.data.len(), 320 * 180 * 4);
        let empty = render_target(UVec2::ZERO);
        assert_eq!(empty.size(), Vec2::ONE);
    }

    #[test]
    fn portal_cameras_follow_the_recorded_frame() {
        let mut app = App::new();
        app.init_resource::<PortalFrame>()
            .add_system(sync_portal_cameras);
        let cameras = PortalId::ALL.map(|id| {
            app.world
                .spawn((
                    PortalViewCamera { id },
                    Camera {
                        is_active: false,
                        ..default()
                    },
                    Transform::IDENTITY,
                    PortalCameraProjection::default(),
                ))
                .id()
        });

        let virtual_camera = VirtualCamera {
            transform: Transform::from_xyz(1., 2., 3.),
            projection: PortalCameraProjection {
                near: 0.02,
                clip_plane: Some(Vec4::new(0., 0., -1., -2.)),
                ..default()
            },
        };
        app.world.resource_mut::<PortalFrame>().virtual_cameras = [Some(virtual_camera), None];
        app.update();

        let a = app.world.entity(cameras[0]);
        assert!(a.get::<Camera>().map_or(false, |c| c.is_active));
        assert_eq!(a.get::<Transform>(), Some(&virtual_camera.transform));
        assert_eq!(
            a.get::<PortalCameraProjection>(),
            Some(&virtual_camera.projection)
        );
        let b = app.world.entity(cameras[1]);
        assert!(!b.get::<Camera>().map_or(true, |c| c.is_active));
    }
}
