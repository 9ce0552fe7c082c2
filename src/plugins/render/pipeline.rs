//! Stencil-buffer portal rendering.
//!
//! For every linked portal, in fixed A then B order:
//! 1. the aperture is drawn with colour off, tagging its visible pixels in the stencil buffer
//!    and pushing their depth to the far plane;
//! 2. the scene is drawn from the portal's virtual camera, restricted to the tagged pixels;
//!    the player's own body only shows up here, never in the main view;
//! 3. the aperture depth is written back inside the tag so later geometry sorts against the
//!    portal surface.
//!
//! Borders, and the fill of unlinked portals, come last with stencil off.

use bevy::prelude::*;

use super::{
    device::{ClearFlags, MaskDepth, PipelineState, RenderDevice, ScenePass, ScopedState},
    mesh::{PortalMeshes, RenderScene},
};
use crate::plugins::portal::{
    camera_projection::{compute_virtual_camera, CameraState, VirtualCamera},
    surface::{PortalConfig, PortalPair},
};

/// Inputs of a single frame.
pub struct PortalView<'a> {
    pub scene: &'a RenderScene,
    pub camera: &'a CameraState,
    pub portals: &'a PortalPair,
    pub meshes: &'a PortalMeshes,
}

pub struct StencilRenderPipeline<'a> {
    pub config: &'a PortalConfig,
}

impl<'a> StencilRenderPipeline<'a> {
    pub fn new(config: &'a PortalConfig) -> Self {
        StencilRenderPipeline { config }
    }

    /// Render a frame, returning the virtual camera used for each linked portal.
    pub fn render<D: RenderDevice + ?Sized>(
        &self,
        device: &mut D,
        frame: &PortalView,
    ) -> [Option<VirtualCamera>; 2] {
        device.apply_state(&PipelineState::default());
        device.clear(ClearFlags::all());

        let main_view = frame.camera.view();
        device.draw_scene(frame.scene, &main_view, ScenePass::Main);

        let mut virtual_cameras = [None, None];
        for (entry, exit) in frame.portals.iter().filter_map(|p| frame.portals.linked(p.id)) {
            let reference = entry.id.stencil_ref();
            let model = entry.transform().compute_matrix();
            {
                let mut mask = ScopedState::new(device, PipelineState::stencil_mask(reference));
                mask.draw_mesh(
                    &frame.meshes.mask,
                    &model,
                    entry.id.color(),
                    &main_view,
                    MaskDepth::Far,
                );
            }

            let virtual_camera = compute_virtual_camera(frame.camera, entry, exit, self.config);
            {
                let mut view = ScopedState::new(device, PipelineState::stencil_view(reference));
                view.draw_scene(frame.scene, &virtual_camera.view(), ScenePass::Portal);
            }

            {
                let mut patch = ScopedState::new(device, PipelineState::depth_patch(reference));
                patch.draw_mesh(
                    &frame.meshes.mask,
                    &model,
                    entry.id.color(),
                    &main_view,
                    MaskDepth::Surface,
                );
            }
            virtual_cameras[entry.id.index()] = Some(virtual_camera);
        }

        {
            let mut borders = ScopedState::new(device, PipelineState::borders());
            for portal in frame.portals.iter().filter(|p| p.is_placed) {
                let model = portal.transform().compute_matrix();
                borders.draw_mesh(
                    &frame.meshes.border,
                    &model,
                    portal.id.color(),
                    &main_view,
                    MaskDepth::Surface,
                );
                if frame.portals.linked(portal.id).is_none() {
                    // Closed portal, nothing to see through.
                    borders.draw_mesh(
                        &frame.meshes.mask,
                        &model,
                        closed_color(portal.id.color()),
                        &main_view,
                        MaskDepth::Surface,
                    );
                }
            }
        }

        device.apply_state(&PipelineState::default());
        virtual_cameras
    }
}

fn closed_color(color: Color) -> Color {
    let [r, g, b, a] = color.as_rgba_f32();
    Color::rgba(r * 0.5, g * 0.5, b * 0.5, a)
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_4;

    use super::*;
    use crate::plugins::{
        physics::obstacle::Aabb,
        portal::{geometry::orientation_from_normal, surface::PortalId},
        render::{
            device::{CompareFunction, StencilFunction},
            recorder::{CommandRecorder, RenderCommand},
            software::SoftwareTarget,
        },
    };

    fn room() -> RenderScene {
        let mut scene = RenderScene::default();
        let wall = Color::rgb(0.6, 0.6, 0.6);
        scene.push(Aabb::new(Vec3::new(-5., -0.5, -5.), Vec3::new(5., 0., 4.)), wall);
        scene.push(Aabb::new(Vec3::new(-5., 4., -5.), Vec3::new(5., 4.5, 4.)), wall);
        scene.push(Aabb::new(Vec3::new(-5., 0., -5.5), Vec3::new(5., 4., -5.)), wall);
        scene.push(
            Aabb::new(Vec3::new(-5., 0., 4.), Vec3::new(5., 4., 4.5)),
            Color::rgb(0.9, 0.2, 0.2),
        );
        scene.push(Aabb::new(Vec3::new(-5.5, 0., -5.), Vec3::new(-5., 4., 4.)), wall);
        scene.push(Aabb::new(Vec3::new(5., 0., -5.), Vec3::new(5.5, 4., 4.)), wall);
        scene
    }

    fn place(pair: &mut PortalPair, id: PortalId, center: Vec3) {
        let surface = pair.get_mut(id);
        surface.center = center;
        surface.orientation = orientation_from_normal(Vec3::Z, Vec3::Y);
        surface.is_placed = true;
    }

    fn camera() -> CameraState {
        CameraState {
            transform: Transform::from_xyz(0., 1.5, 3.).looking_at(Vec3::new(0., 1.5, -5.), Vec3::Y),
            fov: FRAC_PI_4,
            aspect_ratio: 160. / 120.,
            near: 0.1,
            far: 1000.,
        }
    }

    fn linked_pair(config: &PortalConfig) -> PortalPair {
        let mut pair = PortalPair::linked_pair(config);
        place(&mut pair, PortalId::A, Vec3::new(-2., 1.5, -4.99));
        place(&mut pair, PortalId::B, Vec3::new(2., 1.5, -4.99));
        pair
    }

    fn view_draw(target: &SoftwareTarget, id: PortalId) -> usize {
        target
            .draws()
            .iter()
            .position(|state| *state == PipelineState::stencil_view(id.stencil_ref()))
            .unwrap()
    }

    #[test]
    fn portal_views_stay_inside_their_own_mask() {
        let config = PortalConfig::default();
        let pair = linked_pair(&config);
        let scene = room();
        let meshes = PortalMeshes::new(&config);
        let camera = camera();
        let mut target = SoftwareTarget::new(160, 120);

        let cameras = StencilRenderPipeline::new(&config).render(
            &mut target,
            &PortalView {
                scene: &scene,
                camera: &camera,
                portals: &pair,
                meshes: &meshes,
            },
        );
        assert!(cameras.iter().all(Option::is_some));

        let view_a = view_draw(&target, PortalId::A);
        let view_b = view_draw(&target, PortalId::B);
        let tagged = |reference: u8| {
            target
                .stencil()
                .iter()
                .zip(target.writer())
                .filter(move |(s, _)| **s == reference)
                .map(|(_, w)| *w)
        };

        assert!(tagged(1).count() > 20);
        assert!(tagged(2).count() > 20);
        assert!(tagged(2).all(|w| w != Some(view_a)));
        assert!(tagged(1).all(|w| w != Some(view_b)));
        assert!(tagged(1).any(|w| w == Some(view_a)));
        assert!(tagged(2).any(|w| w == Some(view_b)));
        assert!(tagged(0).all(|w| w != Some(view_a) && w != Some(view_b)));
        assert_eq!(target.state(), PipelineState::default());
    }

    #[test]
    fn portal_depth_is_restored_after_its_view() {
        let config = PortalConfig::default();
        let pair = linked_pair(&config);
        let scene = room();
        let meshes = PortalMeshes::new(&config);
        let camera = camera();
        let mut target = SoftwareTarget::new(160, 120);
        StencilRenderPipeline::new(&config).render(
            &mut target,
            &PortalView {
                scene: &scene,
                camera: &camera,
                portals: &pair,
                meshes: &meshes,
            },
        );

        // Both portals face the camera head on, 7.99 units away.
        let clip = camera.view().projection * Vec4::new(0., 0., -7.99, 1.);
        let surface_depth = clip.z / clip.w * 0.5 + 0.5;
        let mut tagged = 0;
        for (depth, stencil) in target.depth().iter().zip(target.stencil()) {
            if *stencil != 0 {
                tagged += 1;
                assert!((depth - surface_depth).abs() < 1e-4);
            }
        }
        assert!(tagged > 0);
    }

    #[test]
    fn unlinked_portal_is_drawn_closed() {
        let config = PortalConfig::default();
        let mut pair = PortalPair::new(&config);
        place(&mut pair, PortalId::A, Vec3::new(-2., 1.5, -4.99));
        let scene = room();
        let meshes = PortalMeshes::new(&config);
        let camera = camera();
        let mut recorder = CommandRecorder::default();

        let cameras = StencilRenderPipeline::new(&config).render(
            &mut recorder,
            &PortalView {
                scene: &scene,
                camera: &camera,
                portals: &pair,
                meshes: &meshes,
            },
        );
        assert!(cameras.iter().all(Option::is_none));

        let commands = recorder.commands();
        let scene_draws = commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawScene { .. }))
            .count();
        assert_eq!(scene_draws, 1);
        let mesh_draws = commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawMesh { .. }))
            .count();
        assert_eq!(mesh_draws, 2);
        assert!(!commands.iter().any(|c| matches!(
            c,
            RenderCommand::SetStencilFunction(Some(StencilFunction {
                compare: CompareFunction::Equal,
                ..
            }))
        )));
        assert_eq!(recorder.state(), PipelineState::default());
    }

    #[test]
    fn recorded_frame_replays_identically() {
        let config = PortalConfig::default();
        let pair = linked_pair(&config);
        let scene = room();
        let meshes = PortalMeshes::new(&config);
        let camera = camera();
        let frame = PortalView {
            scene: &scene,
            camera: &camera,
            portals: &pair,
            meshes: &meshes,
        };
        let pipeline = StencilRenderPipeline::new(&config);

        let mut direct = SoftwareTarget::new(80, 60);
        pipeline.render(&mut direct, &frame);

        let mut recorder = CommandRecorder::default();
        pipeline.render(&mut recorder, &frame);
        let mut replayed = SoftwareTarget::new(80, 60);
        for command in recorder.commands() {
            command.replay(&mut replayed, &scene);
        }

        assert_eq!(direct.color(), replayed.color());
        assert_eq!(direct.stencil(), replayed.stencil());
    }
}
