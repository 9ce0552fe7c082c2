use std::f32::consts::FRAC_PI_4;

use bevy::{
    prelude::*,
    render::camera::CameraProjection,
};

use super::{
    geometry::portal_to_portal,
    surface::{PortalConfig, PortalSurface},
};
use crate::plugins::render::device::CameraView;

/// Perspective projection with an optional oblique near plane, used by the portal virtual
/// cameras.
#[derive(Debug, Component, Clone, Copy, PartialEq, Reflect)]
#[reflect(Component)]
pub struct PortalCameraProjection {
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
    /// Near clipping plane in view space. Points with a positive distance are kept.
    #[reflect(ignore)]
    pub clip_plane: Option<Vec4>,
}

impl Default for PortalCameraProjection {
    fn default() -> Self {
        PortalCameraProjection {
            fov: FRAC_PI_4,
            aspect_ratio: 16. / 9.,
            near: 0.1,
            far: 1000.,
            clip_plane: None,
        }
    }
}

impl PortalCameraProjection {
    /// OpenGL style clip space, depth in [-1, 1]. Used by the software renderer.
    pub fn clip_from_view(&self) -> Mat4 {
        let proj_mat = Mat4::perspective_rh_gl(self.fov, self.aspect_ratio, self.near, self.far);
        match self.clip_plane {
            Some(plane) => oblique_projection(proj_mat, plane),
            None => proj_mat,
        }
    }
}

/// Bevy renders with reversed depth in [0, 1], near plane at 1.
impl CameraProjection for PortalCameraProjection {
    fn get_projection_matrix(&self) -> Mat4 {
        reverse_depth(self.clip_from_view())
    }

    fn update(&mut self, width: f32, height: f32) {
        self.aspect_ratio = width / height;
    }

    fn far(&self) -> f32 {
        self.far
    }
}

/// Replace the near plane of `proj_mat` with `clip_plane`, given in view space.
///
/// Math taken from https://www.terathon.com/lengyel/Lengyel-Oblique.pdf
pub fn oblique_projection(proj_mat: Mat4, clip_plane: Vec4) -> Mat4 {
    let c = clip_plane;
    // Frustum corner opposite to the plane, in view space.
    let q = proj_mat.inverse() * Vec4::new(c.x.signum(), c.y.signum(), 1., 1.);
    let denom = c.dot(q);
    if denom.abs() < 1e-6 || !denom.is_finite() {
        return proj_mat;
    }

    let m4 = proj_mat.row(3);
    let s = 2. * m4.dot(q) / denom;
    let new_m3 = c * s - m4;
    let mut oblique_proj_mat = proj_mat;
    oblique_proj_mat.x_axis.z = new_m3.x;
    oblique_proj_mat.y_axis.z = new_m3.y;
    oblique_proj_mat.z_axis.z = new_m3.z;
    oblique_proj_mat.w_axis.z = new_m3.w;
    oblique_proj_mat
}

/// Remap the depth of an OpenGL style projection to the reversed [0, 1] range, so that an
/// oblique near plane stays the near plane.
pub fn reverse_depth(proj_mat: Mat4) -> Mat4 {
    let remap = Mat4::from_cols(
        Vec4::X,
        Vec4::Y,
        Vec4::new(0., 0., -0.5, 0.),
        Vec4::new(0., 0., 0.5, 1.),
    );
    remap * proj_mat
}

/// Express a world space plane in the view space of a camera, oriented so the camera sits on
/// its negative side.
pub fn view_space_plane(camera: &Transform, world_plane: Vec4) -> Vec4 {
    // Inverse transpose of the view matrix = inverse inverse transpose of camera matrix = transpose
    let plane = camera.compute_matrix().transpose() * world_plane;
    if plane.w > 0. {
        -plane
    } else {
        plane
    }
}

pub fn apply_oblique_clipping(proj_mat: Mat4, camera: &Transform, world_plane: Vec4) -> Mat4 {
    oblique_projection(proj_mat, view_space_plane(camera, world_plane))
}

/// Snapshot of the player camera for one frame.
#[derive(Debug, Clone, Copy)]
pub struct CameraState {
    pub transform: Transform,
    pub fov: f32,
    pub aspect_ratio: f32,
    pub near: f32,
    pub far: f32,
}

impl CameraState {
    pub fn projection(&self) -> PortalCameraProjection {
        PortalCameraProjection {
            fov: self.fov,
            aspect_ratio: self.aspect_ratio,
            near: self.near,
            far: self.far,
            clip_plane: None,
        }
    }

    pub fn view(&self) -> CameraView {
        CameraView::new(&self.transform, self.projection().clip_from_view())
    }
}

/// Camera standing behind the exit portal, seeing what the player would see through the entry.
#[derive(Debug, Clone, Copy)]
pub struct VirtualCamera {
    pub transform: Transform,
    pub projection: PortalCameraProjection,
}

impl VirtualCamera {
    pub fn view(&self) -> CameraView {
        CameraView::new(&self.transform, self.projection.clip_from_view())
    }
}

pub fn compute_virtual_camera(
    main: &CameraState,
    entry: &PortalSurface,
    exit: &PortalSurface,
    config: &PortalConfig,
) -> VirtualCamera {
    let teleport = portal_to_portal(entry, exit, config.vertical_threshold);
    let mut transform = teleport * main.transform;
    transform.rotation = transform.rotation.normalize();
    transform.scale = Vec3::ONE;

    // Nothing between the virtual camera and the exit portal may be drawn.
    let normal = exit.normal();
    let origin = exit.center + normal * config.clip_plane_offset;
    let world_plane = normal.extend(-normal.dot(origin));

    VirtualCamera {
        transform,
        projection: PortalCameraProjection {
            near: config.virtual_near,
            clip_plane: Some(view_space_plane(&transform, world_plane)),
            ..main.projection()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::portal::{
        geometry::orientation_from_normal,
        surface::PortalId,
    };

    fn ndc_depth(proj: Mat4, view_point: Vec3) -> f32 {
        let clip = proj * view_point.extend(1.);
        clip.z / clip.w
    }

    #[test]
    fn plane_becomes_near_plane() {
        let proj = Mat4::perspective_rh_gl(FRAC_PI_4, 16. / 9., 0.1, 100.);
        // Keep everything farther than 2 units, seen from a camera at the origin.
        let camera = Transform::IDENTITY;
        let world_plane = Vec4::new(0., 0., 1., 2.);
        let oblique = apply_oblique_clipping(proj, &camera, world_plane);

        assert!((ndc_depth(oblique, Vec3::new(0., 0., -2.)) + 1.).abs() < 1e-4);
        assert!((ndc_depth(oblique, Vec3::new(0.5, -0.3, -2.)) + 1.).abs() < 1e-4);
        let beyond = ndc_depth(oblique, Vec3::new(0.2, 0.1, -5.));
        assert!(beyond > -1. && beyond < 1.);
        assert!(ndc_depth(oblique, Vec3::new(0., 0., -1.)) < -1.);
    }

    #[test]
    fn tilted_plane_clips_obliquely() {
        let proj = Mat4::perspective_rh_gl(FRAC_PI_4, 1., 0.1, 100.);
        let camera = Transform::from_xyz(1., 2., 3.).looking_at(Vec3::new(1., 2., -10.), Vec3::Y);
        let normal = Vec3::new(0.3, 0., -1.).normalize();
        let origin = Vec3::new(1., 2., 0.);
        let world_plane = normal.extend(-normal.dot(origin));
        let oblique = apply_oblique_clipping(proj, &camera, world_plane);
        let view = camera.compute_matrix().inverse();

        let on_plane = origin + normal.cross(Vec3::Y) * 0.4;
        let depth = ndc_depth(oblique, view.transform_point3(on_plane));
        assert!((depth + 1.).abs() < 1e-3);
        let kept = origin + normal * 2.;
        assert!(ndc_depth(oblique, view.transform_point3(kept)) > -1.);
    }

    #[test]
    fn bevy_projection_uses_reversed_depth() {
        let camera = Transform::IDENTITY;
        let projection = PortalCameraProjection {
            near: 0.1,
            far: 100.,
            clip_plane: Some(view_space_plane(&camera, Vec4::new(0., 0., 1., 2.))),
            ..default()
        };
        let proj = projection.get_projection_matrix();
        // The oblique plane at z = -2 is the near plane, depth falls off behind it.
        assert!((ndc_depth(proj, Vec3::new(0.3, 0.2, -2.)) - 1.).abs() < 1e-4);
        let mid = ndc_depth(proj, Vec3::new(0., 0., -10.));
        assert!(mid > 0. && mid < 1.);
        assert!(ndc_depth(proj, Vec3::new(0., 0., -20.)) < mid);
        assert!(ndc_depth(proj, Vec3::new(0., 0., -1.)) > 1.);
        // Screen position is left alone.
        let gl = projection.clip_from_view() * Vec4::new(0.4, -0.2, -5., 1.);
        let rev = proj * Vec4::new(0.4, -0.2, -5., 1.);
        assert!((gl.truncate().truncate() / gl.w).abs_diff_eq(rev.truncate().truncate() / rev.w, 1e-5));
    }

    #[test]
    fn degenerate_plane_keeps_projection() {
        let proj = Mat4::perspective_rh_gl(FRAC_PI_4, 1., 0.1, 100.);
        assert_eq!(oblique_projection(proj, Vec4::ZERO), proj);
    }

    #[test]
    fn virtual_camera_sits_behind_exit() {
        let config = PortalConfig::default();
        let mut entry = PortalSurface::new(PortalId::A, 1., 0.6);
        entry.center = Vec3::new(0., 1.5, -6.);
        entry.orientation = orientation_from_normal(Vec3::Z, Vec3::Y);
        entry.is_placed = true;
        let mut exit = PortalSurface::new(PortalId::B, 1., 0.6);
        exit.center = Vec3::new(6., 1.5, 0.);
        exit.orientation = orientation_from_normal(Vec3::NEG_X, Vec3::Y);
        exit.is_placed = true;

        let main = CameraState {
            transform: Transform::from_xyz(0., 1.5, -3.).looking_at(entry.center, Vec3::Y),
            fov: FRAC_PI_4,
            aspect_ratio: 16. / 9.,
            near: 0.1,
            far: 1000.,
        };
        let virtual_camera = compute_virtual_camera(&main, &entry, &exit, &config);

        assert!(virtual_camera
            .transform
            .translation
            .abs_diff_eq(Vec3::new(9., 1.5, 0.), 1e-4));
        assert!(virtual_camera
            .transform
            .forward()
            .abs_diff_eq(Vec3::NEG_X, 1e-4));
        assert_eq!(virtual_camera.transform.scale, Vec3::ONE);
        assert_eq!(virtual_camera.projection.near, config.virtual_near);
        assert_eq!(virtual_camera.projection.fov, main.fov);

        // Geometry just in front of the exit is visible, the wall behind it is not.
        let view = virtual_camera.view();
        let front = view.clip_from_world() * Vec3::new(5.5, 1.5, 0.).extend(1.);
        assert!(front.z / front.w > -1.);
        let behind = view.clip_from_world() * Vec3::new(6.5, 1.5, 0.).extend(1.);
        assert!(behind.z / behind.w < -1.);
    }
}
