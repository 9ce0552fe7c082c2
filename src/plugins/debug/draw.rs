use bevy::{math::Vec4Swizzles, prelude::*};
use bevy_prototype_debug_lines::DebugLines;

/// Near and far corners of a camera frustum in world space, for an OpenGL style projection.
pub fn frustum_corners(cam_transform: &Transform, clip_from_view: Mat4) -> [Vec3; 8] {
    let inv_viewprojection = (clip_from_view * cam_transform.compute_matrix().inverse()).inverse();
    [
        Vec4::new(-1., -1., -1., 1.),
        Vec4::new(1., -1., -1., 1.),
        Vec4::new(-1., 1., -1., 1.),
        Vec4::new(1., 1., -1., 1.),
        Vec4::new(-1., -1., 1., 1.),
        Vec4::new(1., -1., 1., 1.),
        Vec4::new(-1., 1., 1., 1.),
        Vec4::new(1., 1., 1., 1.),
    ]
    .map(|v| {
        let vh = inv_viewprojection * v;
        vh.xyz() / vh.w
    })
}

pub fn draw_camera_frustum(cam_transform: &Transform, clip_from_view: Mat4, lines: &mut DebugLines) {
    const NEAR_COLOR: Color = Color::BLACK;
    const FAR_COLOR: Color = Color::WHITE;

    let corners = frustum_corners(cam_transform, clip_from_view);

    // Depth lines
    for i in 0..4 {
        lines.line_gradient(corners[i], corners[i + 4], 0., NEAR_COLOR, FAR_COLOR);
    }
    // Near and far planes
    for (offset, color) in [(0, NEAR_COLOR), (4, FAR_COLOR)] {
        for (a, b) in [(0, 1), (0, 2), (1, 3), (2, 3)] {
            lines.line_colored(corners[offset + a], corners[offset + b], 0., color);
        }
    }
}
