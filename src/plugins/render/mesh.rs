//! CPU-side geometry fed to a [`RenderDevice`](super::device::RenderDevice).

use std::f32::consts::TAU;

use bevy::{
    prelude::*,
    render::{mesh::Indices, render_resource::PrimitiveTopology},
};

use super::device::ScenePass;
use crate::plugins::{physics::obstacle::Aabb, portal::surface::PortalConfig};

const ELLIPSE_SEGMENTS: usize = 48;
/// Outer edge of the border ring, relative to the aperture.
const BORDER_SCALE: f32 = 1.12;

/// Flat triangle mesh lying in the local XY plane, facing +Z.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalMesh {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl PortalMesh {
    /// Triangle fan covering an ellipse.
    pub fn ellipse(semi_axes: Vec2, segments: usize) -> Self {
        let segments = segments.max(3);
        let mut positions = Vec::with_capacity(segments + 1);
        positions.push(Vec3::ZERO);
        positions.extend(ellipse_points(semi_axes, segments));
        let triangles = (0..segments as u32)
            .map(|i| [0, i + 1, (i + 1) % segments as u32 + 1])
            .collect();
        PortalMesh {
            positions,
            triangles,
        }
    }

    /// Ring between the ellipse and the same ellipse scaled by `outer_scale`.
    pub fn ring(semi_axes: Vec2, outer_scale: f32, segments: usize) -> Self {
        let segments = segments.max(3);
        let mut positions: Vec<Vec3> = ellipse_points(semi_axes, segments).collect();
        positions.extend(ellipse_points(semi_axes * outer_scale, segments));
        let n = segments as u32;
        let triangles = (0..n)
            .flat_map(|i| {
                let j = (i + 1) % n;
                [[i, n + i, n + j], [i, n + j, j]]
            })
            .collect();
        PortalMesh {
            positions,
            triangles,
        }
    }

    pub fn world_triangles<'a>(&'a self, model: &'a Mat4) -> impl Iterator<Item = [Vec3; 3]> + 'a {
        self.triangles.iter().map(move |t| {
            t.map(|i| model.transform_point3(self.positions[i as usize]))
        })
    }
}

fn ellipse_points(semi_axes: Vec2, segments: usize) -> impl Iterator<Item = Vec3> {
    (0..segments).map(move |i| {
        let angle = TAU * i as f32 / segments as f32;
        Vec3::new(semi_axes.x * angle.cos(), semi_axes.y * angle.sin(), 0.)
    })
}

impl From<&PortalMesh> for Mesh {
    fn from(portal: &PortalMesh) -> Self {
        let positions: Vec<[f32; 3]> = portal.positions.iter().map(|p| p.to_array()).collect();
        let normals = vec![[0., 0., 1.]; positions.len()];
        let extent = portal
            .positions
            .iter()
            .fold(Vec2::splat(f32::EPSILON), |acc, p| acc.max(p.truncate().abs()));
        let uvs: Vec<[f32; 2]> = portal
            .positions
            .iter()
            .map(|p| {
                let uv = p.truncate() / extent * 0.5 + 0.5;
                [uv.x, 1. - uv.y]
            })
            .collect();
        let indices = portal.triangles.iter().flatten().copied().collect();

        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList);
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
        mesh.set_indices(Some(Indices::U32(indices)));
        mesh
    }
}

/// Aperture and border meshes shared by both portals.
#[derive(Debug, Clone, Resource)]
pub struct PortalMeshes {
    pub mask: PortalMesh,
    pub border: PortalMesh,
}

impl PortalMeshes {
    pub fn new(config: &PortalConfig) -> Self {
        let semi_axes = Vec2::new(config.radius * config.aspect_ratio, config.radius);
        PortalMeshes {
            mask: PortalMesh::ellipse(semi_axes, ELLIPSE_SEGMENTS),
            border: PortalMesh::ring(semi_axes, BORDER_SCALE, ELLIPSE_SEGMENTS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneBox {
    pub bounds: Aabb,
    pub color: Color,
    /// Body the main camera sits in. Only seen through portals.
    pub viewer: bool,
}

impl SceneBox {
    pub fn new(bounds: Aabb, color: Color) -> Self {
        SceneBox {
            bounds,
            color,
            viewer: false,
        }
    }

    pub fn visible_in(&self, pass: ScenePass) -> bool {
        !(self.viewer && pass == ScenePass::Main)
    }

    pub fn triangles(&self) -> [[Vec3; 3]; 12] {
        let (min, max) = (self.bounds.min, self.bounds.max);
        let corner = |i: usize| {
            Vec3::new(
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            )
        };
        // Faces as corner index quads: -x, +x, -y, +y, -z, +z.
        const FACES: [[usize; 4]; 6] = [
            [0, 4, 6, 2],
            [1, 3, 7, 5],
            [0, 1, 5, 4],
            [2, 6, 7, 3],
            [0, 2, 3, 1],
            [4, 5, 7, 6],
        ];
        let mut triangles = [[Vec3::ZERO; 3]; 12];
        for (face, quad) in FACES.iter().enumerate() {
            let [a, b, c, d] = quad.map(corner);
            triangles[face * 2] = [a, b, c];
            triangles[face * 2 + 1] = [a, c, d];
        }
        triangles
    }
}

/// Everything drawn by the main and virtual cameras. Portal surfaces are never part of it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderScene {
    pub boxes: Vec<SceneBox>,
}

impl RenderScene {
    pub fn push(&mut self, bounds: Aabb, color: Color) {
        self.boxes.push(SceneBox::new(bounds, color));
    }

    /// Add the box of the body carrying the main camera.
    pub fn push_viewer(&mut self, bounds: Aabb, color: Color) {
        self.boxes.push(SceneBox {
            viewer: true,
            ..SceneBox::new(bounds, color)
        });
    }

    pub fn visible_boxes(&self, pass: ScenePass) -> impl Iterator<Item = &SceneBox> {
        self.boxes.iter().filter(move |b| b.visible_in(pass))
    }
}
