//! CPU rasterizer implementing [`RenderDevice`], used for frame dumps and to check the stencil
//! pipeline without a GPU.

use bevy::prelude::*;

use super::{
    device::{
        CameraView, ClearFlags, CompareFunction, MaskDepth, PipelineState, RenderDevice,
        ScenePass, StencilFunction, StencilOperation,
    },
    mesh::{PortalMesh, RenderScene},
};

/// Smallest clip space w a vertex may keep after clipping.
const W_EPSILON: f32 = 1e-5;

pub struct SoftwareTarget {
    width: u32,
    height: u32,
    pub clear_color: Color,
    color: Vec<[u8; 4]>,
    depth: Vec<f32>,
    stencil: Vec<u8>,
    /// Index of the draw call that last wrote the colour of each pixel.
    writer: Vec<Option<usize>>,
    state: PipelineState,
    /// Pipeline state in effect for every draw call, in order.
    draws: Vec<PipelineState>,
}

impl SoftwareTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let len = (width * height) as usize;
        SoftwareTarget {
            width,
            height,
            clear_color: Color::BLACK,
            color: vec![[0, 0, 0, 255]; len],
            depth: vec![1.; len],
            stencil: vec![0; len],
            writer: vec![None; len],
            state: PipelineState::default(),
            draws: Vec::new(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color(&self) -> &[[u8; 4]] {
        &self.color
    }

    pub fn depth(&self) -> &[f32] {
        &self.depth
    }

    pub fn stencil(&self) -> &[u8] {
        &self.stencil
    }

    pub fn writer(&self) -> &[Option<usize>] {
        &self.writer
    }

    pub fn draws(&self) -> &[PipelineState] {
        &self.draws
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.color[(y * self.width + x) as usize]
    }

    fn begin_draw(&mut self) -> usize {
        self.draws.push(self.state);
        self.draws.len() - 1
    }

    fn rasterize(
        &mut self,
        triangle: [Vec3; 3],
        clip_from_world: &Mat4,
        color: [u8; 4],
        depth: MaskDepth,
        draw: usize,
    ) {
        let clip = triangle.map(|p| *clip_from_world * p.extend(1.));
        // Near plane first, then anything left behind the eye.
        let polygon = clip_polygon(&clip, |v| v.z + v.w);
        let polygon = clip_polygon(&polygon, |v| v.w - W_EPSILON);
        if polygon.len() < 3 {
            return;
        }
        let screen: Vec<Vec3> = polygon.iter().map(|v| self.to_screen(*v)).collect();
        for i in 1..screen.len() - 1 {
            self.fill([screen[0], screen[i], screen[i + 1]], color, depth, draw);
        }
    }

    /// Pixel coordinates plus depth in [0, 1].
    fn to_screen(&self, clip: Vec4) -> Vec3 {
        let ndc = clip.truncate() / clip.w;
        Vec3::new(
            (ndc.x * 0.5 + 0.5) * self.width as f32,
            (0.5 - ndc.y * 0.5) * self.height as f32,
            ndc.z * 0.5 + 0.5,
        )
    }

    fn fill(&mut self, [a, b, c]: [Vec3; 3], color: [u8; 4], depth: MaskDepth, draw: usize) {
        let area = edge(a, b, c);
        if area.abs() < f32::EPSILON {
            return;
        }
        let min = a.min(b).min(c);
        let max = a.max(b).max(c);
        let x0 = min.x.floor().max(0.) as u32;
        let y0 = min.y.floor().max(0.) as u32;
        let x1 = (max.x.ceil().max(0.) as u32).min(self.width);
        let y1 = (max.y.ceil().max(0.) as u32).min(self.height);

        for y in y0..y1 {
            for x in x0..x1 {
                let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.);
                let w0 = edge(b, c, p) / area;
                let w1 = edge(c, a, p) / area;
                let w2 = edge(a, b, p) / area;
                if w0 < 0. || w1 < 0. || w2 < 0. {
                    continue;
                }
                let z = w0 * a.z + w1 * b.z + w2 * c.z;
                if !(0. ..=1.).contains(&z) {
                    continue;
                }
                self.fragment((y * self.width + x) as usize, z, color, depth, draw);
            }
        }
    }

    fn fragment(&mut self, index: usize, z: f32, color: [u8; 4], depth: MaskDepth, draw: usize) {
        let state = self.state;
        if let Some(stencil) = state.stencil {
            if !stencil.passes(self.stencil[index]) {
                return;
            }
        }
        if let Some(compare) = state.depth_test {
            if !compare.passes(z, self.depth[index]) {
                return;
            }
        }
        if let Some(stencil) = state.stencil {
            match state.stencil_op {
                StencilOperation::Keep => {}
                StencilOperation::Zero => self.stencil[index] = 0,
                StencilOperation::Replace => self.stencil[index] = stencil.reference,
            }
        }
        if state.depth_write {
            self.depth[index] = match depth {
                MaskDepth::Surface => z,
                MaskDepth::Far => 1.,
            };
        }
        if state.writes_color() {
            let pixel = &mut self.color[index];
            for (channel, value) in color.iter().enumerate() {
                if state.color_mask[channel] {
                    pixel[channel] = *value;
                }
            }
            self.writer[index] = Some(draw);
        }
    }
}

fn edge(a: Vec3, b: Vec3, p: Vec3) -> f32 {
    (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x)
}

/// Sutherland-Hodgman against the half space `distance(v) >= 0`.
fn clip_polygon(polygon: &[Vec4], distance: impl Fn(Vec4) -> f32) -> Vec<Vec4> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, &current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let (dc, dn) = (distance(current), distance(next));
        if dc >= 0. {
            out.push(current);
        }
        if (dc >= 0.) != (dn >= 0.) {
            out.push(current.lerp(next, dc / (dc - dn)));
        }
    }
    out
}

fn to_rgba8(color: Color) -> [u8; 4] {
    color.as_rgba_f32().map(|c| (c.clamp(0., 1.) * 255.).round() as u8)
}

impl RenderDevice for SoftwareTarget {
    fn clear(&mut self, flags: ClearFlags) {
        if flags.contains(ClearFlags::COLOR) {
            self.color.fill(to_rgba8(self.clear_color));
            self.writer.fill(None);
        }
        if flags.contains(ClearFlags::DEPTH) {
            self.depth.fill(1.);
        }
        if flags.contains(ClearFlags::STENCIL) {
            self.stencil.fill(0);
        }
    }

    fn set_stencil_function(&mut self, function: Option<StencilFunction>) {
        self.state.stencil = function;
    }

    fn set_stencil_operation(&mut self, operation: StencilOperation) {
        self.state.stencil_op = operation;
    }

    fn set_depth_function(&mut self, function: Option<CompareFunction>) {
        self.state.depth_test = function;
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.state.depth_write = enabled;
    }

    fn set_color_mask(&mut self, mask: [bool; 4]) {
        self.state.color_mask = mask;
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn draw_scene(&mut self, scene: &RenderScene, camera: &CameraView, pass: ScenePass) {
        let draw = self.begin_draw();
        let clip_from_world = camera.clip_from_world();
        for scene_box in scene.visible_boxes(pass) {
            let color = to_rgba8(scene_box.color);
            for triangle in scene_box.triangles() {
                self.rasterize(triangle, &clip_from_world, color, MaskDepth::Surface, draw);
            }
        }
    }

    fn draw_mesh(
        &mut self,
        mesh: &PortalMesh,
        model: &Mat4,
        color: Color,
        camera: &CameraView,
        depth: MaskDepth,
    ) {
        let draw = self.begin_draw();
        let clip_from_world = camera.clip_from_world();
        let color = to_rgba8(color);
        for triangle in mesh.world_triangles(model) {
            self.rasterize(triangle, &clip_from_world, color, depth, draw);
        }
    }
}
