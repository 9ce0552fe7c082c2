//! Minimal render device abstraction the portal pipeline is written against.

use std::ops::{Deref, DerefMut};

use bevy::prelude::*;
use bitflags::bitflags;

use super::mesh::{PortalMesh, RenderScene};

bitflags! {
    /// Buffers affected by a clear.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u8 {
        const COLOR = 1;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Equal,
    GreaterEqual,
    Greater,
    NotEqual,
    Always,
}

impl CompareFunction {
    /// Whether an incoming value passes against the stored one.
    pub fn passes<T: PartialOrd>(self, incoming: T, stored: T) -> bool {
        match self {
            CompareFunction::Never => false,
            CompareFunction::Less => incoming < stored,
            CompareFunction::LessEqual => incoming <= stored,
            CompareFunction::Equal => incoming == stored,
            CompareFunction::GreaterEqual => incoming >= stored,
            CompareFunction::Greater => incoming > stored,
            CompareFunction::NotEqual => incoming != stored,
            CompareFunction::Always => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilFunction {
    pub compare: CompareFunction,
    pub reference: u8,
    pub mask: u8,
}

impl StencilFunction {
    pub fn new(compare: CompareFunction, reference: u8) -> Self {
        StencilFunction {
            compare,
            reference,
            mask: 0xff,
        }
    }

    pub fn passes(&self, stored: u8) -> bool {
        self.compare
            .passes(self.reference & self.mask, stored & self.mask)
    }
}

/// What happens to the stencil value of a fragment passing both the stencil and depth tests.
/// Failing fragments always keep it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StencilOperation {
    Keep,
    Zero,
    Replace,
}

/// Depth a portal mask writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskDepth {
    /// Depth of the mesh itself.
    Surface,
    /// Far plane, punching a hole the portal view can be drawn into.
    Far,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    pub color_mask: [bool; 4],
    /// `None` disables the depth test.
    pub depth_test: Option<CompareFunction>,
    pub depth_write: bool,
    /// `None` disables the stencil test.
    pub stencil: Option<StencilFunction>,
    pub stencil_op: StencilOperation,
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState {
            color_mask: [true; 4],
            depth_test: Some(CompareFunction::Less),
            depth_write: true,
            stencil: None,
            stencil_op: StencilOperation::Keep,
        }
    }
}

impl PipelineState {
    /// Tag the visible part of a portal with `reference`, colour off.
    pub fn stencil_mask(reference: u8) -> Self {
        PipelineState {
            color_mask: [false; 4],
            stencil: Some(StencilFunction::new(CompareFunction::Always, reference)),
            stencil_op: StencilOperation::Replace,
            ..default()
        }
    }

    /// Draw only where the stencil holds `reference`.
    pub fn stencil_view(reference: u8) -> Self {
        PipelineState {
            stencil: Some(StencilFunction::new(CompareFunction::Equal, reference)),
            ..default()
        }
    }

    /// Overwrite depth inside the `reference` footprint, colour off.
    pub fn depth_patch(reference: u8) -> Self {
        PipelineState {
            color_mask: [false; 4],
            depth_test: Some(CompareFunction::Always),
            stencil: Some(StencilFunction::new(CompareFunction::Equal, reference)),
            ..default()
        }
    }

    pub fn borders() -> Self {
        PipelineState::default()
    }

    pub fn writes_color(&self) -> bool {
        self.color_mask.iter().any(|&c| c)
    }
}

/// Camera a scene draw is seen from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePass {
    /// The player's own camera.
    Main,
    /// A virtual camera looking through a portal.
    Portal,
}

/// View and projection matrices of a camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraView {
    pub view: Mat4,
    pub projection: Mat4,
}

impl CameraView {
    pub fn new(camera: &Transform, projection: Mat4) -> Self {
        CameraView {
            view: camera.compute_matrix().inverse(),
            projection,
        }
    }

    pub fn clip_from_world(&self) -> Mat4 {
        self.projection * self.view
    }
}

pub trait RenderDevice {
    fn clear(&mut self, flags: ClearFlags);
    fn set_stencil_function(&mut self, function: Option<StencilFunction>);
    fn set_stencil_operation(&mut self, operation: StencilOperation);
    fn set_depth_function(&mut self, function: Option<CompareFunction>);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_color_mask(&mut self, mask: [bool; 4]);
    fn state(&self) -> PipelineState;
    fn draw_scene(&mut self, scene: &RenderScene, camera: &CameraView, pass: ScenePass);
    fn draw_mesh(
        &mut self,
        mesh: &PortalMesh,
        model: &Mat4,
        color: Color,
        camera: &CameraView,
        depth: MaskDepth,
    );

    fn apply_state(&mut self, state: &PipelineState) {
        self.set_color_mask(state.color_mask);
        self.set_depth_function(state.depth_test);
        self.set_depth_write(state.depth_write);
        self.set_stencil_function(state.stencil);
        self.set_stencil_operation(state.stencil_op);
    }
}

/// Pipeline state held for the lifetime of the guard, the previous state comes back when it
/// is dropped.
pub struct ScopedState<'a, D: RenderDevice + ?Sized> {
    device: &'a mut D,
    saved: PipelineState,
}

impl<'a, D: RenderDevice + ?Sized> ScopedState<'a, D> {
    pub fn new(device: &'a mut D, state: PipelineState) -> Self {
        let saved = device.state();
        device.apply_state(&state);
        ScopedState { device, saved }
    }
}

impl<'a, D: RenderDevice + ?Sized> Deref for ScopedState<'a, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<'a, D: RenderDevice + ?Sized> DerefMut for ScopedState<'a, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<'a, D: RenderDevice + ?Sized> Drop for ScopedState<'a, D> {
    fn drop(&mut self) {
        self.device.apply_state(&self.saved);
    }
}
