//! Device-agnostic recording of a portal frame.

use bevy::prelude::*;

use super::{
    device::{
        CameraView, ClearFlags, CompareFunction, MaskDepth, PipelineState, RenderDevice,
        ScenePass, StencilFunction, StencilOperation,
    },
    mesh::{PortalMesh, RenderScene},
};
use crate::plugins::portal::camera_projection::VirtualCamera;

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Clear(ClearFlags),
    SetStencilFunction(Option<StencilFunction>),
    SetStencilOperation(StencilOperation),
    SetDepthFunction(Option<CompareFunction>),
    SetDepthWrite(bool),
    SetColorMask([bool; 4]),
    DrawScene {
        camera: CameraView,
        pass: ScenePass,
    },
    DrawMesh {
        mesh: PortalMesh,
        model: Mat4,
        color: Color,
        camera: CameraView,
        depth: MaskDepth,
    },
}

impl RenderCommand {
    /// Draw scene commands use the scene the commands were recorded against.
    pub fn replay<D: RenderDevice + ?Sized>(&self, device: &mut D, scene: &RenderScene) {
        match self {
            RenderCommand::Clear(flags) => device.clear(*flags),
            RenderCommand::SetStencilFunction(function) => device.set_stencil_function(*function),
            RenderCommand::SetStencilOperation(op) => device.set_stencil_operation(*op),
            RenderCommand::SetDepthFunction(function) => device.set_depth_function(*function),
            RenderCommand::SetDepthWrite(enabled) => device.set_depth_write(*enabled),
            RenderCommand::SetColorMask(mask) => device.set_color_mask(*mask),
            RenderCommand::DrawScene { camera, pass } => device.draw_scene(scene, camera, *pass),
            RenderCommand::DrawMesh {
                mesh,
                model,
                color,
                camera,
                depth,
            } => device.draw_mesh(mesh, model, *color, camera, *depth),
        }
    }

    pub fn is_draw(&self) -> bool {
        matches!(
            self,
            RenderCommand::DrawScene { .. } | RenderCommand::DrawMesh { .. }
        )
    }
}

/// Records every call instead of executing it, tracking pipeline state on the way.
#[derive(Debug, Clone, Default)]
pub struct CommandRecorder {
    state: PipelineState,
    commands: Vec<RenderCommand>,
}

impl CommandRecorder {
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<RenderCommand> {
        self.commands
    }
}

impl RenderDevice for CommandRecorder {
    fn clear(&mut self, flags: ClearFlags) {
        self.commands.push(RenderCommand::Clear(flags));
    }

    fn set_stencil_function(&mut self, function: Option<StencilFunction>) {
        self.state.stencil = function;
        self.commands
            .push(RenderCommand::SetStencilFunction(function));
    }

    fn set_stencil_operation(&mut self, operation: StencilOperation) {
        self.state.stencil_op = operation;
        self.commands
            .push(RenderCommand::SetStencilOperation(operation));
    }

    fn set_depth_function(&mut self, function: Option<CompareFunction>) {
        self.state.depth_test = function;
        self.commands.push(RenderCommand::SetDepthFunction(function));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.state.depth_write = enabled;
        self.commands.push(RenderCommand::SetDepthWrite(enabled));
    }

    fn set_color_mask(&mut self, mask: [bool; 4]) {
        self.state.color_mask = mask;
        self.commands.push(RenderCommand::SetColorMask(mask));
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn draw_scene(&mut self, _scene: &RenderScene, camera: &CameraView, pass: ScenePass) {
        self.commands.push(RenderCommand::DrawScene {
            camera: *camera,
            pass,
        });
    }

    fn draw_mesh(
        &mut self,
        mesh: &PortalMesh,
        model: &Mat4,
        color: Color,
        camera: &CameraView,
        depth: MaskDepth,
    ) {
        self.commands.push(RenderCommand::DrawMesh {
            mesh: mesh.clone(),
            model: *model,
            color,
            camera: *camera,
            depth,
        });
    }
}

/// Last recorded portal frame.
#[derive(Debug, Default, Resource)]
pub struct PortalFrame {
    pub scene: RenderScene,
    pub commands: Vec<RenderCommand>,
    pub virtual_cameras: [Option<VirtualCamera>; 2],
}

impl PortalFrame {
    pub fn replay<D: RenderDevice + ?Sized>(&self, device: &mut D) {
        for command in &self.commands {
            command.replay(device, &self.scene);
        }
    }

    pub fn draw_count(&self) -> usize {
        self.commands.iter().filter(|c| c.is_draw()).count()
    }
}
