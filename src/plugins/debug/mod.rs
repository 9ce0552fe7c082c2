//! Development helpers, only built with the `devel` feature.

use bevy::prelude::*;
use bevy_prototype_debug_lines::{DebugLines, DebugLinesPlugin};

pub mod draw;
pub mod dump;

use self::{draw::draw_camera_frustum, dump::dump_frame};
use super::render::recorder::PortalFrame;

/// Where F12 writes the portal frame.
const DUMP_PATH: &str = "portal_frame.png";
const DUMP_SIZE: UVec2 = UVec2::new(320, 180);
/// Frusta are drawn this deep, the real far plane is much further away.
const FRUSTUM_DEPTH: f32 = 2.;

#[derive(Debug)]
/// Development plugins intended for debug builds use.
pub struct DebugPlugin;

impl Plugin for DebugPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(DebugLinesPlugin::default())
            .add_system(draw_virtual_cameras)
            .add_system(dump_on_key);
    }
}

fn draw_virtual_cameras(frame: Res<PortalFrame>, mut lines: ResMut<DebugLines>) {
    for camera in frame.virtual_cameras.iter().flatten() {
        let mut projection = camera.projection;
        projection.far = FRUSTUM_DEPTH;
        draw_camera_frustum(&camera.transform, projection.clip_from_view(), &mut lines);
    }
}

fn dump_on_key(keys: Res<Input<KeyCode>>, frame: Res<PortalFrame>) {
    if !keys.just_pressed(KeyCode::F12) {
        return;
    }
    match dump_frame(&frame, DUMP_SIZE, DUMP_PATH) {
        Ok(()) => info!(
            "Dumped {} portal frame draws to {}",
            frame.draw_count(),
            DUMP_PATH
        ),
        Err(e) => error!("Portal frame dump failed: {}", e),
    }
}
