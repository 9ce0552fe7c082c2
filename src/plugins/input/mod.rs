use bevy::{prelude::*, window::CursorGrabMode};
use iyes_loopless::prelude::*;
use leafwing_input_manager::{prelude::*, user_input::UserInput};

use super::game::GameState;

#[derive(Debug)]
pub struct InputPlugin;

impl Plugin for InputPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugin(InputManagerPlugin::<Actions>::default())
            .add_startup_system(toggle_on_start)
            .add_system(toggle_mouse_capture.run_in_state(GameState::Playing))
            .add_enter_system(GameState::Paused, release_cursor)
            .add_exit_system(GameState::Paused, capture_cursor);
    }
}

#[derive(Actionlike, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actions {
    Forward,
    Backwards,
    StrafeLeft,
    StrafeRight,
    Jump,
    Sprint,
    FirePortalA,
    FirePortalB,
    Grab,
}

pub fn default_input_map() -> InputMap<Actions> {
    InputMap::new([
        (UserInput::from(KeyCode::W), Actions::Forward),
        (UserInput::from(KeyCode::S), Actions::Backwards),
        (UserInput::from(KeyCode::A), Actions::StrafeLeft),
        (UserInput::from(KeyCode::D), Actions::StrafeRight),
        (UserInput::from(KeyCode::Space), Actions::Jump),
        (UserInput::from(KeyCode::LShift), Actions::Sprint),
        (UserInput::from(KeyCode::E), Actions::Grab),
        (UserInput::from(MouseButton::Left), Actions::FirePortalA),
        (UserInput::from(MouseButton::Right), Actions::FirePortalB),
    ])
}

fn set_cursor_captured(windows: &mut Windows, captured: bool) {
    if let Some(window) = windows.get_primary_mut() {
        window.set_cursor_visibility(!captured);
        window.set_cursor_grab_mode(if captured {
            CursorGrabMode::Locked
        } else {
            CursorGrabMode::None
        });
    }
}

fn toggle_on_start(mut windows: ResMut<Windows>) {
    set_cursor_captured(&mut windows, true);
}

fn capture_cursor(mut windows: ResMut<Windows>) {
    set_cursor_captured(&mut windows, true);
}

fn release_cursor(mut windows: ResMut<Windows>) {
    set_cursor_captured(&mut windows, false);
}

fn toggle_mouse_capture(mut windows: ResMut<Windows>, tab_input: Res<Input<KeyCode>>) {
    if tab_input.just_pressed(KeyCode::Tab) {
        let locked = windows
            .get_primary()
            .map_or(false, |window| window.cursor_grab_mode() != CursorGrabMode::None);
        set_cursor_captured(&mut windows, !locked);
    }
}
