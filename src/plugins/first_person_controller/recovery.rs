//! Bringing the player back upright after coming out of a portal sideways or upside down.

use std::time::Duration;

use bevy::prelude::*;
use euclid::Angle;

use crate::plugins::portal::geometry::normalize_or;

pub fn ease_out_cubic(t: f32) -> f32 {
    let u = 1. - t.clamp(0., 1.);
    1. - u * u * u
}

/// Orientation interpolation, eased out, driven by the frame loop.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimateRoll {
    start: Quat,
    end: Quat,
    elapsed: Duration,
    duration: Duration,
}

impl AnimateRoll {
    pub fn new(start: Quat, end: Quat, duration: Duration) -> Self {
        AnimateRoll {
            start,
            end,
            elapsed: Duration::ZERO,
            duration,
        }
    }

    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            1.
        } else {
            (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.)
        }
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    /// Move the animation forward and return the orientation for this frame.
    pub fn advance(&mut self, dt: Duration) -> Quat {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.start
            .slerp(self.end, ease_out_cubic(self.progress()))
            .normalize()
    }
}

/// Same forward direction, with the up vector as close to world up as possible.
pub fn upright_orientation(orientation: Quat) -> Quat {
    let forward = orientation * Vec3::NEG_Z;
    // Looking straight up or down, keep the current right vector instead.
    let current_right = orientation * Vec3::X;
    let fallback = normalize_or(Vec3::new(current_right.x, 0., current_right.z), Vec3::X);
    let right = normalize_or(forward.cross(Vec3::Y), fallback);
    let forward = normalize_or(forward - right * forward.dot(right), Vec3::NEG_Z);
    let up = right.cross(forward);
    Quat::from_mat3(&Mat3::from_cols(right, up, -forward)).normalize()
}

/// Signed angle, around the forward axis, from the upright up vector to the current one.
pub fn roll_angle(orientation: Quat) -> Angle<f32> {
    let forward = orientation * Vec3::NEG_Z;
    let up = orientation * Vec3::Y;
    let target = Vec3::Y - forward * forward.dot(Vec3::Y);
    if target.length_squared() < 1e-6 {
        return Angle::zero();
    }
    let target = target.normalize();
    // Angle that takes `target` to `up` around the forward axis.
    Angle::radians(target.cross(up).dot(forward).atan2(target.dot(up)))
}

/// Part of `roll` the body sheds this frame, decaying exponentially.
pub fn damp_roll(roll: Angle<f32>, dt: f32, damping: f32) -> Angle<f32> {
    roll * (1. - (-damping * dt).exp())
}

/// Bound a roll correction so the camera never levels faster than `max_rate`.
pub fn limit_roll_rate(step: Angle<f32>, dt: f32, max_rate: Angle<f32>) -> Angle<f32> {
    let max_step = max_rate.radians.abs() * dt;
    Angle::radians(step.radians.clamp(-max_step, max_step))
}

/// Rotate about the forward axis toward upright.
///
/// The camera carries the body orientation, so the damped body roll and the camera levelling
/// are one rotation: the damped step is what gets rate limited.
pub fn recover_roll(orientation: Quat, dt: f32, max_rate: Angle<f32>, damping: f32) -> Quat {
    let roll = roll_angle(orientation);
    if roll.radians.abs() < 1e-5 {
        return orientation;
    }
    let step = limit_roll_rate(damp_roll(roll, dt, damping), dt, max_rate);
    let forward = orientation * Vec3::NEG_Z;
    (Quat::from_axis_angle(forward, -step.radians) * orientation).normalize()
}
