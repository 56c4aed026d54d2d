//! Arcade car drive model.
//!
//! Moves a body along its forward axis with throttle/steer input. Vertical
//! placement is left entirely to the terrain tracker, which runs after it.
//!
//! - Throttle accelerates; releasing it decelerates to a stop without drifting
//!   backwards
//! - Steering builds up gradually toward the requested turn
//! - Speed is clamped to `±max_speed`

use bevy::prelude::*;

use crate::terrain_tracker::TerrainTrackerSet;

/// Plugin that adds the car drive system ahead of terrain tracking.
pub struct CarDrivePlugin;

impl Plugin for CarDrivePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Update, car_drive_system.before(TerrainTrackerSet::Toggles));
    }
}

/// Driver intent for one frame, each axis in [-1, 1].
///
/// Where it comes from (keyboard, replay, AI) is up to the host.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq)]
pub struct DriveInput {
    /// +1 forward, -1 reverse
    pub throttle: f32,
    /// +1 right, -1 left
    pub steer: f32,
}

/// Car motion settings and state.
#[derive(Component, Debug, Clone)]
pub struct CarDrive {
    /// Top speed in either direction (units/sec)
    pub max_speed: f32,
    /// Yaw rate at full steer (radians/sec)
    pub turn_rate: f32,
    /// How fast steering builds up (per second)
    pub steering_acceleration: f32,
    /// Throttle acceleration (units/sec^2)
    pub acceleration: f32,
    /// Coasting deceleration (units/sec^2)
    pub deceleration: f32,
    /// Current signed speed
    pub speed: f32,
    /// Current smoothed steer
    pub turn: f32,
}

impl Default for CarDrive {
    fn default() -> Self {
        Self {
            max_speed: 200.0,
            turn_rate: 60f32.to_radians(),
            steering_acceleration: 10.0,
            acceleration: 15.0,
            deceleration: 200.0,
            speed: 0.0,
            turn: 0.0,
        }
    }
}

/// Move `current` toward `target` by at most `max_delta`.
pub fn move_towards(current: f32, target: f32, max_delta: f32) -> f32 {
    if (target - current).abs() <= max_delta {
        target
    } else {
        current + (target - current).signum() * max_delta
    }
}

impl CarDrive {
    /// Advance speed and steering by `dt`.
    ///
    /// # Returns
    /// `(translation, turn)`: world-space offset along the current forward
    /// axis, and a local yaw rotation to post-multiply onto `rotation`.
    pub fn advance(&mut self, input: DriveInput, rotation: Quat, dt: f32) -> (Vec3, Quat) {
        let throttle = input.throttle.clamp(-1.0, 1.0);
        let steer = input.steer.clamp(-1.0, 1.0);

        self.turn = move_towards(self.turn, steer, self.steering_acceleration * dt);

        if throttle != 0.0 {
            self.speed += throttle * self.acceleration * dt;
        } else if self.speed > 0.0 {
            self.speed = (self.speed - self.deceleration * dt).max(0.0);
        } else if self.speed < 0.0 {
            self.speed = (self.speed + self.deceleration * dt).min(0.0);
        }
        self.speed = self.speed.clamp(-self.max_speed, self.max_speed);

        let forward = rotation * Vec3::NEG_Z;
        let translation = forward * self.speed * dt;
        // Positive steer turns right, which is a negative yaw about +Y.
        let turn = Quat::from_rotation_y(-self.turn * self.turn_rate * dt);
        (translation, turn)
    }
}

/// System that integrates drive input into the body transform.
pub fn car_drive_system(
    time: Res<Time>,
    mut cars: Query<(&mut CarDrive, &DriveInput, &mut Transform)>,
) {
    let dt = time.delta_secs();
    if dt <= 0.0 {
        return;
    }

    for (mut drive, input, mut transform) in cars.iter_mut() {
        let (translation, turn) = drive.advance(*input, transform.rotation, dt);
        transform.translation += translation;
        transform.rotation = (transform.rotation * turn).normalize();
    }
}
