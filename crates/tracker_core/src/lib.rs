//! Terrain-relative vehicle stabilization.
//!
//! This crate provides:
//! - A per-step stabilizer that clamps a body to uneven terrain
//! - Optional slope alignment, underground recovery and terrain push-back
//! - Mutually exclusive policy toggles with change notification
//! - JSON settings load/save
//! - A simple arcade car drive model for moving tracked bodies
//! - Bevy plugins wiring all of the above onto `Transform`s

use bevy::prelude::*;

pub mod drive;
pub mod policy;
pub mod probe;
pub mod settings;
pub mod stabilizer;
pub mod terrain_tracker;

pub use drive::{car_drive_system, move_towards, CarDrive, CarDrivePlugin, DriveInput};
pub use policy::{
    apply_toggle, PolicyChange, PolicyConfig, PolicyFlags, PolicyToggle, TrackerTuning,
};
pub use probe::{RayHit, SurfaceMask, TerrainProbe};
pub use settings::{load_settings, parse_settings, save_settings, SettingsError, SettingsResult};
pub use stabilizer::{
    align_rotation, collision_directions, detect_underground, integrate, push_back,
    resolve_collisions, sample_ground, BodyPose, ProbeSchedule, Stabilizer, StepReport,
    TerrainStatus, TickClock, TrackerPhase, VehicleState,
};
pub use terrain_tracker::{
    apply_policy_toggles, terrain_tracker_system, PolicyChanged, PolicyToggleRequest,
    TerrainTracker, TerrainTrackerPlugin, TerrainTrackerSet, TrackerDefaults,
};

/// Tracking plus driving for probe resource `P`.
pub struct TrackerCorePlugin<P> {
    defaults: PolicyConfig,
    _probe: std::marker::PhantomData<fn() -> P>,
}

impl<P> TrackerCorePlugin<P> {
    /// Use `defaults` for trackers spawned without their own policy.
    pub fn with_defaults(defaults: PolicyConfig) -> Self {
        Self {
            defaults,
            _probe: std::marker::PhantomData,
        }
    }
}

impl<P> Default for TrackerCorePlugin<P> {
    fn default() -> Self {
        Self::with_defaults(PolicyConfig::default())
    }
}

impl<P: TerrainProbe + Resource> Plugin for TrackerCorePlugin<P> {
    fn build(&self, app: &mut App) {
        app.add_plugins(TerrainTrackerPlugin::<P>::default())
            .add_plugins(CarDrivePlugin)
            .insert_resource(TrackerDefaults(self.defaults.clone()));
    }
}
