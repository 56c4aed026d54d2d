//! End-to-end tracking against a rapier terrain world.
//!
//! Runs the full plugin stack headless with a fixed 50ms frame time.

use std::time::Duration;

use bevy::prelude::*;
use tracker_core::{
    CarDrive, DriveInput, PolicyConfig, PolicyFlags, TerrainStatus, TerrainTracker,
    TrackerCorePlugin, TrackerPhase,
};
use tracker_physics::{TerrainPhysicsPlugin, TerrainWorld};

fn app_with_terrain(terrain: TerrainWorld) -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.insert_resource(bevy::time::TimeUpdateStrategy::ManualDuration(
        Duration::from_millis(50),
    ));
    app.insert_resource(terrain);
    app.add_plugins(TerrainPhysicsPlugin);
    app.add_plugins(TrackerCorePlugin::<TerrainWorld>::default());
    app
}

/// Flat terrain slab whose top face is at y = 0.
fn flat_terrain(depth: f32) -> TerrainWorld {
    let mut terrain = TerrainWorld::new();
    terrain.insert_terrain_cuboid(
        Vec3::new(0.0, -depth / 2.0, 0.0),
        Vec3::new(100.0, depth / 2.0, 100.0),
    );
    terrain
}

fn driving_car(app: &mut App, position: Vec3, tracker: TerrainTracker) -> Entity {
    app.world_mut()
        .spawn((
            Transform::from_translation(position),
            CarDrive::default(),
            DriveInput {
                throttle: 1.0,
                steer: 0.0,
            },
            tracker,
        ))
        .id()
}

#[test]
fn test_car_drives_at_height_offset_over_obstacles() {
    let mut terrain = flat_terrain(2.0);
    // Sits across the car's path; only terrain may lift the car.
    terrain.insert_obstacle(Vec3::new(0.0, 0.5, -2.0), Vec3::new(2.0, 0.5, 1.0));

    let mut app = app_with_terrain(terrain);
    let car = driving_car(&mut app, Vec3::new(0.0, 6.0, 0.0), TerrainTracker::default());

    for _ in 0..40 {
        app.update();
    }

    let transform = app.world().get::<Transform>(car).unwrap();
    assert!(
        (transform.translation.y - 1.0).abs() < 1e-4,
        "car should ride one unit above terrain, got {}",
        transform.translation.y
    );
    assert!(transform.translation.z < -3.0, "car should have driven past the obstacle");

    let tracker = app.world().get::<TerrainTracker>(car).unwrap();
    assert_eq!(tracker.status(), TerrainStatus::Tracking);
    assert_eq!(tracker.phase(), TrackerPhase::Moving);
}

#[test]
fn test_buried_car_is_lifted_out_by_recovery() {
    let mut app = app_with_terrain(flat_terrain(10.0));
    let recovery_only = PolicyConfig::with_flags(PolicyFlags::new(false, false, true));
    let car = driving_car(
        &mut app,
        Vec3::new(0.0, -3.0, 0.0),
        TerrainTracker::new(recovery_only),
    );

    for _ in 0..30 {
        app.update();
    }

    let transform = app.world().get::<Transform>(car).unwrap();
    assert!(
        (transform.translation.y - 1.0).abs() < 1e-3,
        "car should be back on top of the slab, got {}",
        transform.translation.y
    );
    let tracker = app.world().get::<TerrainTracker>(car).unwrap();
    assert_ne!(tracker.phase(), TrackerPhase::Recovering);
}

#[test]
fn test_buried_car_holds_height_without_recovery() {
    let mut app = app_with_terrain(flat_terrain(10.0));
    let car = driving_car(&mut app, Vec3::new(0.0, -3.0, 0.0), TerrainTracker::default());

    for _ in 0..30 {
        app.update();
    }

    let transform = app.world().get::<Transform>(car).unwrap();
    assert!(transform.translation.z < -1.0, "car should have driven");
    assert_eq!(transform.translation.y, -3.0, "the slab underside is not ground");
    let tracker = app.world().get::<TerrainTracker>(car).unwrap();
    assert_eq!(tracker.status(), TerrainStatus::Lost);
}

#[test]
fn test_collision_pushes_car_away_from_terrain_wall() {
    let mut terrain = flat_terrain(2.0);
    // Wall face at z = -3.
    terrain.insert_terrain_cuboid(Vec3::new(0.0, 1.0, -4.0), Vec3::new(10.0, 3.0, 1.0));

    let mut app = app_with_terrain(terrain);
    let collision_only = PolicyConfig::with_flags(PolicyFlags::new(false, true, false));
    let car = app
        .world_mut()
        .spawn((
            Transform::from_xyz(0.0, 1.0, -2.5),
            TerrainTracker::new(collision_only),
        ))
        .id();
    app.update();

    app.world_mut()
        .get_mut::<Transform>(car)
        .unwrap()
        .translation
        .x += 0.01;
    app.update();

    let transform = app.world().get::<Transform>(car).unwrap();
    assert!(
        transform.translation.z > -2.0,
        "car should be pushed away from the wall, got z = {}",
        transform.translation.z
    );
    assert!((transform.translation.x - 0.01).abs() < 1e-4);

    let report = app
        .world()
        .get::<TerrainTracker>(car)
        .unwrap()
        .last_report()
        .copied()
        .unwrap();
    // Forward plus both forward diagonals reach the wall.
    assert_eq!(report.collision_hits, 3);
    assert!(report.displacement.is_some());
}
