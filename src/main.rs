use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use rapier3d::prelude::nalgebra::DMatrix;
use tracker_core::{
    load_settings, CarDrive, DriveInput, PolicyChanged, PolicyConfig, PolicyToggle,
    PolicyToggleRequest, TerrainTracker, TerrainTrackerSet, TrackerCorePlugin,
};
use tracker_physics::{TerrainPhysicsPlugin, TerrainWorld};

/// Simulated seconds before the demo exits.
const RUN_SECONDS: f32 = 12.0;

fn main() {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(
        Duration::from_secs_f64(1.0 / 60.0),
    )))
    .add_plugins(LogPlugin {
        filter: "terrain_tracker=info,tracker_core=debug,tracker_physics=info".into(),
        level: bevy::log::Level::INFO,
        ..default()
    });

    let defaults = match std::env::args().nth(1) {
        Some(path) => match load_settings(&path) {
            Ok(config) => {
                info!("Loaded tracker settings from {}", path);
                config
            }
            Err(e) => {
                warn!("Failed to load settings from {}: {}; using defaults", path, e);
                PolicyConfig::default()
            }
        },
        None => PolicyConfig::default(),
    };

    // Terrain must exist before the physics plugin's startup check.
    app.insert_resource(build_terrain())
        .add_plugins(TerrainPhysicsPlugin)
        .add_plugins(TrackerCorePlugin::<TerrainWorld>::with_defaults(defaults))
        .init_resource::<DemoScript>()
        .add_systems(Startup, spawn_car)
        .add_systems(
            Update,
            (
                run_demo_script.before(TerrainTrackerSet::Toggles),
                (log_policy_changes, report_car).after(TerrainTrackerSet::Stabilize),
            ),
        )
        .run();
}

/// Rolling hills with a ridge of terrain boxes to bump into.
fn build_terrain() -> TerrainWorld {
    let mut terrain = TerrainWorld::new();

    let cells = 64;
    let heights = DMatrix::from_fn(cells + 1, cells + 1, |row, col| {
        let z = row as f32 * 0.2;
        let x = col as f32 * 0.2;
        x.sin() * z.cos() * 0.5 + 0.5
    });
    terrain.insert_terrain_heightfield(heights, Vec3::new(400.0, 6.0, 400.0), Vec3::ZERO);

    for i in 0..5 {
        terrain.insert_terrain_cuboid(
            Vec3::new(-6.0 + i as f32 * 3.0, 4.0, -60.0),
            Vec3::new(1.0, 4.0, 1.0),
        );
    }

    terrain
}

#[derive(Component)]
struct DemoCar;

fn spawn_car(mut commands: Commands) {
    commands.spawn((
        DemoCar,
        Transform::from_xyz(0.0, 20.0, 0.0),
        CarDrive {
            max_speed: 25.0,
            ..default()
        },
        DriveInput::default(),
        TerrainTracker::default(),
    ));
}

/// Timed driver input and policy toggles.
#[derive(Resource)]
struct DemoScript {
    toggles: Vec<(f32, PolicyToggle, bool)>,
    next_toggle: usize,
}

impl Default for DemoScript {
    fn default() -> Self {
        Self {
            toggles: vec![
                (2.0, PolicyToggle::AlignToSlope, true),
                (4.0, PolicyToggle::Collision, true),
                (8.0, PolicyToggle::Recovery, true),
            ],
            next_toggle: 0,
        }
    }
}

fn run_demo_script(
    time: Res<Time>,
    mut script: ResMut<DemoScript>,
    mut cars: Query<(Entity, &mut DriveInput), With<DemoCar>>,
    mut toggles: MessageWriter<PolicyToggleRequest>,
    mut exit: MessageWriter<AppExit>,
) {
    let t = time.elapsed_secs();
    if t >= RUN_SECONDS {
        exit.write(AppExit::Success);
        return;
    }

    let Ok((car, mut input)) = cars.single_mut() else {
        return;
    };

    input.throttle = if t < 10.0 { 1.0 } else { 0.0 };
    input.steer = if (6.0..7.0).contains(&t) { 0.6 } else { 0.0 };

    while let Some(&(at, toggle, enabled)) = script.toggles.get(script.next_toggle) {
        if t < at {
            break;
        }
        toggles.write(PolicyToggleRequest {
            entity: car,
            toggle,
            enabled,
        });
        script.next_toggle += 1;
    }
}

fn log_policy_changes(mut changes: MessageReader<PolicyChanged>) {
    for change in changes.read() {
        info!(
            "Policy for {:?}: slope={} collision={} recovery={}{}",
            change.entity,
            change.flags.align_to_slope(),
            change.flags.collision_enabled(),
            change.flags.recovery_enabled(),
            change
                .overridden
                .map(|t| format!(" ({:?} switched off)", t))
                .unwrap_or_default()
        );
    }
}

fn report_car(
    time: Res<Time>,
    mut last_report: Local<f32>,
    cars: Query<(&Transform, &TerrainTracker), With<DemoCar>>,
) {
    let t = time.elapsed_secs();
    if t - *last_report < 1.0 {
        return;
    }
    *last_report = t;

    for (transform, tracker) in cars.iter() {
        let p = transform.translation;
        info!(
            "t={:.1}s pos=({:.2}, {:.2}, {:.2}) up=({:.2}, {:.2}, {:.2}) {:?} {:?}",
            t,
            p.x,
            p.y,
            p.z,
            transform.up().x,
            transform.up().y,
            transform.up().z,
            tracker.phase(),
            tracker.status()
        );
    }
}
