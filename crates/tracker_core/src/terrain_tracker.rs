//! Bevy integration for the terrain stabilizer.
//!
//! Add [`TerrainTrackerPlugin`] with the resource type that answers terrain ray
//! queries, then put a [`TerrainTracker`] on any entity with a `Transform`:
//!
//! ```ignore
//! App::new()
//!     .add_plugins(TerrainTrackerPlugin::<TerrainWorld>::default())
//!     .add_systems(Startup, |mut commands: Commands| {
//!         commands.spawn((Transform::default(), TerrainTracker::default()));
//!     });
//! ```
//!
//! Policy toggles arrive as [`PolicyToggleRequest`] messages. Every change to
//! the effective policy is announced with a [`PolicyChanged`] message carrying
//! all three switches, so a display can re-sync after an exclusivity override.

use std::marker::PhantomData;

use bevy::prelude::*;

use crate::policy::{PolicyChange, PolicyConfig, PolicyFlags, PolicyToggle};
use crate::probe::TerrainProbe;
use crate::stabilizer::{
    BodyPose, Stabilizer, StepReport, TerrainStatus, TickClock, TrackerPhase,
};

/// Ordering for the tracker systems inside `Update`.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerrainTrackerSet {
    /// Apply pending policy toggles
    Toggles,
    /// Run the stabilizer on every tracked body
    Stabilize,
}

/// Plugin that runs terrain tracking against the probe resource `P`.
pub struct TerrainTrackerPlugin<P> {
    _probe: PhantomData<fn() -> P>,
}

impl<P> Default for TerrainTrackerPlugin<P> {
    fn default() -> Self {
        Self {
            _probe: PhantomData,
        }
    }
}

impl<P: TerrainProbe + Resource> Plugin for TerrainTrackerPlugin<P> {
    fn build(&self, app: &mut App) {
        app.init_resource::<TrackerDefaults>()
            .add_message::<PolicyToggleRequest>()
            .add_message::<PolicyChanged>()
            .configure_sets(
                Update,
                (TerrainTrackerSet::Toggles, TerrainTrackerSet::Stabilize).chain(),
            )
            .add_systems(
                Update,
                (
                    apply_policy_toggles.in_set(TerrainTrackerSet::Toggles),
                    terrain_tracker_system::<P>.in_set(TerrainTrackerSet::Stabilize),
                ),
            );
    }
}

/// Policy given to trackers spawned without their own.
#[derive(Resource, Debug, Clone, Default)]
pub struct TrackerDefaults(pub PolicyConfig);

/// User request to flip one policy switch on one tracked entity.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyToggleRequest {
    pub entity: Entity,
    pub toggle: PolicyToggle,
    pub enabled: bool,
}

/// Effective policy after a toggle changed it.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyChanged {
    pub entity: Entity,
    pub flags: PolicyFlags,
    /// Switch that was forced off to keep collision and recovery exclusive
    pub overridden: Option<PolicyToggle>,
}

/// Component that keeps an entity clamped to terrain.
///
/// The stabilizer is created from the entity's transform on the first frame
/// the probe resource is available.
#[derive(Component, Debug, Clone, Default)]
pub struct TerrainTracker {
    policy: Option<PolicyConfig>,
    stabilizer: Option<Stabilizer>,
    last_report: Option<StepReport>,
}

impl TerrainTracker {
    /// Tracker with its own policy instead of [`TrackerDefaults`].
    pub fn new(policy: PolicyConfig) -> Self {
        Self {
            policy: Some(policy),
            ..Default::default()
        }
    }

    pub fn is_attached(&self) -> bool {
        self.stabilizer.is_some()
    }

    pub fn stabilizer(&self) -> Option<&Stabilizer> {
        self.stabilizer.as_ref()
    }

    /// Report from the most recent step, if any step has run.
    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    /// Effective switches; `None` if the tracker is still using the defaults.
    pub fn flags(&self) -> Option<PolicyFlags> {
        match (&self.stabilizer, &self.policy) {
            (Some(stabilizer), _) => Some(stabilizer.flags()),
            (None, Some(policy)) => Some(policy.flags),
            (None, None) => None,
        }
    }

    pub fn status(&self) -> TerrainStatus {
        self.stabilizer
            .as_ref()
            .map(|s| s.status())
            .unwrap_or_default()
    }

    pub fn phase(&self) -> TrackerPhase {
        self.stabilizer
            .as_ref()
            .map(|s| s.phase())
            .unwrap_or_default()
    }

    /// Apply a toggle, before or after attachment.
    pub fn toggle(
        &mut self,
        which: PolicyToggle,
        value: bool,
        defaults: &PolicyConfig,
    ) -> PolicyChange {
        if let Some(stabilizer) = self.stabilizer.as_mut() {
            return stabilizer.toggle(which, value);
        }
        let policy = self.policy.get_or_insert_with(|| defaults.clone());
        let change = PolicyChange::compute(policy.flags, which, value);
        policy.flags = change.after;
        change
    }
}

/// System that applies toggle requests and announces policy changes.
pub fn apply_policy_toggles(
    mut requests: MessageReader<PolicyToggleRequest>,
    defaults: Res<TrackerDefaults>,
    mut trackers: Query<&mut TerrainTracker>,
    mut changed: MessageWriter<PolicyChanged>,
) {
    for request in requests.read() {
        let Ok(mut tracker) = trackers.get_mut(request.entity) else {
            warn!(
                "Policy toggle {:?} for {:?} ignored: entity has no TerrainTracker",
                request.toggle, request.entity
            );
            continue;
        };

        let change = tracker.toggle(request.toggle, request.enabled, &defaults.0);
        if !change.is_changed() {
            continue;
        }

        if let Some(overridden) = change.overridden {
            info!(
                "{:?} {:?} -> {}; {:?} forced off",
                request.entity, request.toggle, request.enabled, overridden
            );
        } else {
            debug!(
                "{:?} {:?} -> {}",
                request.entity, request.toggle, request.enabled
            );
        }

        changed.write(PolicyChanged {
            entity: request.entity,
            flags: change.after,
            overridden: change.overridden,
        });
    }
}

/// System that attaches new trackers and steps attached ones.
pub fn terrain_tracker_system<P: TerrainProbe + Resource>(
    time: Res<Time>,
    probe: Option<Res<P>>,
    defaults: Res<TrackerDefaults>,
    mut trackers: Query<(Entity, &mut TerrainTracker, &mut Transform)>,
) {
    let Some(probe) = probe else {
        return;
    };
    let probe: &P = &probe;
    let clock = TickClock::new(time.elapsed_secs_f64(), time.delta_secs());

    for (entity, mut tracker, mut transform) in trackers.iter_mut() {
        let pose = BodyPose::new(transform.translation, transform.rotation);
        let tracker = &mut *tracker;

        if tracker.stabilizer.is_none() {
            let policy = tracker
                .policy
                .take()
                .unwrap_or_else(|| defaults.0.clone());
            let stabilizer = Stabilizer::attach(pose, policy, probe);
            info!(
                "Terrain tracker attached to {:?}: target height {:.2} ({:?})",
                entity,
                stabilizer.state().target_height,
                stabilizer.status()
            );
            tracker.stabilizer = Some(stabilizer);
            continue;
        }
        let Some(stabilizer) = tracker.stabilizer.as_mut() else {
            continue;
        };

        let phase_before = stabilizer.phase();
        let status_before = stabilizer.status();
        let report = stabilizer.step(pose, probe, clock);

        if report.active {
            let corrected = stabilizer.pose();
            transform.translation = corrected.position;
            transform.rotation = corrected.rotation;
        }

        if report.phase != phase_before {
            if report.phase == TrackerPhase::Recovering {
                info!(
                    "{:?} is underground, lifting to {:.2}",
                    entity,
                    stabilizer.state().target_height
                );
            } else {
                debug!("{:?} phase {:?} -> {:?}", entity, phase_before, report.phase);
            }
        }

        if report.status != status_before {
            match report.status {
                TerrainStatus::Lost => warn!(
                    "{:?} lost terrain below, holding height {:.2}",
                    entity,
                    stabilizer.state().target_height
                ),
                TerrainStatus::Tracking => {
                    info!("{:?} found terrain below", entity)
                }
                TerrainStatus::Unprobed => {}
            }
        }

        if let Some(displacement) = report.displacement {
            debug!(
                "{:?} pushed back by {:.3} ({} probe hits)",
                entity,
                displacement.length(),
                report.collision_hits
            );
        }

        tracker.last_report = Some(report);
    }
}
