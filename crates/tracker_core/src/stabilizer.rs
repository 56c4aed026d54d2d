//! Per-step terrain stabilization for a single body.
//!
//! Keeps a body clamped to uneven ground, optionally aligned to the slope,
//! lifted out when it tunnels below the surface, and nudged away from nearby
//! terrain.
//!
//! # Pipeline (per step)
//!
//! 1. Gate: skip everything if the body has not moved and is not underground
//! 2. Ground sample (rate limited): downward probe -> target height + normal
//! 3. Recovery check (rate limited, optional): upward probe -> underground flag
//! 4. Collision resolve (optional): eight lateral probes -> displacement
//! 5. Integrate: displacement, height clamp, slope alignment, cache update
//!
//! All probes in one step see the same position snapshot; the displacement is
//! only applied in step 5.
//!
//! The stage functions are free functions so they can be tested in isolation.
//! [`Stabilizer`] owns the state and runs them in order.

use bevy::math::{Quat, Vec3};

use crate::policy::{PolicyChange, PolicyConfig, PolicyFlags, PolicyToggle, TrackerTuning};
use crate::probe::{RayHit, TerrainProbe};

/// Activity state of a tracked body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerPhase {
    /// Stationary on the surface; steps are skipped
    #[default]
    Idle,
    /// Position changed since the last step
    Moving,
    /// Terrain found above the body; stays active even when stationary
    Recovering,
}

/// Whether the ground probe is finding terrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TerrainStatus {
    /// No ground probe has run yet
    #[default]
    Unprobed,
    /// Last ground probe hit terrain
    Tracking,
    /// Last ground probe missed; target height is being held
    Lost,
}

/// World pose of the controlled body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyPose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl BodyPose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_position(position: Vec3) -> Self {
        Self::new(position, Quat::IDENTITY)
    }
}

/// Time inputs for one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickClock {
    /// Absolute, monotonically increasing time (seconds)
    pub now: f64,
    /// Time since the previous step (seconds)
    pub delta: f32,
}

impl TickClock {
    pub fn new(now: f64, delta: f32) -> Self {
        Self { now, delta }
    }
}

/// Cached per-body state, read at the start of a step and written at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    pub position: Vec3,
    pub rotation: Quat,
    /// Position written at the end of the previous active step
    pub last_position: Vec3,
    /// Desired vertical coordinate
    pub target_height: f32,
    /// Collision displacement for the current step
    pub pending_displacement: Vec3,
    /// Most recent ground-probe normal
    pub last_hit_normal: Vec3,
    pub phase: TrackerPhase,
}

impl VehicleState {
    /// Initialize from the body's current transform.
    ///
    /// The target height starts at the body's own height so nothing moves
    /// until terrain has been found.
    pub fn from_pose(pose: BodyPose) -> Self {
        Self {
            position: pose.position,
            rotation: pose.rotation,
            last_position: pose.position,
            target_height: pose.position.y,
            pending_displacement: Vec3::ZERO,
            last_hit_normal: Vec3::Y,
            phase: TrackerPhase::Idle,
        }
    }

    pub fn is_underground(&self) -> bool {
        self.phase == TrackerPhase::Recovering
    }

    pub fn pose(&self) -> BodyPose {
        BodyPose::new(self.position, self.rotation)
    }
}

/// Next eligible times for the two rate-limited probes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbeSchedule {
    pub next_ground_check: f64,
    pub next_recovery_check: f64,
}

impl ProbeSchedule {
    pub fn ground_due(&self, now: f64) -> bool {
        now >= self.next_ground_check
    }

    pub fn recovery_due(&self, now: f64) -> bool {
        now >= self.next_recovery_check
    }
}

/// What happened during one call to [`Stabilizer::step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// False when the idle gate skipped the step
    pub active: bool,
    /// `Some(hit)` if the ground probe ran
    pub ground_probe: Option<bool>,
    /// `Some(hit)` if the recovery probe ran
    pub recovery_probe: Option<bool>,
    /// Number of lateral probes that hit terrain
    pub collision_hits: usize,
    /// Displacement applied this step, if it cleared the epsilon
    pub displacement: Option<Vec3>,
    pub phase: TrackerPhase,
    pub status: TerrainStatus,
}

impl StepReport {
    fn skipped(phase: TrackerPhase, status: TerrainStatus) -> Self {
        Self {
            active: false,
            ground_probe: None,
            recovery_probe: None,
            collision_hits: 0,
            displacement: None,
            phase,
            status,
        }
    }

    fn active(phase: TrackerPhase, status: TerrainStatus) -> Self {
        Self {
            active: true,
            ..Self::skipped(phase, status)
        }
    }
}

// =============================================================================
// Ground Sampler
// =============================================================================

/// Cast the downward ground probe and update target height on a hit.
///
/// The probe starts `ground_probe_lift` above the body so a body resting
/// exactly on the surface still finds it. Terrain enclosing the probe origin
/// is not ground. A miss leaves the target height and underground flag
/// untouched.
pub fn sample_ground(
    state: &mut VehicleState,
    tuning: &TrackerTuning,
    probe: &impl TerrainProbe,
) -> Option<RayHit> {
    let origin = state.position + Vec3::Y * tuning.ground_probe_lift;
    let hit = probe.cast(
        origin,
        Vec3::NEG_Y,
        tuning.ground_probe_length,
        tuning.terrain_mask,
    )?;

    state.target_height = hit.point.y + tuning.height_offset;
    state.last_hit_normal = hit.normal;
    if state.is_underground() {
        state.phase = TrackerPhase::Moving;
    }
    Some(hit)
}

// =============================================================================
// Recovery Detector
// =============================================================================

/// Cast the upward probe; terrain above means the body is underground.
///
/// A body buried inside a solid finds the surface where the probe leaves it.
/// On a hit the surface above becomes the new target. On a miss the
/// underground flag is cleared even if the ground probe also missed, which
/// leaves the previous target height in place.
pub fn detect_underground(
    state: &mut VehicleState,
    tuning: &TrackerTuning,
    probe: &impl TerrainProbe,
) -> Option<RayHit> {
    match probe.cast_through(
        state.position,
        Vec3::Y,
        tuning.underground_probe_length,
        tuning.terrain_mask,
    ) {
        Some(hit) => {
            state.phase = TrackerPhase::Recovering;
            state.target_height = hit.point.y + tuning.height_offset;
            Some(hit)
        }
        None => {
            if state.is_underground() {
                state.phase = TrackerPhase::Idle;
            }
            None
        }
    }
}

// =============================================================================
// Collision Resolver
// =============================================================================

/// The eight lateral probe directions for a body orientation.
///
/// Order: forward, back, right, left, then the four normalized diagonals.
pub fn collision_directions(rotation: Quat) -> [Vec3; 8] {
    let forward = rotation * Vec3::NEG_Z;
    let right = rotation * Vec3::X;
    [
        forward,
        -forward,
        right,
        -right,
        (forward + right).normalize(),
        (forward - right).normalize(),
        (-forward + right).normalize(),
        (-forward - right).normalize(),
    ]
}

/// Displacement contributed by one lateral hit.
///
/// Strength scales linearly from zero at the probe tip to `push_back_force`
/// at the body center, and points against the probe direction.
pub fn push_back(direction: Vec3, hit_distance: f32, tuning: &TrackerTuning, dt: f32) -> Vec3 {
    let strength = (tuning.collision_distance - hit_distance) / tuning.collision_distance
        * tuning.push_back_force;
    -direction * strength * dt
}

/// Probe all eight directions and sum the push-back of every hit.
///
/// Contributions are added without clamping, so a body wedged in a corner can
/// receive more than any single probe would give it.
///
/// # Returns
/// `(displacement, hit_count)`
pub fn resolve_collisions(
    position: Vec3,
    rotation: Quat,
    tuning: &TrackerTuning,
    dt: f32,
    probe: &impl TerrainProbe,
) -> (Vec3, usize) {
    let mut displacement = Vec3::ZERO;
    let mut hits = 0;

    for direction in collision_directions(rotation) {
        if let Some(hit) = probe.cast(
            position,
            direction,
            tuning.collision_distance,
            tuning.terrain_mask,
        ) {
            displacement += push_back(direction, hit.distance, tuning, dt);
            hits += 1;
        }
    }

    (displacement, hits)
}

// =============================================================================
// State Integrator
// =============================================================================

/// Blend `rotation` toward the orientation whose up axis matches `normal`.
///
/// The blend factor is `rotation_speed * dt`, clamped to [0, 1].
pub fn align_rotation(rotation: Quat, normal: Vec3, rotation_speed: f32, dt: f32) -> Quat {
    let normal = normal.normalize_or_zero();
    if normal == Vec3::ZERO {
        return rotation;
    }

    let up = (rotation * Vec3::Y).normalize();
    let target = Quat::from_rotation_arc(up, normal) * rotation;
    let t = (rotation_speed * dt).clamp(0.0, 1.0);
    rotation.slerp(target, t).normalize()
}

/// Apply displacement, height clamp and slope alignment, then cache the position.
pub fn integrate(state: &mut VehicleState, flags: PolicyFlags, tuning: &TrackerTuning, dt: f32) {
    if state.pending_displacement != Vec3::ZERO {
        state.position += state.pending_displacement;
    }

    state.position.y = state.target_height;

    if flags.align_to_slope() {
        state.rotation =
            align_rotation(state.rotation, state.last_hit_normal, tuning.rotation_speed, dt);
    }

    state.last_position = state.position;
}

// =============================================================================
// Stabilizer
// =============================================================================

/// Terrain stabilizer for one body: state, policy and probe schedule.
#[derive(Debug, Clone)]
pub struct Stabilizer {
    state: VehicleState,
    policy: PolicyConfig,
    schedule: ProbeSchedule,
    status: TerrainStatus,
}

impl Stabilizer {
    /// Create a stabilizer for a body without probing.
    ///
    /// Both timers start at zero so the first active step probes immediately.
    pub fn new(pose: BodyPose, policy: PolicyConfig) -> Self {
        Self {
            state: VehicleState::from_pose(pose),
            policy,
            schedule: ProbeSchedule::default(),
            status: TerrainStatus::Unprobed,
        }
    }

    /// Create a stabilizer and take one initial ground sample.
    ///
    /// The initial sample sets the target height but does not move the body
    /// or advance the ground timer.
    pub fn attach(pose: BodyPose, policy: PolicyConfig, probe: &impl TerrainProbe) -> Self {
        let mut stabilizer = Self::new(pose, policy);
        let hit = sample_ground(&mut stabilizer.state, &stabilizer.policy.tuning, probe);
        stabilizer.status = status_for(hit.is_some());
        stabilizer
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    pub fn policy(&self) -> &PolicyConfig {
        &self.policy
    }

    pub fn flags(&self) -> PolicyFlags {
        self.policy.flags
    }

    pub fn schedule(&self) -> &ProbeSchedule {
        &self.schedule
    }

    pub fn status(&self) -> TerrainStatus {
        self.status
    }

    pub fn phase(&self) -> TrackerPhase {
        self.state.phase
    }

    pub fn is_underground(&self) -> bool {
        self.state.is_underground()
    }

    pub fn pose(&self) -> BodyPose {
        self.state.pose()
    }

    /// Replace the tunables; switches are kept.
    ///
    /// Invalid tunables are rejected and the current ones stay in effect.
    pub fn set_tuning(&mut self, tuning: TrackerTuning) -> Result<(), String> {
        tuning.validate()?;
        self.policy.tuning = tuning;
        Ok(())
    }

    /// Apply a user toggle.
    ///
    /// When recovery ends up disabled the sticky underground state is dropped,
    /// so a stationary body stops being re-evaluated.
    pub fn toggle(&mut self, which: PolicyToggle, value: bool) -> PolicyChange {
        let change = PolicyChange::compute(self.policy.flags, which, value);
        self.policy.flags = change.after;
        if !change.after.recovery_enabled() && self.state.is_underground() {
            self.state.phase = TrackerPhase::Idle;
        }
        change
    }

    /// Run one step of the pipeline against the body's current pose.
    ///
    /// When the step is active the corrected pose is available from
    /// [`Stabilizer::pose`] afterwards.
    pub fn step(
        &mut self,
        pose: BodyPose,
        probe: &impl TerrainProbe,
        clock: TickClock,
    ) -> StepReport {
        let moved = pose.position != self.state.last_position;
        if !moved && !self.state.is_underground() {
            if self.state.phase == TrackerPhase::Moving {
                self.state.phase = TrackerPhase::Idle;
            }
            return StepReport::skipped(self.state.phase, self.status);
        }

        self.state.position = pose.position;
        self.state.rotation = pose.rotation;
        if moved && self.state.phase == TrackerPhase::Idle {
            self.state.phase = TrackerPhase::Moving;
        }
        self.state.pending_displacement = Vec3::ZERO;

        let flags = self.policy.flags;
        let tuning = &self.policy.tuning;
        let mut report = StepReport::active(self.state.phase, self.status);

        if self.schedule.ground_due(clock.now) {
            let hit = sample_ground(&mut self.state, tuning, probe);
            self.status = status_for(hit.is_some());
            report.ground_probe = Some(hit.is_some());
            self.schedule.next_ground_check = clock.now + tuning.check_interval as f64;
        }

        if flags.recovery_enabled() && self.schedule.recovery_due(clock.now) {
            let hit = detect_underground(&mut self.state, tuning, probe);
            report.recovery_probe = Some(hit.is_some());
            self.schedule.next_recovery_check =
                clock.now + tuning.recovery_check_interval as f64;
        }

        if flags.collision_enabled() {
            let (displacement, hits) = resolve_collisions(
                self.state.position,
                self.state.rotation,
                tuning,
                clock.delta,
                probe,
            );
            report.collision_hits = hits;
            if displacement.length() > tuning.displacement_epsilon {
                self.state.pending_displacement = displacement;
                report.displacement = Some(displacement);
            }
        }

        integrate(&mut self.state, flags, tuning, clock.delta);

        report.phase = self.state.phase;
        report.status = self.status;
        report
    }
}

fn status_for(hit: bool) -> TerrainStatus {
    if hit {
        TerrainStatus::Tracking
    } else {
        TerrainStatus::Lost
    }
}
