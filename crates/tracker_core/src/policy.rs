//! Tracker policy: the three user toggles plus tunable scalars.
//!
//! Recovery and terrain collision are mutually exclusive. [`PolicyFlags`] keeps
//! its fields private so the only way to change them is [`apply_toggle`], which
//! enforces the exclusion by construction.

use serde::{Deserialize, Serialize};

use crate::probe::SurfaceMask;

/// One of the three user-facing switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyToggle {
    /// Blend the body's up axis toward the ground normal
    AlignToSlope,
    /// Push the body away from nearby terrain
    Collision,
    /// Lift the body out when it is found below terrain
    Recovery,
}

/// Effective policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "PolicyFlagsRepr")]
pub struct PolicyFlags {
    align_to_slope: bool,
    recovery_enabled: bool,
    collision_enabled: bool,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct PolicyFlagsRepr {
    align_to_slope: bool,
    recovery_enabled: bool,
    collision_enabled: bool,
}

impl From<PolicyFlagsRepr> for PolicyFlags {
    fn from(repr: PolicyFlagsRepr) -> Self {
        PolicyFlags::new(repr.align_to_slope, repr.collision_enabled, repr.recovery_enabled)
    }
}

impl PolicyFlags {
    /// Build flags by applying the toggles in order: slope, collision, recovery.
    ///
    /// If both collision and recovery are requested, recovery is applied last
    /// and wins.
    pub fn new(align_to_slope: bool, collision_enabled: bool, recovery_enabled: bool) -> Self {
        let flags = PolicyFlags::default();
        let flags = apply_toggle(flags, PolicyToggle::AlignToSlope, align_to_slope);
        let flags = apply_toggle(flags, PolicyToggle::Collision, collision_enabled);
        apply_toggle(flags, PolicyToggle::Recovery, recovery_enabled)
    }

    pub fn align_to_slope(&self) -> bool {
        self.align_to_slope
    }

    pub fn recovery_enabled(&self) -> bool {
        self.recovery_enabled
    }

    pub fn collision_enabled(&self) -> bool {
        self.collision_enabled
    }

    /// Current value of a single switch.
    pub fn get(&self, toggle: PolicyToggle) -> bool {
        match toggle {
            PolicyToggle::AlignToSlope => self.align_to_slope,
            PolicyToggle::Collision => self.collision_enabled,
            PolicyToggle::Recovery => self.recovery_enabled,
        }
    }
}

/// Apply one user toggle and return the resulting policy.
///
/// Turning collision on forces recovery off and vice versa. Turning either one
/// off never touches the other.
pub fn apply_toggle(current: PolicyFlags, which: PolicyToggle, value: bool) -> PolicyFlags {
    let mut next = current;
    match which {
        PolicyToggle::AlignToSlope => next.align_to_slope = value,
        PolicyToggle::Collision => {
            next.collision_enabled = value;
            if value {
                next.recovery_enabled = false;
            }
        }
        PolicyToggle::Recovery => {
            next.recovery_enabled = value;
            if value {
                next.collision_enabled = false;
            }
        }
    }
    next
}

/// Result of applying a toggle, for re-synchronizing display surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyChange {
    pub before: PolicyFlags,
    pub after: PolicyFlags,
    /// Counterpart switch that exclusivity forced off, if any
    pub overridden: Option<PolicyToggle>,
}

impl PolicyChange {
    pub fn compute(before: PolicyFlags, which: PolicyToggle, value: bool) -> Self {
        let after = apply_toggle(before, which, value);
        let overridden = [PolicyToggle::Collision, PolicyToggle::Recovery]
            .into_iter()
            .find(|t| *t != which && before.get(*t) && !after.get(*t));
        Self {
            before,
            after,
            overridden,
        }
    }

    pub fn is_changed(&self) -> bool {
        self.before != self.after
    }
}

/// Tunable scalars read every step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerTuning {
    /// Seconds between downward ground probes
    pub check_interval: f32,
    /// Seconds between upward recovery probes
    pub recovery_check_interval: f32,
    /// Length of the upward recovery probe
    pub underground_probe_length: f32,
    /// Length of each lateral collision probe
    pub collision_distance: f32,
    /// Push-back strength at full penetration (units/sec)
    pub push_back_force: f32,
    /// Slope alignment blend rate (per second)
    pub rotation_speed: f32,
    /// Ground clearance added to every hit height
    pub height_offset: f32,
    /// How far above the body the ground probe starts
    pub ground_probe_lift: f32,
    /// Length of the downward ground probe
    pub ground_probe_length: f32,
    /// Displacements at or below this magnitude are dropped
    pub displacement_epsilon: f32,
    /// Surfaces the tracker treats as terrain
    pub terrain_mask: SurfaceMask,
}

impl Default for TrackerTuning {
    fn default() -> Self {
        Self {
            check_interval: 0.1,
            recovery_check_interval: 0.5,
            underground_probe_length: 1000.0,
            collision_distance: 1.0,
            push_back_force: 100.0,
            rotation_speed: 5.0,
            height_offset: 1.0,
            ground_probe_lift: 1.0,
            ground_probe_length: 1000.0,
            displacement_epsilon: 0.01,
            terrain_mask: SurfaceMask::TERRAIN,
        }
    }
}

impl TrackerTuning {
    /// Check that every scalar is in its usable range.
    pub fn validate(&self) -> Result<(), String> {
        let positive = [
            ("check_interval", self.check_interval),
            ("recovery_check_interval", self.recovery_check_interval),
            ("underground_probe_length", self.underground_probe_length),
            ("collision_distance", self.collision_distance),
            ("ground_probe_length", self.ground_probe_length),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{} must be positive, got {}", name, value));
            }
        }

        let non_negative = [
            ("push_back_force", self.push_back_force),
            ("rotation_speed", self.rotation_speed),
            ("ground_probe_lift", self.ground_probe_lift),
            ("displacement_epsilon", self.displacement_epsilon),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(format!("{} must be non-negative, got {}", name, value));
            }
        }

        if !self.height_offset.is_finite() {
            return Err(format!("height_offset must be finite, got {}", self.height_offset));
        }
        if self.terrain_mask.bits() == 0 {
            return Err("terrain_mask selects no surfaces".into());
        }
        Ok(())
    }
}

/// Switches plus tunables for one tracker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub flags: PolicyFlags,
    pub tuning: TrackerTuning,
}

impl PolicyConfig {
    pub fn with_flags(flags: PolicyFlags) -> Self {
        Self {
            flags,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOGGLES: [PolicyToggle; 3] = [
        PolicyToggle::AlignToSlope,
        PolicyToggle::Collision,
        PolicyToggle::Recovery,
    ];

    #[test]
    fn test_default_flags_all_off() {
        let flags = PolicyFlags::default();
        assert!(!flags.align_to_slope());
        assert!(!flags.collision_enabled());
        assert!(!flags.recovery_enabled());
    }

    #[test]
    fn test_enabling_recovery_disables_collision() {
        let flags = apply_toggle(PolicyFlags::default(), PolicyToggle::Collision, true);
        assert!(flags.collision_enabled());

        let flags = apply_toggle(flags, PolicyToggle::Recovery, true);
        assert!(flags.recovery_enabled());
        assert!(!flags.collision_enabled(), "collision must be forced off");
    }

    #[test]
    fn test_enabling_collision_disables_recovery() {
        let flags = apply_toggle(PolicyFlags::default(), PolicyToggle::Recovery, true);
        let flags = apply_toggle(flags, PolicyToggle::Collision, true);
        assert!(flags.collision_enabled());
        assert!(!flags.recovery_enabled());
    }

    #[test]
    fn test_disabling_does_not_touch_counterpart() {
        let flags = apply_toggle(PolicyFlags::default(), PolicyToggle::Recovery, true);
        let flags = apply_toggle(flags, PolicyToggle::Collision, false);
        assert!(flags.recovery_enabled());
        assert!(!flags.collision_enabled());
    }

    #[test]
    fn test_slope_toggle_independent() {
        let flags = PolicyFlags::new(false, true, false);
        let flags = apply_toggle(flags, PolicyToggle::AlignToSlope, true);
        assert!(flags.align_to_slope());
        assert!(flags.collision_enabled());
    }

    #[test]
    fn test_exclusivity_holds_for_every_toggle_sequence() {
        // Every sequence of up to 5 (toggle, value) events from the default state.
        let events: Vec<(PolicyToggle, bool)> = TOGGLES
            .iter()
            .flat_map(|t| [(*t, true), (*t, false)])
            .collect();

        let mut frontier = vec![PolicyFlags::default()];
        for _ in 0..5 {
            let mut next = Vec::new();
            for flags in &frontier {
                for (toggle, value) in &events {
                    let after = apply_toggle(*flags, *toggle, *value);
                    assert!(
                        !(after.recovery_enabled() && after.collision_enabled()),
                        "exclusivity violated after {:?}={} from {:?}",
                        toggle,
                        value,
                        flags
                    );
                    assert_eq!(after.get(*toggle), *value);
                    if !next.contains(&after) {
                        next.push(after);
                    }
                }
            }
            frontier = next;
        }
    }

    #[test]
    fn test_policy_change_reports_override() {
        let before = PolicyFlags::new(false, true, false);
        let change = PolicyChange::compute(before, PolicyToggle::Recovery, true);
        assert!(change.is_changed());
        assert_eq!(change.overridden, Some(PolicyToggle::Collision));
        assert!(!change.after.collision_enabled());

        let change = PolicyChange::compute(change.after, PolicyToggle::Recovery, true);
        assert!(!change.is_changed());
        assert_eq!(change.overridden, None);
    }

    #[test]
    fn test_new_prefers_recovery_when_both_requested() {
        let flags = PolicyFlags::new(true, true, true);
        assert!(flags.align_to_slope());
        assert!(flags.recovery_enabled());
        assert!(!flags.collision_enabled());
    }

    #[test]
    fn test_deserialized_flags_respect_exclusivity() {
        let json = r#"{"align_to_slope":false,"recovery_enabled":true,"collision_enabled":true}"#;
        let flags: PolicyFlags = serde_json::from_str(json).unwrap();
        assert!(flags.recovery_enabled());
        assert!(!flags.collision_enabled());
    }

    #[test]
    fn test_tuning_default_values() {
        let tuning = TrackerTuning::default();
        assert_eq!(tuning.check_interval, 0.1);
        assert_eq!(tuning.recovery_check_interval, 0.5);
        assert_eq!(tuning.underground_probe_length, 1000.0);
        assert_eq!(tuning.collision_distance, 1.0);
        assert_eq!(tuning.push_back_force, 100.0);
        assert_eq!(tuning.rotation_speed, 5.0);
        assert_eq!(tuning.height_offset, 1.0);
        assert_eq!(tuning.displacement_epsilon, 0.01);
        assert!(tuning.validate().is_ok());
    }

    #[test]
    fn test_tuning_validation_rejects_bad_values() {
        let mut tuning = TrackerTuning::default();
        tuning.check_interval = 0.0;
        assert!(tuning.validate().unwrap_err().contains("check_interval"));

        let mut tuning = TrackerTuning::default();
        tuning.push_back_force = -1.0;
        assert!(tuning.validate().unwrap_err().contains("push_back_force"));

        let mut tuning = TrackerTuning::default();
        tuning.terrain_mask = SurfaceMask(0);
        assert!(tuning.validate().is_err());
    }
}
