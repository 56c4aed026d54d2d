//! Tracker settings load/save.
//!
//! Settings are stored as pretty-printed JSON holding a [`PolicyConfig`].
//! Missing fields fall back to their defaults, so a file only needs the
//! values it wants to change:
//!
//! ```json
//! {
//!   "flags": { "align_to_slope": true, "collision_enabled": true },
//!   "tuning": { "push_back_force": 60.0 }
//! }
//! ```
//!
//! Loaded switches pass through the same toggle logic as user input, so a
//! file enabling both recovery and collision ends up with recovery only.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::policy::PolicyConfig;

/// Errors that can occur while reading or writing settings.
#[derive(Debug)]
pub enum SettingsError {
    /// File system error
    Io(std::io::Error),
    /// Malformed JSON or wrong field types
    Json(serde_json::Error),
    /// Parsed, but a value is out of range
    Invalid(String),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "IO error: {}", e),
            SettingsError::Json(e) => write!(f, "JSON error: {}", e),
            SettingsError::Invalid(msg) => write!(f, "Invalid settings: {}", msg),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Json(e)
    }
}

/// Result type for settings operations.
pub type SettingsResult<T> = Result<T, SettingsError>;

/// Parse and validate settings from a JSON string.
pub fn parse_settings(json: &str) -> SettingsResult<PolicyConfig> {
    let config: PolicyConfig = serde_json::from_str(json)?;
    config.tuning.validate().map_err(SettingsError::Invalid)?;
    Ok(config)
}

/// Load settings from a JSON file.
pub fn load_settings(path: impl AsRef<Path>) -> SettingsResult<PolicyConfig> {
    let file = File::open(path.as_ref())?;
    let reader = BufReader::new(file);
    let config: PolicyConfig = serde_json::from_reader(reader)?;
    config.tuning.validate().map_err(SettingsError::Invalid)?;
    Ok(config)
}

/// Save settings to a JSON file.
pub fn save_settings(config: &PolicyConfig, path: impl AsRef<Path>) -> SettingsResult<()> {
    config.tuning.validate().map_err(SettingsError::Invalid)?;
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, config)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{PolicyFlags, TrackerTuning};
    use tempfile::NamedTempFile;

    #[test]
    fn test_save_load_settings() {
        let mut config = PolicyConfig::with_flags(PolicyFlags::new(true, true, false));
        config.tuning.push_back_force = 42.0;
        config.tuning.height_offset = 0.75;

        let temp_file = NamedTempFile::with_suffix(".json").unwrap();
        save_settings(&config, temp_file.path()).unwrap();
        let loaded = load_settings(temp_file.path()).unwrap();

        assert_eq!(loaded.flags, config.flags);
        assert_eq!(loaded.tuning.push_back_force, 42.0);
        assert_eq!(loaded.tuning.height_offset, 0.75);
    }

    #[test]
    fn test_partial_settings_use_defaults() {
        let config = parse_settings(r#"{ "tuning": { "collision_distance": 2.5 } }"#).unwrap();
        assert_eq!(config.flags, PolicyFlags::default());
        assert_eq!(config.tuning.collision_distance, 2.5);
        assert_eq!(
            config.tuning.check_interval,
            TrackerTuning::default().check_interval
        );
    }

    #[test]
    fn test_conflicting_flags_resolved_on_load() {
        let config = parse_settings(
            r#"{ "flags": { "collision_enabled": true, "recovery_enabled": true } }"#,
        )
        .unwrap();
        assert!(config.flags.recovery_enabled());
        assert!(!config.flags.collision_enabled());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = parse_settings(r#"{ "tuning": { "check_interval": -1.0 } }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
        assert!(err.to_string().contains("check_interval"));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse_settings("{ not json").unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = load_settings("/nonexistent/dir/tracker.json").unwrap_err();
        assert!(matches!(err, SettingsError::Io(_)));
    }
}
