//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Fixed timestep for the simulation (60Hz).
pub const DEFAULT_FIXED_DT: f32 = 1.0 / 60.0;

/// Contact points kept per notification.
pub const DEFAULT_MAX_CONTACT_POINTS: usize = 3;

/// Error type for loading and validating a [`RelayConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables for reconciliation, momentum and the physics adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Seconds per fixed tick.
    pub fixed_dt: f32,
    /// Contact points considered per notification; extra points are dropped.
    pub max_contact_points: usize,
    /// Divisor applied to values exchanged between teammates.
    pub same_team_divisor: f32,
    /// Weight of rotational motion relative to linear motion in momentum.
    pub angular_weight: f32,
    /// Gravity handed to the physics adapter.
    pub gravity: [f32; 2],
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            fixed_dt: DEFAULT_FIXED_DT,
            max_contact_points: DEFAULT_MAX_CONTACT_POINTS,
            same_team_divisor: 3.0,
            angular_weight: 0.5,
            gravity: [0.0, -9.81],
        }
    }
}

impl RelayConfig {
    /// Parses and validates a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Rejects values the tick loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fixed_dt.is_finite() && self.fixed_dt > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "fixed_dt must be positive, got {}",
                self.fixed_dt
            )));
        }
        if self.max_contact_points == 0 {
            return Err(ConfigError::Invalid(
                "max_contact_points must be at least 1".to_string(),
            ));
        }
        if !(self.same_team_divisor.is_finite() && self.same_team_divisor >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "same_team_divisor must be >= 1, got {}",
                self.same_team_divisor
            )));
        }
        if !(0.0..=1.0).contains(&self.angular_weight) {
            return Err(ConfigError::Invalid(format!(
                "angular_weight must be within [0, 1], got {}",
                self.angular_weight
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = RelayConfig::from_json("{}").unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.max_contact_points, 3);
    }

    #[test]
    fn test_partial_override() {
        let config = RelayConfig::from_json(r#"{ "fixed_dt": 0.02, "gravity": [0.0, 0.0] }"#)
            .unwrap();
        assert!((config.fixed_dt - 0.02).abs() < f32::EPSILON);
        assert_eq!(config.gravity, [0.0, 0.0]);
        assert_eq!(config.same_team_divisor, 3.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            RelayConfig::from_json(r#"{ "fixed_dt": 0.0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RelayConfig::from_json(r#"{ "max_contact_points": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            RelayConfig::from_json(r#"{ "angular_weight": 2.0 }"#),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            RelayConfig::from_json("{ fixed_dt"),
            Err(ConfigError::Parse(_))
        ));
    }
}
