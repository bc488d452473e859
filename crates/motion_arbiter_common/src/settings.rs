//! Arbiter configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SettingsError, ValidationError};
use crate::frame::FrameId;
use crate::messages::{validate_scaling, PlannerConfig};

/// Longest accepted end-effector lookup wait, seconds.
pub const MAX_FRAME_LOOKUP_TIMEOUT_SECS: f64 = 3600.0;

/// Velocity/acceleration scaling applied to requests that do not carry their
/// own planner configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathParameters {
    /// Fraction of maximum joint velocity, in (0, 1]
    pub max_velocity_scaling_factor: f64,
    /// Fraction of maximum joint acceleration, in (0, 1]
    pub max_acceleration_scaling_factor: f64,
}

impl Default for PathParameters {
    fn default() -> Self {
        Self {
            max_velocity_scaling_factor: 1.0,
            max_acceleration_scaling_factor: 1.0,
        }
    }
}

impl PathParameters {
    /// Both factors in (0, 1].
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_scaling("max_velocity_scaling_factor", self.max_velocity_scaling_factor)?;
        validate_scaling("max_acceleration_scaling_factor", self.max_acceleration_scaling_factor)
    }
}

/// Tolerances used when turning targets into constraints.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintTolerances {
    /// Joint targets, radians either side
    pub joint: f64,
    /// Cartesian targets, sphere radius in meters
    pub position: f64,
    /// Cartesian targets, radians about each axis
    pub orientation: f64,
    /// Linear waypoints, sphere radius in meters
    pub linear_position: f64,
    /// Linear waypoints, radians about each axis
    pub linear_orientation: f64,
}

impl Default for ConstraintTolerances {
    fn default() -> Self {
        Self {
            joint: 0.01,
            position: 0.001,
            orientation: 0.01,
            linear_position: 1e-4,
            linear_orientation: 1e-3,
        }
    }
}

impl ConstraintTolerances {
    /// Every tolerance positive and finite.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("joint", self.joint),
            ("position", self.position),
            ("orientation", self.orientation),
            ("linear_position", self.linear_position),
            ("linear_orientation", self.linear_orientation),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ValidationError::NonPositiveTolerance { name, value });
            }
        }
        Ok(())
    }
}

/// Settings for the motion arbiter.
///
/// Defaults match a KUKA LBR iiwa driven through a `"iiwa"` move group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterSettings {
    /// Move group used by requests without an explicit planner configuration
    pub move_group: String,
    /// Planner retries per request
    pub num_planning_attempts: u32,
    /// Seconds the planner may spend per attempt
    pub allowed_planning_time: f64,
    /// Default velocity/acceleration scaling
    pub path: PathParameters,
    /// End-effector link the Cartesian constraints apply to
    pub ee_frame: FrameId,
    /// Maximum distance between linear-motion waypoints, meters
    pub linear_step_size: f64,
    /// Most segments one linear motion may be split into
    pub max_linear_segments: usize,
    /// Joints a joint target must name, in constraint order
    pub joint_names: Vec<String>,
    /// Constraint tolerances
    pub tolerances: ConstraintTolerances,
    /// Bounded wait for the end-effector lookup, seconds
    pub frame_lookup_timeout_secs: f64,
    /// Ask the backend to plan without executing
    pub plan_only: bool,
}

impl Default for ArbiterSettings {
    fn default() -> Self {
        Self {
            move_group: "iiwa".to_string(),
            num_planning_attempts: 10,
            allowed_planning_time: 5.0,
            path: PathParameters::default(),
            ee_frame: FrameId::named("iiwa_link_ee"),
            linear_step_size: 0.001,
            max_linear_segments: 100_000,
            joint_names: (1..=7).map(|i| format!("iiwa_joint_{}", i)).collect(),
            tolerances: ConstraintTolerances::default(),
            frame_lookup_timeout_secs: 1.0,
            plan_only: false,
        }
    }
}

impl ArbiterSettings {
    /// Parse and validate settings from JSON. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a JSON settings file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Check every field the arbiter relies on.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.planner_defaults().validate()?;
        self.tolerances.validate()?;
        if self.ee_frame.is_blank() {
            return Err(ValidationError::EmptyFrame);
        }
        if !(self.linear_step_size.is_finite() && self.linear_step_size > 0.0) {
            return Err(ValidationError::NonPositiveStepSize(self.linear_step_size));
        }
        if self.joint_names.is_empty() {
            return Err(ValidationError::EmptyJointSet);
        }
        if self.max_linear_segments == 0 {
            return Err(ValidationError::ZeroSegmentLimit);
        }

        let timeout = self.frame_lookup_timeout_secs;
        if !(timeout.is_finite() && timeout > 0.0) {
            return Err(ValidationError::NonPositiveTimeout(timeout));
        }
        if timeout > MAX_FRAME_LOOKUP_TIMEOUT_SECS || Duration::try_from_secs_f64(timeout).is_err() {
            return Err(ValidationError::TimeoutTooLong {
                value: timeout,
                max: MAX_FRAME_LOOKUP_TIMEOUT_SECS,
            });
        }
        Ok(())
    }

    /// Planner configuration for requests that do not bring their own.
    pub fn planner_defaults(&self) -> PlannerConfig {
        PlannerConfig {
            move_group: self.move_group.clone(),
            num_planning_attempts: self.num_planning_attempts,
            allowed_planning_time: self.allowed_planning_time,
            max_velocity_scaling_factor: self.path.max_velocity_scaling_factor,
            max_acceleration_scaling_factor: self.path.max_acceleration_scaling_factor,
        }
    }

    /// The end-effector lookup bound as a [`Duration`].
    ///
    /// Values [`ArbiterSettings::validate`] rejects are clamped into
    /// `[0, MAX_FRAME_LOOKUP_TIMEOUT_SECS]`.
    pub fn frame_lookup_timeout(&self) -> Duration {
        let secs = self.frame_lookup_timeout_secs.min(MAX_FRAME_LOOKUP_TIMEOUT_SECS);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = ArbiterSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.joint_names.len(), 7);
        assert_eq!(settings.ee_frame, FrameId::Named("iiwa_link_ee".into()));
        assert_eq!(settings.frame_lookup_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let settings = ArbiterSettings::from_json_str(
            r#"{ "move_group": "manipulator", "path": { "max_velocity_scaling_factor": 0.25 } }"#,
        )
        .unwrap();
        assert_eq!(settings.move_group, "manipulator");
        assert_eq!(settings.path.max_velocity_scaling_factor, 0.25);
        assert_eq!(settings.path.max_acceleration_scaling_factor, 1.0);
        assert_eq!(settings.linear_step_size, 0.001);
    }

    #[test]
    fn test_invalid_json_settings_rejected() {
        let err = ArbiterSettings::from_json_str(r#"{ "linear_step_size": 0.0 }"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid(ValidationError::NonPositiveStepSize(_))
        ));

        let err = ArbiterSettings::from_json_str(r#"{ "tolerances": { "joint": -1.0 } }"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid(ValidationError::NonPositiveTolerance { name: "joint", .. })
        ));

        let err = ArbiterSettings::from_json_str("not json").unwrap_err();
        assert!(matches!(err, SettingsError::Parse(_)));
    }

    #[test]
    fn test_huge_lookup_timeout_rejected() {
        let err = ArbiterSettings::from_json_str(r#"{ "frame_lookup_timeout_secs": 1e20 }"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid(ValidationError::TimeoutTooLong { .. })
        ));

        let err = ArbiterSettings::from_json_str(r#"{ "frame_lookup_timeout_secs": 3600.5 }"#).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid(ValidationError::TimeoutTooLong { .. })
        ));

        let settings = ArbiterSettings::from_json_str(r#"{ "frame_lookup_timeout_secs": 3600.0 }"#).unwrap();
        assert_eq!(settings.frame_lookup_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn test_lookup_timeout_conversion_never_panics() {
        let mut settings = ArbiterSettings::default();
        for (secs, expected) in [
            (1e20, Duration::from_secs(3600)),
            (f64::INFINITY, Duration::from_secs(3600)),
            (f64::NAN, Duration::from_secs(3600)),
            (-1.0, Duration::ZERO),
        ] {
            settings.frame_lookup_timeout_secs = secs;
            assert!(settings.validate().is_err());
            assert_eq!(settings.frame_lookup_timeout(), expected);
        }
    }

    #[test]
    fn test_zero_segment_limit_rejected() {
        let err = ArbiterSettings::from_json_str(r#"{ "max_linear_segments": 0 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(ValidationError::ZeroSegmentLimit)));
    }

    #[test]
    fn test_planner_defaults_follow_path_parameters() {
        let mut settings = ArbiterSettings::default();
        settings.path = PathParameters {
            max_velocity_scaling_factor: 0.3,
            max_acceleration_scaling_factor: 0.6,
        };
        let planner = settings.planner_defaults();
        assert_eq!(planner.move_group, "iiwa");
        assert_eq!(planner.num_planning_attempts, 10);
        assert_eq!(planner.allowed_planning_time, 5.0);
        assert_eq!(planner.max_velocity_scaling_factor, 0.3);
        assert_eq!(planner.max_acceleration_scaling_factor, 0.6);
    }
}
