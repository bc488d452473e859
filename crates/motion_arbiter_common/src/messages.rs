//! Request, planning and outcome message types.
//!
//! Three layers of messages flow through the arbiter:
//! - [`MotionRequest`]: what an external requester asks for
//! - [`PlanningRequest`]: what the planning/execution backend receives
//! - [`MotionOutcome`]: what the requester is finally told

use std::collections::BTreeMap;
use std::fmt::Display;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, ValidationError};
use crate::frame::FrameId;
use crate::pose::StampedPose;

// ============================================================================
// Identifiers
// ============================================================================

/// Identifies one submitted motion request for its whole lifetime.
#[derive(Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct GoalId(pub u64);

impl Display for GoalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "goal#{}", self.0)
    }
}

/// Correlates a dispatched [`PlanningRequest`] with its asynchronous result.
///
/// Strictly increasing per dispatch, never reused within a process.
#[derive(Serialize, Deserialize, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// First sequence number handed out.
    pub const FIRST: Self = SequenceNumber(1);

    /// The sequence number after this one.
    pub fn next(self) -> Self {
        SequenceNumber(self.0 + 1)
    }
}

impl Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "seq#{}", self.0)
    }
}

// ============================================================================
// Motion requests
// ============================================================================

/// Planner settings carried verbatim from a motion request to every planning
/// request derived from it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Move group the request plans for
    pub move_group: String,
    /// How many times the planner may retry
    pub num_planning_attempts: u32,
    /// Seconds the planner may spend per attempt
    pub allowed_planning_time: f64,
    /// Fraction of maximum joint velocity, in (0, 1]
    pub max_velocity_scaling_factor: f64,
    /// Fraction of maximum joint acceleration, in (0, 1]
    pub max_acceleration_scaling_factor: f64,
}

impl PlannerConfig {
    /// Reject configurations the planner cannot honor.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.move_group.trim().is_empty() {
            return Err(ValidationError::EmptyMoveGroup);
        }
        if self.num_planning_attempts == 0 {
            return Err(ValidationError::NoPlanningAttempts);
        }
        if !(self.allowed_planning_time.is_finite() && self.allowed_planning_time > 0.0) {
            return Err(ValidationError::NonPositivePlanningTime(self.allowed_planning_time));
        }
        validate_scaling("max_velocity_scaling_factor", self.max_velocity_scaling_factor)?;
        validate_scaling("max_acceleration_scaling_factor", self.max_acceleration_scaling_factor)?;
        Ok(())
    }
}

/// Check a scaling factor lies in (0, 1].
pub fn validate_scaling(name: &'static str, value: f64) -> Result<(), ValidationError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ValidationError::ScalingOutOfRange { name, value })
    }
}

/// Move to a joint configuration, one target angle (radians) per joint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct JointTarget {
    /// Joint name to target angle
    pub positions: BTreeMap<String, f64>,
}

impl JointTarget {
    /// Build a target from `(joint, angle)` pairs.
    pub fn new<S: Into<String>>(positions: impl IntoIterator<Item = (S, f64)>) -> Self {
        Self {
            positions: positions
                .into_iter()
                .map(|(name, angle)| (name.into(), angle))
                .collect(),
        }
    }

    /// Every required joint present, no unknown joints, all angles finite.
    pub fn validate(&self, joint_names: &[String]) -> Result<(), ValidationError> {
        if self.positions.is_empty() {
            return Err(ValidationError::EmptyJointSet);
        }
        if let Some(missing) = joint_names.iter().find(|name| !self.positions.contains_key(*name)) {
            return Err(ValidationError::MissingJoint(missing.clone()));
        }
        for (joint, value) in &self.positions {
            if !joint_names.contains(joint) {
                return Err(ValidationError::UnknownJoint(joint.clone()));
            }
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteJoint {
                    joint: joint.clone(),
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

/// Move to a Cartesian pose along whatever path the planner picks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartesianTarget {
    /// End-effector target
    pub pose: StampedPose,
}

/// Move to a Cartesian pose along (an approximation of) a straight line from
/// the current end-effector pose.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearCartesianTarget {
    /// End-effector target
    pub pose: StampedPose,
}

/// The three kinds of motion a requester can ask for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum MotionGoal {
    /// Joint-space target
    Joint(JointTarget),
    /// Cartesian target, free path
    Cartesian(CartesianTarget),
    /// Cartesian target, straight-line path
    LinearCartesian(LinearCartesianTarget),
}

impl From<JointTarget> for MotionGoal {
    fn from(target: JointTarget) -> Self {
        MotionGoal::Joint(target)
    }
}

impl From<CartesianTarget> for MotionGoal {
    fn from(target: CartesianTarget) -> Self {
        MotionGoal::Cartesian(target)
    }
}

impl From<LinearCartesianTarget> for MotionGoal {
    fn from(target: LinearCartesianTarget) -> Self {
        MotionGoal::LinearCartesian(target)
    }
}

/// Discriminant of [`MotionGoal`], for logging and status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MotionKind {
    /// Joint-space target
    Joint,
    /// Cartesian target, free path
    Cartesian,
    /// Cartesian target, straight-line path
    LinearCartesian,
}

impl Display for MotionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MotionKind::Joint => write!(f, "joint"),
            MotionKind::Cartesian => write!(f, "cartesian"),
            MotionKind::LinearCartesian => write!(f, "linear cartesian"),
        }
    }
}

/// A motion goal together with the planner configuration to use for it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionRequest {
    /// What to move to
    pub goal: MotionGoal,
    /// How to plan it
    pub planner: PlannerConfig,
}

impl MotionRequest {
    /// Create a request.
    pub fn new(goal: impl Into<MotionGoal>, planner: PlannerConfig) -> Self {
        Self {
            goal: goal.into(),
            planner,
        }
    }

    /// Which variant this request is.
    pub fn kind(&self) -> MotionKind {
        match self.goal {
            MotionGoal::Joint(_) => MotionKind::Joint,
            MotionGoal::Cartesian(_) => MotionKind::Cartesian,
            MotionGoal::LinearCartesian(_) => MotionKind::LinearCartesian,
        }
    }

    /// Validate the planner configuration and the goal.
    pub fn validate(&self, joint_names: &[String]) -> Result<(), ValidationError> {
        self.planner.validate()?;
        match &self.goal {
            MotionGoal::Joint(target) => target.validate(joint_names),
            MotionGoal::Cartesian(CartesianTarget { pose })
            | MotionGoal::LinearCartesian(LinearCartesianTarget { pose }) => pose.validate(),
        }
    }
}

/// Final state reported on a requester's completion channel.
#[derive(Clone, Debug, PartialEq)]
pub enum MotionOutcome {
    /// Target reached (every segment, for linear motion)
    Succeeded,
    /// The request could not be carried out
    Failed(MotionError),
    /// Stopped by an explicit cancel
    Canceled,
    /// Superseded by a newer request
    Preempted,
}

impl MotionOutcome {
    /// True for [`MotionOutcome::Succeeded`].
    pub fn is_success(&self) -> bool {
        matches!(self, MotionOutcome::Succeeded)
    }
}

// ============================================================================
// Planning requests
// ============================================================================

/// Bind one joint to a target angle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointConstraint {
    /// Joint being constrained
    pub joint_name: String,
    /// Target angle (radians)
    pub position: f64,
    /// Allowed overshoot above the target
    pub tolerance_above: f64,
    /// Allowed undershoot below the target
    pub tolerance_below: f64,
    /// Relative importance
    pub weight: f64,
}

/// Region a constrained link origin must end up in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ConstraintRegion {
    /// Sphere of the given radius around the constraint center
    Sphere {
        /// Radius in meters
        radius: f64,
    },
}

/// Constrain a link's position to a region.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionConstraint {
    /// Link being constrained (the end effector)
    pub link_name: FrameId,
    /// Frame `center` is expressed in
    pub frame_id: FrameId,
    /// Center of the target region
    pub center: Vector3<f64>,
    /// Shape of the target region
    pub region: ConstraintRegion,
    /// Relative importance
    pub weight: f64,
}

/// Constrain a link's orientation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrientationConstraint {
    /// Link being constrained (the end effector)
    pub link_name: FrameId,
    /// Frame `orientation` is expressed in
    pub frame_id: FrameId,
    /// Target orientation
    pub orientation: UnitQuaternion<f64>,
    /// Allowed deviation about x (radians)
    pub absolute_x_axis_tolerance: f64,
    /// Allowed deviation about y (radians)
    pub absolute_y_axis_tolerance: f64,
    /// Allowed deviation about z (radians)
    pub absolute_z_axis_tolerance: f64,
    /// Relative importance
    pub weight: f64,
}

/// Backend-facing goal: constraints plus planner configuration.
///
/// Becomes a [`PlanningRequest`] once the arbitrator stamps a sequence number
/// on it at dispatch time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanningGoal {
    /// Reference frame of the constraints
    pub frame_id: FrameId,
    /// Stamp of the target the constraints came from
    pub stamp: f64,
    /// Copied verbatim from the motion request
    pub planner: PlannerConfig,
    /// Joint-space goal constraints
    pub joint_constraints: Vec<JointConstraint>,
    /// Cartesian position goal constraints
    pub position_constraints: Vec<PositionConstraint>,
    /// Cartesian orientation goal constraints
    pub orientation_constraints: Vec<OrientationConstraint>,
    /// Plan without executing
    pub plan_only: bool,
}

/// A [`PlanningGoal`] as dispatched to the backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanningRequest {
    /// Correlates the asynchronous result with this request
    pub sequence: SequenceNumber,
    /// What to plan and execute
    pub goal: PlanningGoal,
}

/// What the backend reports for one planning request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum PlanningResult {
    /// Planned and executed
    Succeeded,
    /// Planning or execution failed
    Aborted(String),
    /// Acknowledges a cancellation
    Canceled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joint_names() -> Vec<String> {
        (1..=3).map(|i| format!("joint_{}", i)).collect()
    }

    fn planner() -> PlannerConfig {
        PlannerConfig {
            move_group: "arm".into(),
            num_planning_attempts: 3,
            allowed_planning_time: 2.5,
            max_velocity_scaling_factor: 0.5,
            max_acceleration_scaling_factor: 1.0,
        }
    }

    #[test]
    fn test_joint_target_validation() {
        let names = joint_names();
        let full = JointTarget::new([("joint_1", 0.0), ("joint_2", 0.5), ("joint_3", -0.5)]);
        assert!(full.validate(&names).is_ok());

        let missing = JointTarget::new([("joint_1", 0.0), ("joint_3", -0.5)]);
        assert_eq!(
            missing.validate(&names),
            Err(ValidationError::MissingJoint("joint_2".into()))
        );

        let mut unknown = full.clone();
        unknown.positions.insert("gripper".into(), 0.1);
        assert_eq!(
            unknown.validate(&names),
            Err(ValidationError::UnknownJoint("gripper".into()))
        );

        let mut nan = full.clone();
        nan.positions.insert("joint_2".into(), f64::NAN);
        assert!(matches!(
            nan.validate(&names),
            Err(ValidationError::NonFiniteJoint { .. })
        ));

        assert_eq!(
            JointTarget::default().validate(&names),
            Err(ValidationError::EmptyJointSet)
        );
    }

    #[test]
    fn test_planner_config_validation() {
        assert!(planner().validate().is_ok());

        let mut config = planner();
        config.max_velocity_scaling_factor = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ScalingOutOfRange { name: "max_velocity_scaling_factor", .. })
        ));

        let mut config = planner();
        config.max_acceleration_scaling_factor = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::ScalingOutOfRange { name: "max_acceleration_scaling_factor", .. })
        ));

        let mut config = planner();
        config.num_planning_attempts = 0;
        assert_eq!(config.validate(), Err(ValidationError::NoPlanningAttempts));

        let mut config = planner();
        config.allowed_planning_time = -1.0;
        assert_eq!(config.validate(), Err(ValidationError::NonPositivePlanningTime(-1.0)));
    }

    #[test]
    fn test_fractional_planner_values_survive() {
        // Fractional scaling and planning time must not be truncated
        let config = planner();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PlannerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.allowed_planning_time, 2.5);
        assert_eq!(parsed.max_velocity_scaling_factor, 0.5);
    }

    #[test]
    fn test_request_kind_and_validation() {
        let pose = StampedPose::from_translation(0.4, 0.0, 0.6, FrameId::World);
        let request = MotionRequest::new(LinearCartesianTarget { pose }, planner());
        assert_eq!(request.kind(), MotionKind::LinearCartesian);
        assert!(request.validate(&joint_names()).is_ok());

        let mut bad = request.clone();
        bad.planner.move_group = String::new();
        assert_eq!(bad.validate(&joint_names()), Err(ValidationError::EmptyMoveGroup));
    }

    #[test]
    fn test_sequence_numbers_increase() {
        let first = SequenceNumber::FIRST;
        assert!(first.next() > first);
        assert_eq!(first.next(), SequenceNumber(2));
    }
}
