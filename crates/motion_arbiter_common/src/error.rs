//! Error taxonomy for motion requests.
//!
//! Every error is scoped to a single request. Validation errors are returned
//! straight from the submit call; the rest arrive on the requester's
//! completion channel inside [`MotionOutcome::Failed`](crate::MotionOutcome::Failed).

use thiserror::Error;

use crate::frame::FrameId;

/// A malformed request or setting. Rejected before anything is queued.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// No joints configured or none targeted
    #[error("Joint set is empty")]
    EmptyJointSet,

    /// A joint required by the move group has no target angle
    #[error("Missing target for joint '{0}'")]
    MissingJoint(String),

    /// A target names a joint the move group does not have
    #[error("Unknown joint '{0}'")]
    UnknownJoint(String),

    /// A joint target angle is NaN or infinite
    #[error("Joint '{joint}' has non-finite target {value}")]
    NonFiniteJoint {
        /// Offending joint
        joint: String,
        /// Offending value
        value: f64,
    },

    /// A pose position has a NaN or infinite coordinate
    #[error("Pose position is not finite")]
    NonFinitePosition,

    /// A pose orientation is not a unit quaternion
    #[error("Pose orientation is not unit length (norm {norm})")]
    NonUnitOrientation {
        /// Norm of the supplied quaternion
        norm: f64,
    },

    /// A pose has no usable reference frame
    #[error("Pose has an empty reference frame")]
    EmptyFrame,

    /// The move group name is empty
    #[error("Move group name is empty")]
    EmptyMoveGroup,

    /// Planning needs at least one attempt
    #[error("Number of planning attempts must be at least 1")]
    NoPlanningAttempts,

    /// Planning time must be positive and finite
    #[error("Allowed planning time must be positive, got {0}")]
    NonPositivePlanningTime(f64),

    /// A velocity or acceleration scaling factor outside (0, 1]
    #[error("Scaling factor '{name}' must be in (0, 1], got {value}")]
    ScalingOutOfRange {
        /// Which factor
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Linear interpolation step size must be positive and finite
    #[error("Step size must be positive, got {0}")]
    NonPositiveStepSize(f64),

    /// A constraint tolerance must be positive and finite
    #[error("Tolerance '{name}' must be positive, got {value}")]
    NonPositiveTolerance {
        /// Which tolerance
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// A straight-line motion would need more waypoints than allowed
    #[error("Moving {distance} m in {step_size} m steps needs more than {limit} waypoints")]
    TooManyWaypoints {
        /// Straight-line distance to cover, meters
        distance: f64,
        /// Configured step size, meters
        step_size: f64,
        /// Largest allowed number of waypoints
        limit: usize,
    },

    /// The waypoint cap must allow at least one segment
    #[error("Linear segment limit must be at least 1")]
    ZeroSegmentLimit,

    /// A linear target was translated without the current end-effector pose
    #[error("Linear motion needs the current end-effector pose")]
    MissingStartPose,

    /// Frame lookup timeout must be positive and finite
    #[error("Frame lookup timeout must be positive, got {0}")]
    NonPositiveTimeout(f64),

    /// Frame lookup timeout above the supported bound
    #[error("Frame lookup timeout must be at most {max}s, got {value}")]
    TimeoutTooLong {
        /// Offending value, seconds
        value: f64,
        /// Upper bound, seconds
        max: f64,
    },
}

/// The current end-effector pose could not be resolved.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrameLookupError {
    /// No answer within the bounded wait
    #[error("Timed out after {waited_secs:.3}s looking up '{target}' in '{reference}'")]
    Timeout {
        /// Frame being looked up
        target: FrameId,
        /// Frame the answer was requested in
        reference: FrameId,
        /// How long the arbiter waited
        waited_secs: f64,
    },

    /// The lookup service answered with an error
    #[error("Transform '{target}' -> '{reference}' unavailable: {reason}")]
    Unavailable {
        /// Frame being looked up
        target: FrameId,
        /// Frame the answer was requested in
        reference: FrameId,
        /// Service-provided reason
        reason: String,
    },

    /// The lookup answered in a different frame than the one requested
    #[error("Lookup answered in frame '{actual}', expected '{expected}'")]
    FrameMismatch {
        /// Frame that was requested
        expected: FrameId,
        /// Frame that came back
        actual: FrameId,
    },
}

/// Why a motion request did not succeed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MotionError {
    /// Malformed request
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Start pose for a linear motion was unavailable
    #[error("Frame lookup failed: {0}")]
    FrameLookup(#[from] FrameLookupError),

    /// The planning/execution backend aborted
    #[error("Backend failure: {reason}")]
    Backend {
        /// Backend-provided reason
        reason: String,
    },

    /// The arbiter was dropped before the request finished
    #[error("Motion arbiter shut down before the request completed")]
    ArbiterShutdown,
}

/// Settings could not be loaded.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Settings file could not be read
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// Settings were not valid JSON for [`ArbiterSettings`](crate::ArbiterSettings)
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// Settings parsed but failed validation
    #[error("Invalid settings: {0}")]
    Invalid(#[from] ValidationError),
}
