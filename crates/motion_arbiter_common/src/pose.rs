//! Stamped pose type using Isometry3 (SE3) representation.

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::frame::FrameId;

/// Tolerance on `|q| - 1` for an orientation to count as unit length.
pub const UNIT_NORM_TOLERANCE: f64 = 1e-6;

/// Stamp meaning "the latest available data" in frame lookups.
pub const LATEST: f64 = 0.0;

/// Pose in a named frame at a point in time.
///
/// Uses nalgebra's `Isometry3<f64>` internally, which stores:
/// - Translation as Vector3<f64> (x, y, z in meters)
/// - Rotation as UnitQuaternion<f64>
///
/// A deserialized pose is not re-normalized, so requests coming off the wire
/// go through [`StampedPose::validate`] before anything else touches them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StampedPose {
    /// The SE3 transform (position + orientation)
    pub transform: Isometry3<f64>,

    /// The frame this pose is expressed in
    pub frame_id: FrameId,

    /// Seconds; [`LATEST`] when the pose is not tied to a time
    pub stamp: f64,
}

impl StampedPose {
    /// Create a new stamped pose at [`LATEST`].
    pub fn new(transform: Isometry3<f64>, frame_id: FrameId) -> Self {
        Self {
            transform,
            frame_id,
            stamp: LATEST,
        }
    }

    /// Create a pose from translation only (identity rotation).
    pub fn from_translation(x: f64, y: f64, z: f64, frame_id: FrameId) -> Self {
        Self::new(Isometry3::translation(x, y, z), frame_id)
    }

    /// Create a pose from a position and roll/pitch/yaw in radians.
    pub fn from_xyz_rpy(
        x: f64, y: f64, z: f64,
        roll: f64, pitch: f64, yaw: f64,
        frame_id: FrameId,
    ) -> Self {
        let transform = Isometry3::from_parts(
            Translation3::new(x, y, z),
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
        );
        Self::new(transform, frame_id)
    }

    /// Set the stamp and return self for chaining.
    pub fn with_stamp(mut self, stamp: f64) -> Self {
        self.stamp = stamp;
        self
    }

    /// Position vector.
    pub fn position(&self) -> &Vector3<f64> {
        &self.transform.translation.vector
    }

    /// Orientation quaternion.
    pub fn orientation(&self) -> &UnitQuaternion<f64> {
        &self.transform.rotation
    }

    /// Euclidean distance between the two positions.
    pub fn distance_to(&self, other: &StampedPose) -> f64 {
        (other.position() - self.position()).norm()
    }

    /// Check the invariants interpolation relies on: finite position,
    /// unit-norm orientation, non-blank frame.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.frame_id.is_blank() {
            return Err(ValidationError::EmptyFrame);
        }
        if !self.position().iter().all(|c| c.is_finite()) {
            return Err(ValidationError::NonFinitePosition);
        }
        let norm = self.orientation().quaternion().norm();
        if !norm.is_finite() || (norm - 1.0).abs() > UNIT_NORM_TOLERANCE {
            return Err(ValidationError::NonUnitOrientation { norm });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Quaternion;

    #[test]
    fn test_pose_from_translation() {
        let pose = StampedPose::from_translation(0.1, 0.2, 0.3, FrameId::World);
        assert!((pose.position().x - 0.1).abs() < 1e-12);
        assert!((pose.position().y - 0.2).abs() < 1e-12);
        assert!((pose.position().z - 0.3).abs() < 1e-12);
        assert_eq!(pose.stamp, LATEST);
        assert!(pose.validate().is_ok());
    }

    #[test]
    fn test_distance() {
        let a = StampedPose::from_translation(0.0, 0.0, 0.0, FrameId::World);
        let b = StampedPose::from_translation(0.3, 0.4, 0.0, FrameId::World);
        assert!((a.distance_to(&b) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_non_unit_orientation() {
        let mut pose = StampedPose::from_translation(0.0, 0.0, 0.5, FrameId::World);
        pose.transform.rotation = UnitQuaternion::new_unchecked(Quaternion::new(2.0, 0.0, 0.0, 0.0));
        assert!(matches!(
            pose.validate(),
            Err(ValidationError::NonUnitOrientation { .. })
        ));

        pose.transform.rotation = UnitQuaternion::new_unchecked(Quaternion::new(0.0, 0.0, 0.0, 0.0));
        assert!(matches!(
            pose.validate(),
            Err(ValidationError::NonUnitOrientation { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_nan_and_blank_frame() {
        let pose = StampedPose::from_translation(f64::NAN, 0.0, 0.0, FrameId::World);
        assert_eq!(pose.validate(), Err(ValidationError::NonFinitePosition));

        let pose = StampedPose::from_translation(0.0, 0.0, 0.0, FrameId::Named(String::new()));
        assert_eq!(pose.validate(), Err(ValidationError::EmptyFrame));
    }
}
