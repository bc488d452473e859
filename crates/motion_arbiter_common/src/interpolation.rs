//! Pose interpolation and straight-line waypoint generation.
//!
//! Pure functions, no state. Positions are interpolated affinely and
//! orientations by spherical interpolation along the shortest arc, with the
//! result renormalized so repeated interpolation cannot drift off the unit
//! sphere.

use std::iter::FusedIterator;

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion};

use crate::error::ValidationError;
use crate::pose::StampedPose;

/// Below this angle between the two orientations, slerp degenerates to a
/// normalized lerp (sin(theta) is too small to divide by).
const SLERP_LINEAR_THRESHOLD: f64 = 1e-6;

/// Interpolate between two poses in the same frame.
///
/// `w` is the weight of `p2`: 0 yields `p1`, 1 yields `p2`. Values outside
/// [0, 1] extrapolate; nothing is clamped. Frame and stamp come from `p1`.
pub fn interpolate_pose(p1: &StampedPose, p2: &StampedPose, w: f64) -> StampedPose {
    let position = p1.position() * (1.0 - w) + p2.position() * w;
    let rotation = slerp_shortest(p1.orientation(), p2.orientation(), w);

    StampedPose {
        transform: Isometry3::from_parts(Translation3::from(position), rotation),
        frame_id: p1.frame_id.clone(),
        stamp: p1.stamp,
    }
}

/// Spherical interpolation that always takes the short way round.
///
/// `q` and `-q` encode the same rotation; `to` is flipped onto the hemisphere
/// of `from` before interpolating.
pub fn slerp_shortest(
    from: &UnitQuaternion<f64>,
    to: &UnitQuaternion<f64>,
    w: f64,
) -> UnitQuaternion<f64> {
    let a = from.quaternion().coords;
    let mut b = to.quaternion().coords;

    let mut cos_theta = a.dot(&b);
    if cos_theta < 0.0 {
        b = -b;
        cos_theta = -cos_theta;
    }

    let theta = cos_theta.min(1.0).acos();
    let coords = if theta < SLERP_LINEAR_THRESHOLD {
        a * (1.0 - w) + b * w
    } else {
        let sin_theta = theta.sin();
        a * (((1.0 - w) * theta).sin() / sin_theta) + b * ((w * theta).sin() / sin_theta)
    };

    UnitQuaternion::new_normalize(Quaternion::from(coords))
}

/// Waypoints on the straight line from `p1` (excluded) to `p2` (included).
///
/// The number of waypoints is `ceil(distance / step_size)`, at least one, so
/// a pure rotation still yields the target. Consecutive waypoints are at most
/// `step_size` apart. A count that does not fit in `usize` is a
/// [`ValidationError::TooManyWaypoints`].
pub fn interpolate_linear(
    p1: &StampedPose,
    p2: &StampedPose,
    step_size: f64,
) -> Result<LinearWaypoints, ValidationError> {
    if !(step_size.is_finite() && step_size > 0.0) {
        return Err(ValidationError::NonPositiveStepSize(step_size));
    }

    let distance = p1.distance_to(p2);
    let steps = (distance / step_size).ceil();
    // Also false for NaN and infinity
    if !(steps < usize::MAX as f64) {
        return Err(ValidationError::TooManyWaypoints {
            distance,
            step_size,
            limit: usize::MAX,
        });
    }
    let steps = (steps as usize).max(1);

    Ok(LinearWaypoints {
        start: p1.clone(),
        target: p2.clone(),
        steps,
        emitted: 0,
    })
}

/// Lazy, finite sequence produced by [`interpolate_linear`].
///
/// Cloning or calling [`LinearWaypoints::restart`] replays it from the first
/// waypoint.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearWaypoints {
    start: StampedPose,
    target: StampedPose,
    steps: usize,
    emitted: usize,
}

impl LinearWaypoints {
    /// Total number of waypoints, independent of iteration progress.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Rewind to the first waypoint.
    pub fn restart(&mut self) {
        self.emitted = 0;
    }
}

impl Iterator for LinearWaypoints {
    type Item = StampedPose;

    fn next(&mut self) -> Option<Self::Item> {
        if self.emitted >= self.steps {
            return None;
        }
        self.emitted += 1;

        if self.emitted == self.steps {
            // Last waypoint is the target itself, not an approximation of it
            return Some(self.target.clone());
        }

        let w = self.emitted as f64 / self.steps as f64;
        Some(interpolate_pose(&self.start, &self.target, w))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.steps - self.emitted;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for LinearWaypoints {}

impl FusedIterator for LinearWaypoints {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameId;
    use nalgebra::Vector3;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn pose(x: f64, y: f64, z: f64, rotation: UnitQuaternion<f64>) -> StampedPose {
        StampedPose::new(
            Isometry3::from_parts(Translation3::new(x, y, z), rotation),
            FrameId::World,
        )
    }

    fn same_rotation(a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>) -> bool {
        a.quaternion().coords.dot(&b.quaternion().coords).abs() > 1.0 - 1e-9
    }

    fn sample_rotations() -> Vec<UnitQuaternion<f64>> {
        vec![
            UnitQuaternion::identity(),
            UnitQuaternion::from_euler_angles(0.3, -1.2, 2.9),
            UnitQuaternion::from_euler_angles(PI, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI - 1e-9),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 1e-9),
            UnitQuaternion::from_euler_angles(-2.0, 0.7, -0.1),
        ]
    }

    #[test]
    fn test_interpolated_orientation_stays_unit() {
        let rotations = sample_rotations();
        for q1 in &rotations {
            for q2 in &rotations {
                for i in 0..=20 {
                    let w = i as f64 / 20.0;
                    let result = slerp_shortest(q1, q2, w);
                    let norm = result.quaternion().norm();
                    assert!((norm - 1.0).abs() < 1e-12, "norm {} at w={}", norm, w);
                }
            }
        }
    }

    #[test]
    fn test_endpoints_reproduce_inputs() {
        let p1 = pose(0.1, -0.2, 0.4, UnitQuaternion::from_euler_angles(0.3, 0.2, 0.1));
        let p2 = pose(0.5, 0.2, 0.1, UnitQuaternion::from_euler_angles(-1.0, 0.5, 2.0));

        let at_start = interpolate_pose(&p1, &p2, 0.0);
        assert!((at_start.position() - p1.position()).norm() < 1e-12);
        assert!(same_rotation(at_start.orientation(), p1.orientation()));

        let at_end = interpolate_pose(&p1, &p2, 1.0);
        assert!((at_end.position() - p2.position()).norm() < 1e-12);
        assert!(same_rotation(at_end.orientation(), p2.orientation()));
    }

    #[test]
    fn test_frame_and_stamp_come_from_first_pose() {
        let p1 = pose(0.0, 0.0, 0.0, UnitQuaternion::identity()).with_stamp(12.5);
        let p2 = pose(1.0, 0.0, 0.0, UnitQuaternion::identity()).with_stamp(99.0);
        let mid = interpolate_pose(&p1, &p2, 0.5);
        assert_eq!(mid.stamp, 12.5);
        assert_eq!(mid.frame_id, FrameId::World);
        assert!((mid.position().x - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_weight_outside_unit_interval_extrapolates() {
        let p1 = pose(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let p2 = pose(1.0, 0.0, 0.0, UnitQuaternion::identity());
        let beyond = interpolate_pose(&p1, &p2, 1.5);
        assert!((beyond.position().x - 1.5).abs() < 1e-12);
        let before = interpolate_pose(&p1, &p2, -0.5);
        assert!((before.position().x + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_shortest_arc_is_selected_for_negated_quaternion() {
        let q1 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.2);
        let target = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.6);
        // Same rotation as `target`, opposite sign
        let negated = UnitQuaternion::new_unchecked(-target.into_inner());

        let mid = slerp_shortest(&q1, &negated, 0.5);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.4);
        assert!(same_rotation(&mid, &expected));
        assert!(mid.angle_to(&q1) < 0.2 + 1e-9);
    }

    #[test]
    fn test_shortest_arc_across_pi() {
        // 170 degrees to -170 degrees about z is a 20 degree move, not 340
        let q1 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 170f64.to_radians());
        let q2 = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), (-170f64).to_radians());

        let mid = slerp_shortest(&q1, &q2, 0.5);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), PI);
        assert!(same_rotation(&mid, &expected), "mid = {:?}", mid.euler_angles());

        for i in 0..=10 {
            let q = slerp_shortest(&q1, &q2, i as f64 / 10.0);
            assert!(q.angle_to(&q1) <= 20f64.to_radians() + 1e-9);
        }
    }

    #[test]
    fn test_nearly_identical_orientations_do_not_blow_up() {
        let q1 = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2);
        let q2 = UnitQuaternion::from_axis_angle(&Vector3::x_axis(), FRAC_PI_2 + 1e-12);
        let mid = slerp_shortest(&q1, &q2, 0.5);
        assert!(mid.quaternion().coords.iter().all(|c| c.is_finite()));
        assert!(same_rotation(&mid, &q1));
    }

    #[test]
    fn test_linear_example_steps() {
        let p1 = pose(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let p2 = pose(0.0, 0.0, 1.0, UnitQuaternion::identity());

        let waypoints: Vec<_> = interpolate_linear(&p1, &p2, 0.3).unwrap().collect();
        let z: Vec<f64> = waypoints.iter().map(|p| p.position().z).collect();

        assert_eq!(z.len(), 4);
        for (actual, expected) in z.iter().zip([0.25, 0.5, 0.75, 1.0]) {
            assert!((actual - expected).abs() < 1e-12, "{} != {}", actual, expected);
        }
    }

    #[test]
    fn test_linear_ends_exactly_at_target_with_bounded_spacing() {
        let cases = [
            (pose(0.0, 0.0, 0.0, UnitQuaternion::identity()), pose(0.4, -0.3, 0.2, UnitQuaternion::from_euler_angles(0.0, 0.0, 3.0)), 0.01),
            (pose(0.5, 0.5, 0.5, UnitQuaternion::from_euler_angles(1.0, 0.0, 0.0)), pose(0.5, 0.5, 0.6, UnitQuaternion::identity()), 0.3),
            (pose(-1.0, 2.0, 0.0, UnitQuaternion::identity()), pose(1.0, -2.0, 0.3, UnitQuaternion::identity()), 0.001),
            (pose(0.0, 0.0, 0.0, UnitQuaternion::identity()), pose(0.9, 0.0, 0.0, UnitQuaternion::identity()), 0.3),
        ];

        for (p1, p2, step) in cases {
            let waypoints: Vec<_> = interpolate_linear(&p1, &p2, step).unwrap().collect();
            assert_eq!(waypoints.last(), Some(&p2));

            let mut previous = p1.clone();
            for waypoint in &waypoints {
                let delta = previous.distance_to(waypoint);
                assert!(delta <= step + 1e-12, "delta {} > step {}", delta, step);
                previous = waypoint.clone();
            }
        }
    }

    #[test]
    fn test_zero_distance_yields_single_target() {
        let p1 = pose(0.2, 0.2, 0.2, UnitQuaternion::identity());
        let p2 = pose(0.2, 0.2, 0.2, UnitQuaternion::from_euler_angles(0.0, FRAC_PI_2, 0.0));

        let waypoints: Vec<_> = interpolate_linear(&p1, &p2, 0.001).unwrap().collect();
        assert_eq!(waypoints, vec![p2.clone()]);

        let identical: Vec<_> = interpolate_linear(&p1, &p1, 0.5).unwrap().collect();
        assert_eq!(identical, vec![p1]);
    }

    #[test]
    fn test_linear_is_lazy_and_restartable() {
        let p1 = pose(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let p2 = pose(1.0, 0.0, 0.0, UnitQuaternion::identity());

        let mut waypoints = interpolate_linear(&p1, &p2, 0.1).unwrap();
        assert_eq!(waypoints.steps(), 10);
        assert_eq!(waypoints.len(), 10);

        let first_pass: Vec<_> = waypoints.by_ref().take(3).collect();
        assert_eq!(waypoints.len(), 7);

        waypoints.restart();
        let replay: Vec<_> = waypoints.clone().take(3).collect();
        assert_eq!(first_pass, replay);
        assert_eq!(waypoints.count(), 10);
    }

    #[test]
    fn test_far_target_stays_lazy() {
        let p1 = pose(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let p2 = pose(1e12, 0.0, 0.0, UnitQuaternion::identity());

        let mut waypoints = interpolate_linear(&p1, &p2, 0.001).unwrap();
        assert_eq!(waypoints.steps(), 1_000_000_000_000_000);
        let first = waypoints.next().unwrap();
        assert!((first.position().x - 0.001).abs() < 1e-6);
    }

    #[test]
    fn test_unrepresentable_waypoint_count_rejected() {
        let p1 = pose(0.0, 0.0, 0.0, UnitQuaternion::identity());
        let p2 = pose(1e300, 0.0, 0.0, UnitQuaternion::identity());

        let err = interpolate_linear(&p1, &p2, 0.001).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::TooManyWaypoints { limit: usize::MAX, .. }
        ));

        let overflowing = pose(f64::MAX, f64::MAX, 0.0, UnitQuaternion::identity());
        let behind = pose(-f64::MAX, 0.0, 0.0, UnitQuaternion::identity());
        assert!(interpolate_linear(&behind, &overflowing, 1.0).is_err());
    }

    #[test]
    fn test_linear_rejects_bad_step() {
        let p = pose(0.0, 0.0, 0.0, UnitQuaternion::identity());
        for step in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                interpolate_linear(&p, &p, step),
                Err(ValidationError::NonPositiveStepSize(_))
            ));
        }
    }
}
