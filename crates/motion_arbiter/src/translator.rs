//! Turns motion requests into backend planning goals.
//!
//! Joint targets become joint constraints, Cartesian targets become one
//! position plus one orientation constraint on the end effector, and linear
//! Cartesian targets become one tightly constrained goal per waypoint on the
//! straight line from the current end-effector pose. Planner configuration is
//! copied verbatim into every goal.

use std::collections::VecDeque;
use std::iter::FusedIterator;

use motion_arbiter_common::{
    ArbiterSettings, CartesianTarget, ConstraintRegion, FrameId, JointConstraint, JointTarget,
    LATEST, LinearCartesianTarget, LinearWaypoints, MotionGoal, MotionRequest,
    OrientationConstraint, PlannerConfig, PlanningGoal, PositionConstraint, StampedPose,
    ValidationError, interpolate_linear,
};

/// Stateless translator; borrows the settings it reads frames and
/// tolerances from.
#[derive(Clone, Copy, Debug)]
pub struct GoalTranslator<'a> {
    settings: &'a ArbiterSettings,
}

impl<'a> GoalTranslator<'a> {
    /// Translator for the given settings.
    pub fn new(settings: &'a ArbiterSettings) -> Self {
        Self { settings }
    }

    /// Translate any request. Linear requests need the current end-effector
    /// pose as `start`; the other variants ignore it.
    pub fn translate(
        &self,
        request: &MotionRequest,
        start: Option<&StampedPose>,
    ) -> Result<GoalSegments, ValidationError> {
        match &request.goal {
            MotionGoal::Joint(target) => Ok(self.translate_joint(target, &request.planner).into()),
            MotionGoal::Cartesian(target) => {
                Ok(self.translate_cartesian(target, &request.planner).into())
            }
            MotionGoal::LinearCartesian(target) => {
                let start = start.ok_or(ValidationError::MissingStartPose)?;
                self.translate_linear(target, start, &request.planner)
            }
        }
    }

    /// One joint constraint per configured joint, in configured order.
    pub fn translate_joint(&self, target: &JointTarget, planner: &PlannerConfig) -> PlanningGoal {
        let tolerance = self.settings.tolerances.joint;
        let joint_constraints = self
            .settings
            .joint_names
            .iter()
            .filter_map(|name| {
                target.positions.get(name).map(|angle| JointConstraint {
                    joint_name: name.clone(),
                    position: *angle,
                    tolerance_above: tolerance,
                    tolerance_below: tolerance,
                    weight: 1.0,
                })
            })
            .collect();

        PlanningGoal {
            frame_id: FrameId::World,
            stamp: LATEST,
            planner: planner.clone(),
            joint_constraints,
            position_constraints: Vec::new(),
            orientation_constraints: Vec::new(),
            plan_only: self.settings.plan_only,
        }
    }

    /// Position and orientation constraint on the end effector; the planner
    /// picks the path.
    pub fn translate_cartesian(
        &self,
        target: &CartesianTarget,
        planner: &PlannerConfig,
    ) -> PlanningGoal {
        let tolerances = &self.settings.tolerances;
        self.pose_shape(planner, tolerances.position, tolerances.orientation)
            .goal(&target.pose)
    }

    /// One goal per waypoint from `start` (excluded) to the target (included),
    /// generated as the sequence is consumed.
    ///
    /// Fails with [`ValidationError::TooManyWaypoints`] when the line needs
    /// more than `max_linear_segments` waypoints.
    pub fn translate_linear(
        &self,
        target: &LinearCartesianTarget,
        start: &StampedPose,
        planner: &PlannerConfig,
    ) -> Result<GoalSegments, ValidationError> {
        let step_size = self.settings.linear_step_size;
        let limit = self.settings.max_linear_segments;
        let waypoints = interpolate_linear(start, &target.pose, step_size)?;
        if waypoints.steps() > limit {
            return Err(ValidationError::TooManyWaypoints {
                distance: start.distance_to(&target.pose),
                step_size,
                limit,
            });
        }

        let tolerances = &self.settings.tolerances;
        Ok(GoalSegments {
            source: SegmentSource::Waypoints {
                waypoints,
                shape: self.pose_shape(
                    planner,
                    tolerances.linear_position,
                    tolerances.linear_orientation,
                ),
                stamp: target.pose.stamp,
            },
        })
    }

    fn pose_shape(
        &self,
        planner: &PlannerConfig,
        position_tolerance: f64,
        orientation_tolerance: f64,
    ) -> PoseGoalShape {
        PoseGoalShape {
            link_name: self.settings.ee_frame.clone(),
            planner: planner.clone(),
            position_tolerance,
            orientation_tolerance,
            plan_only: self.settings.plan_only,
        }
    }
}

/// Everything a pose goal needs besides the pose itself.
#[derive(Clone, Debug, PartialEq)]
struct PoseGoalShape {
    link_name: FrameId,
    planner: PlannerConfig,
    position_tolerance: f64,
    orientation_tolerance: f64,
    plan_only: bool,
}

impl PoseGoalShape {
    fn goal(&self, pose: &StampedPose) -> PlanningGoal {
        PlanningGoal {
            frame_id: pose.frame_id.clone(),
            stamp: pose.stamp,
            planner: self.planner.clone(),
            joint_constraints: Vec::new(),
            position_constraints: vec![PositionConstraint {
                link_name: self.link_name.clone(),
                frame_id: pose.frame_id.clone(),
                center: *pose.position(),
                region: ConstraintRegion::Sphere {
                    radius: self.position_tolerance,
                },
                weight: 1.0,
            }],
            orientation_constraints: vec![OrientationConstraint {
                link_name: self.link_name.clone(),
                frame_id: pose.frame_id.clone(),
                orientation: *pose.orientation(),
                absolute_x_axis_tolerance: self.orientation_tolerance,
                absolute_y_axis_tolerance: self.orientation_tolerance,
                absolute_z_axis_tolerance: self.orientation_tolerance,
                weight: 1.0,
            }],
            plan_only: self.plan_only,
        }
    }
}

/// The planning goals of one request, in execution order.
///
/// Linear motions are produced one waypoint at a time, so only the segment
/// being dispatched ever exists as a [`PlanningGoal`].
#[derive(Clone, Debug, PartialEq)]
pub struct GoalSegments {
    source: SegmentSource,
}

#[derive(Clone, Debug, PartialEq)]
enum SegmentSource {
    Queued(VecDeque<PlanningGoal>),
    Waypoints {
        waypoints: LinearWaypoints,
        shape: PoseGoalShape,
        stamp: f64,
    },
}

impl From<PlanningGoal> for GoalSegments {
    fn from(goal: PlanningGoal) -> Self {
        Self {
            source: SegmentSource::Queued(VecDeque::from([goal])),
        }
    }
}

impl FromIterator<PlanningGoal> for GoalSegments {
    fn from_iter<I: IntoIterator<Item = PlanningGoal>>(goals: I) -> Self {
        Self {
            source: SegmentSource::Queued(goals.into_iter().collect()),
        }
    }
}

impl Iterator for GoalSegments {
    type Item = PlanningGoal;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            SegmentSource::Queued(goals) => goals.pop_front(),
            SegmentSource::Waypoints {
                waypoints,
                shape,
                stamp,
            } => waypoints.next().map(|waypoint| {
                let mut goal = shape.goal(&waypoint);
                goal.stamp = *stamp;
                goal
            }),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.source {
            SegmentSource::Queued(goals) => (goals.len(), Some(goals.len())),
            SegmentSource::Waypoints { waypoints, .. } => waypoints.size_hint(),
        }
    }
}

impl ExactSizeIterator for GoalSegments {}

impl FusedIterator for GoalSegments {}

#[cfg(test)]
mod tests {
    use super::*;
    use motion_arbiter_common::MotionKind;
    use nalgebra::UnitQuaternion;

    fn planner() -> PlannerConfig {
        PlannerConfig {
            move_group: "iiwa".into(),
            num_planning_attempts: 4,
            allowed_planning_time: 2.5,
            max_velocity_scaling_factor: 0.2,
            max_acceleration_scaling_factor: 0.4,
        }
    }

    fn full_joint_target(settings: &ArbiterSettings) -> JointTarget {
        JointTarget::new(
            settings
                .joint_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i as f64 * 0.1)),
        )
    }

    #[test]
    fn test_joint_translation() {
        let settings = ArbiterSettings::default();
        let translator = GoalTranslator::new(&settings);
        let request = MotionRequest::new(full_joint_target(&settings), planner());

        let goals: Vec<_> = translator.translate(&request, None).unwrap().collect();
        assert_eq!(goals.len(), 1);
        let goal = &goals[0];

        assert_eq!(goal.joint_constraints.len(), 7);
        assert!(goal.position_constraints.is_empty());
        assert!(goal.orientation_constraints.is_empty());
        assert_eq!(goal.planner, planner());

        for (i, constraint) in goal.joint_constraints.iter().enumerate() {
            assert_eq!(constraint.joint_name, settings.joint_names[i]);
            assert!((constraint.position - i as f64 * 0.1).abs() < 1e-12);
            assert_eq!(constraint.tolerance_above, settings.tolerances.joint);
            assert_eq!(constraint.tolerance_below, settings.tolerances.joint);
        }
    }

    #[test]
    fn test_cartesian_translation() {
        let settings = ArbiterSettings::default();
        let translator = GoalTranslator::new(&settings);
        let pose = StampedPose::from_xyz_rpy(0.5, 0.1, 0.7, 0.0, 3.1, 0.0, FrameId::named("iiwa_link_0"))
            .with_stamp(3.0);
        let request = MotionRequest::new(CartesianTarget { pose: pose.clone() }, planner());

        let goals: Vec<_> = translator.translate(&request, None).unwrap().collect();
        assert_eq!(goals.len(), 1);
        let goal = &goals[0];

        assert!(goal.joint_constraints.is_empty());
        assert_eq!(goal.frame_id, pose.frame_id);
        assert_eq!(goal.stamp, 3.0);
        assert_eq!(goal.planner, planner());

        let position = &goal.position_constraints[0];
        assert_eq!(position.link_name, settings.ee_frame);
        assert_eq!(position.center, *pose.position());
        assert_eq!(
            position.region,
            ConstraintRegion::Sphere { radius: settings.tolerances.position }
        );

        let orientation = &goal.orientation_constraints[0];
        assert_eq!(orientation.orientation, *pose.orientation());
        assert_eq!(orientation.absolute_z_axis_tolerance, settings.tolerances.orientation);
    }

    #[test]
    fn test_linear_translation_emits_one_goal_per_waypoint() {
        let mut settings = ArbiterSettings::default();
        settings.linear_step_size = 0.3;
        let translator = GoalTranslator::new(&settings);

        let start = StampedPose::from_translation(0.0, 0.0, 0.0, FrameId::World);
        let mut target = StampedPose::from_translation(0.0, 0.0, 1.0, FrameId::World);
        target.transform.rotation = UnitQuaternion::from_euler_angles(0.0, 0.0, 1.0);
        let request = MotionRequest::new(LinearCartesianTarget { pose: target.clone() }, planner());
        assert_eq!(request.kind(), MotionKind::LinearCartesian);

        let goals = translator.translate(&request, Some(&start)).unwrap();
        assert_eq!(goals.len(), 4);
        let goals: Vec<_> = goals.collect();

        for (goal, z) in goals.iter().zip([0.25, 0.5, 0.75, 1.0]) {
            assert_eq!(goal.planner, planner());
            let position = &goal.position_constraints[0];
            assert!((position.center.z - z).abs() < 1e-12);
            assert_eq!(
                position.region,
                ConstraintRegion::Sphere { radius: settings.tolerances.linear_position }
            );
            assert_eq!(
                goal.orientation_constraints[0].absolute_x_axis_tolerance,
                settings.tolerances.linear_orientation
            );
        }

        let last = goals.last().unwrap();
        assert_eq!(last.orientation_constraints[0].orientation, *target.orientation());
    }

    #[test]
    fn test_linear_pure_rotation_still_moves() {
        let settings = ArbiterSettings::default();
        let translator = GoalTranslator::new(&settings);
        let start = StampedPose::from_translation(0.4, 0.0, 0.4, FrameId::World);
        let target = StampedPose::from_xyz_rpy(0.4, 0.0, 0.4, 0.0, 0.0, 1.5, FrameId::World);

        let goals = translator
            .translate_linear(&LinearCartesianTarget { pose: target }, &start, &planner())
            .unwrap();
        assert_eq!(goals.len(), 1);
    }

    #[test]
    fn test_linear_without_start_pose_rejected() {
        let settings = ArbiterSettings::default();
        let translator = GoalTranslator::new(&settings);
        let target = StampedPose::from_translation(0.4, 0.0, 0.4, FrameId::World);
        let request = MotionRequest::new(LinearCartesianTarget { pose: target }, planner());

        assert_eq!(
            translator.translate(&request, None),
            Err(ValidationError::MissingStartPose)
        );
    }

    #[test]
    fn test_far_linear_target_rejected_without_allocating() {
        let settings = ArbiterSettings::default();
        let translator = GoalTranslator::new(&settings);
        let origin = StampedPose::from_translation(0.0, 0.0, 0.0, FrameId::World);

        for x in [1e6, 1e300] {
            let far = StampedPose::from_translation(x, 0.0, 0.0, FrameId::World);
            let request = MotionRequest::new(LinearCartesianTarget { pose: far }, planner());
            assert!(request.validate(&settings.joint_names).is_ok());

            let err = translator.translate(&request, Some(&origin)).unwrap_err();
            assert!(
                matches!(err, ValidationError::TooManyWaypoints { .. }),
                "{} m: {:?}",
                x,
                err
            );
        }
    }

    #[test]
    fn test_linear_segments_are_generated_on_demand() {
        let mut settings = ArbiterSettings::default();
        settings.max_linear_segments = usize::MAX;
        let translator = GoalTranslator::new(&settings);
        let origin = StampedPose::from_translation(0.0, 0.0, 0.0, FrameId::World);
        let far = StampedPose::from_translation(1e6, 0.0, 0.0, FrameId::World).with_stamp(4.0);

        let mut segments = translator
            .translate_linear(&LinearCartesianTarget { pose: far }, &origin, &planner())
            .unwrap();
        assert_eq!(segments.len(), 1_000_000_000);

        let first = segments.next().unwrap();
        assert!((first.position_constraints[0].center.x - 0.001).abs() < 1e-9);
        assert_eq!(first.stamp, 4.0);
        assert_eq!(segments.len(), 999_999_999);
    }
}
