//! An in-process robot, planning backend and frame lookup.
//!
//! There is no kinematic model: pose goals move the end effector straight to
//! the constrained pose, joint goals move the joint state, and neither
//! affects the other. Good enough to exercise arbitration end to end.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_std::task::sleep;
use async_trait::async_trait;
use futures_lite::future;
use tracing::{debug, trace};

use motion_arbiter_common::{
    ArbiterSettings, FrameId, FrameLookupError, PlanningGoal, PlanningRequest, PlanningResult,
    SequenceNumber, StampedPose, interpolate_pose,
};

use crate::backend::{CancelToken, FrameLookup, PlanningBackend};

/// Distance from the base the simulated arm can reach, meters.
pub const DEFAULT_REACH: f64 = 0.8;

#[derive(Debug)]
struct RobotState {
    base_frame: FrameId,
    ee_frame: FrameId,
    joints: BTreeMap<String, f64>,
    ee_pose: StampedPose,
    executed: Vec<SequenceNumber>,
}

/// Shared simulated robot state. Clones refer to the same robot.
#[derive(Clone, Debug)]
pub struct SimulatedRobot {
    state: Arc<Mutex<RobotState>>,
}

impl SimulatedRobot {
    /// All joints at zero, end effector 0.6 m above the base.
    pub fn new(settings: &ArbiterSettings) -> Self {
        let base_frame = FrameId::World;
        Self {
            state: Arc::new(Mutex::new(RobotState {
                ee_pose: StampedPose::from_translation(0.0, 0.0, 0.6, base_frame.clone()),
                base_frame,
                ee_frame: settings.ee_frame.clone(),
                joints: settings.joint_names.iter().map(|name| (name.clone(), 0.0)).collect(),
                executed: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RobotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frame the end-effector pose is kept in.
    pub fn base_frame(&self) -> FrameId {
        self.lock().base_frame.clone()
    }

    /// Current end-effector pose in the base frame.
    pub fn ee_pose(&self) -> StampedPose {
        self.lock().ee_pose.clone()
    }

    /// Teleport the end effector.
    pub fn set_ee_pose(&self, pose: StampedPose) {
        self.lock().ee_pose = pose;
    }

    /// Current joint angles.
    pub fn joints(&self) -> BTreeMap<String, f64> {
        self.lock().joints.clone()
    }

    /// Sequence numbers the backend ran to completion, oldest first.
    pub fn executed(&self) -> Vec<SequenceNumber> {
        self.lock().executed.clone()
    }
}

/// Executes planning requests against a [`SimulatedRobot`].
///
/// Each request takes `ticks` steps of `tick` wall time; cancellation is
/// checked between steps.
#[derive(Clone, Debug)]
pub struct SimulatedBackend {
    robot: SimulatedRobot,
    reach: f64,
    ticks: u32,
    tick: Duration,
}

impl SimulatedBackend {
    /// Backend with [`DEFAULT_REACH`] and five 10 ms ticks per request.
    pub fn new(robot: SimulatedRobot) -> Self {
        Self {
            robot,
            reach: DEFAULT_REACH,
            ticks: 5,
            tick: Duration::from_millis(10),
        }
    }

    /// Targets farther than `reach` from the base abort.
    pub fn with_reach(mut self, reach: f64) -> Self {
        self.reach = reach;
        self
    }

    /// Execution granularity.
    pub fn with_ticks(mut self, ticks: u32, tick: Duration) -> Self {
        self.ticks = ticks.max(1);
        self.tick = tick;
        self
    }

    /// Reject goals the simulated arm cannot reach.
    fn check(&self, goal: &PlanningGoal) -> Result<(), String> {
        let base_frame = self.robot.base_frame();
        for constraint in &goal.position_constraints {
            if constraint.frame_id != base_frame {
                return Err(format!(
                    "unknown frame '{}', only '{}' is simulated",
                    constraint.frame_id, base_frame
                ));
            }
            let distance = constraint.center.norm();
            if distance > self.reach {
                return Err(format!(
                    "target {:.3} m from base is beyond reach of {:.3} m",
                    distance, self.reach
                ));
            }
        }

        let joints = self.robot.joints();
        if let Some(unknown) = goal
            .joint_constraints
            .iter()
            .find(|constraint| !joints.contains_key(&constraint.joint_name))
        {
            return Err(format!("unknown joint '{}'", unknown.joint_name));
        }
        Ok(())
    }

    fn step(&self, goal: &PlanningGoal, start: &StampedPose, start_joints: &BTreeMap<String, f64>, w: f64) {
        let mut state = self.robot.lock();

        for constraint in &goal.joint_constraints {
            if let (Some(angle), Some(from)) = (
                state.joints.get_mut(&constraint.joint_name),
                start_joints.get(&constraint.joint_name),
            ) {
                *angle = from + (constraint.position - from) * w;
            }
        }

        if let (Some(position), Some(orientation)) = (
            goal.position_constraints.first(),
            goal.orientation_constraints.first(),
        ) {
            let mut target = start.clone();
            target.transform.translation.vector = position.center;
            target.transform.rotation = orientation.orientation;
            state.ee_pose = interpolate_pose(start, &target, w);
        }
    }
}

#[async_trait]
impl PlanningBackend for SimulatedBackend {
    const BACKEND_NAME: &'static str = "SimulatedBackend";

    async fn execute(&self, request: PlanningRequest, cancel: CancelToken) -> PlanningResult {
        let PlanningRequest { sequence, goal } = request;

        if let Err(reason) = self.check(&goal) {
            debug!("{} aborted: {}", sequence, reason);
            return PlanningResult::Aborted(reason);
        }

        let start = self.robot.ee_pose();
        let start_joints = self.robot.joints();

        for tick in 1..=self.ticks {
            let canceled = future::or(
                async {
                    cancel.cancelled().await;
                    true
                },
                async {
                    sleep(self.tick).await;
                    false
                },
            )
            .await;
            if canceled {
                debug!("{} canceled at tick {}/{}", sequence, tick, self.ticks);
                return PlanningResult::Canceled;
            }

            if !goal.plan_only {
                self.step(&goal, &start, &start_joints, f64::from(tick) / f64::from(self.ticks));
            }
        }

        trace!("{} finished", sequence);
        self.robot.lock().executed.push(sequence);
        PlanningResult::Succeeded
    }
}

/// Answers end-effector lookups from a [`SimulatedRobot`].
#[derive(Clone, Debug)]
pub struct SimulatedFrames {
    robot: SimulatedRobot,
}

impl SimulatedFrames {
    /// Lookups backed by `robot`.
    pub fn new(robot: SimulatedRobot) -> Self {
        Self { robot }
    }
}

#[async_trait]
impl FrameLookup for SimulatedFrames {
    async fn lookup(
        &self,
        target: &FrameId,
        reference: &FrameId,
        _stamp: f64,
    ) -> Result<StampedPose, FrameLookupError> {
        let state = self.robot.lock();
        if *target != state.ee_frame || *reference != state.base_frame {
            return Err(FrameLookupError::Unavailable {
                target: target.clone(),
                reference: reference.clone(),
                reason: format!(
                    "only {} in {} is simulated",
                    state.ee_frame, state.base_frame
                ),
            });
        }
        Ok(state.ee_pose.clone())
    }
}
