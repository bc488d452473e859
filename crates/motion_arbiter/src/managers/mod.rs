//! The Bevy resource that owns the arbitration state and its channels.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::time::Instant;

use async_channel::{Receiver, Sender, TryRecvError};
use bevy::prelude::Resource;

use motion_arbiter_common::{
    ArbiterSettings, FrameLookupError, GoalId, MotionError, MotionOutcome, MotionRequest, PlanningResult,
    SequenceNumber, StampedPose,
};

use crate::AsyncChannel;
use crate::arbitrator::GoalArbitrator;
use crate::backend::{CancelHandle, FrameLookup, PlanningBackend};
use crate::runtime::JoinHandle;

/// Submission and cancel entry points, plus the state machine driving them.
pub mod arbiter;

/// Arbitrates motion requests onto a single [`PlanningBackend`].
///
/// Inserted by [`crate::MotionArbiterPlugin`]. Requesters call the submit and
/// cancel methods through `Res<MotionArbiter<B, F>>`; the calls only enqueue,
/// the actual transitions happen in the `PreUpdate` driver system.
#[derive(Resource)]
pub struct MotionArbiter<B: PlanningBackend, F: FrameLookup> {
    settings: ArbiterSettings,
    backend: Arc<B>,
    frames: Arc<F>,
    goal_count: AtomicU64,
    intake: AsyncChannel<Intake>,
    results: AsyncChannel<(SequenceNumber, PlanningResult)>,
    lookups: AsyncChannel<LookupReply>,
    /// Intake items held back while a start-pose lookup is outstanding
    backlog: VecDeque<Intake>,
    pending_lookup: Option<PendingLookup>,
    completions: HashMap<GoalId, Sender<MotionOutcome>>,
    in_flight: HashMap<SequenceNumber, InFlight>,
    machine: GoalArbitrator,
}

pub(crate) struct Submission {
    goal: GoalId,
    request: MotionRequest,
    completion: Sender<MotionOutcome>,
}

pub(crate) enum Intake {
    Submit(Submission),
    Cancel,
}

pub(crate) struct LookupReply {
    goal: GoalId,
    result: Result<StampedPose, FrameLookupError>,
}

struct PendingLookup {
    submission: Submission,
    deadline: Instant,
    task: Box<dyn JoinHandle>,
}

struct InFlight {
    cancel: CancelHandle,
    _task: Box<dyn JoinHandle>,
}

/// Requester side of one submitted goal.
///
/// Each goal gets exactly one outcome. Dropping the handle does not cancel
/// the goal.
#[derive(Debug)]
pub struct MotionHandle {
    goal: GoalId,
    receiver: Receiver<MotionOutcome>,
}

impl MotionHandle {
    /// Id of the goal this handle tracks.
    pub fn goal(&self) -> GoalId {
        self.goal
    }

    /// The outcome if it has arrived and not been taken yet.
    pub fn try_outcome(&self) -> Option<MotionOutcome> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// Wait for the outcome.
    ///
    /// Resolves to [`MotionError::ArbiterShutdown`] if
    /// the arbiter went away before reporting one.
    pub async fn outcome(self) -> MotionOutcome {
        self.receiver
            .recv()
            .await
            .unwrap_or(MotionOutcome::Failed(MotionError::ArbiterShutdown))
    }
}
