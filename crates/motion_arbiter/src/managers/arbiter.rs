use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_channel::bounded;
use bevy::prelude::{MessageWriter, Res, ResMut};
use tracing::{debug, info, trace, warn};

use motion_arbiter_common::{
    ArbiterSettings, CartesianTarget, FrameId, FrameLookupError, GoalId, JointTarget, LATEST,
    LinearCartesianTarget, MotionError, MotionGoal, MotionOutcome, MotionRequest, PathParameters,
    PlannerConfig, StampedPose, ValidationError,
};

use super::{InFlight, Intake, LookupReply, MotionArbiter, MotionHandle, PendingLookup, Submission};
use crate::arbitrator::{ArbiterEffect, ArbiterInput, ArbiterStatus, GoalArbitrator, PendingGoal};
use crate::backend::{FrameLookup, PlanningBackend, cancel_pair};
use crate::runtime::{ArbiterRuntime, Runtime, run_async};
use crate::translator::GoalTranslator;
use crate::{ArbiterEvent, AsyncChannel};

impl<B: PlanningBackend, F: FrameLookup> std::fmt::Debug for MotionArbiter<B, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "MotionArbiter<{}> [{:?}, {} queued]",
            B::BACKEND_NAME,
            self.machine.status(),
            self.backlog.len()
        )
    }
}

impl<B: PlanningBackend, F: FrameLookup> MotionArbiter<B, F> {
    pub(crate) fn new(backend: Arc<B>, frames: Arc<F>, settings: ArbiterSettings) -> Self {
        Self {
            settings,
            backend,
            frames,
            goal_count: AtomicU64::new(1),
            intake: AsyncChannel::new(),
            results: AsyncChannel::new(),
            lookups: AsyncChannel::new(),
            backlog: VecDeque::new(),
            pending_lookup: None,
            completions: HashMap::new(),
            in_flight: HashMap::new(),
            machine: GoalArbitrator::new(),
        }
    }

    /// Settings in effect.
    pub fn settings(&self) -> &ArbiterSettings {
        &self.settings
    }

    /// Planner configuration used by the convenience submit methods.
    pub fn planner_defaults(&self) -> PlannerConfig {
        self.settings.planner_defaults()
    }

    /// Replace the default velocity/acceleration scaling for subsequent
    /// convenience submissions. Goals already submitted keep theirs.
    pub fn set_path_parameters(&mut self, path: PathParameters) -> Result<(), ValidationError> {
        path.validate()?;
        info!(
            "Path parameters set: velocity {}, acceleration {}",
            path.max_velocity_scaling_factor, path.max_acceleration_scaling_factor
        );
        self.settings.path = path;
        Ok(())
    }

    /// Snapshot of the arbitration slot as of the last driver run.
    pub fn status(&self) -> ArbiterStatus {
        self.machine.status()
    }

    /// True while a linear goal waits for its start pose.
    pub fn is_looking_up_start_pose(&self) -> bool {
        self.pending_lookup.is_some()
    }

    /// Move to a joint configuration with the default planner configuration.
    pub fn submit_joint_target(&self, target: JointTarget) -> Result<MotionHandle, MotionError> {
        self.submit(MotionRequest::new(target, self.planner_defaults()))
    }

    /// Move to a Cartesian pose with the default planner configuration.
    pub fn submit_cartesian_target(&self, pose: StampedPose) -> Result<MotionHandle, MotionError> {
        self.submit(MotionRequest::new(CartesianTarget { pose }, self.planner_defaults()))
    }

    /// Move in a straight line to a Cartesian pose with the default planner
    /// configuration.
    pub fn submit_linear_cartesian_target(
        &self,
        pose: StampedPose,
    ) -> Result<MotionHandle, MotionError> {
        self.submit(MotionRequest::new(
            LinearCartesianTarget { pose },
            self.planner_defaults(),
        ))
    }

    /// Submit any request. Whatever is active is preempted once this goal
    /// reaches the front of the queue.
    ///
    /// Malformed requests are rejected here and never queued.
    pub fn submit(&self, request: MotionRequest) -> Result<MotionHandle, MotionError> {
        request.validate(&self.settings.joint_names)?;

        let goal = GoalId(self.goal_count.fetch_add(1, Ordering::Relaxed));
        let (completion, receiver) = bounded(1);

        trace!("Queued {} {}", request.kind(), goal);
        self.intake
            .sender
            .try_send(Intake::Submit(Submission {
                goal,
                request,
                completion,
            }))
            .map_err(|_| MotionError::ArbiterShutdown)?;

        Ok(MotionHandle { goal, receiver })
    }

    /// Cancel whatever is active. A no-op when idle.
    pub fn cancel_current(&self) {
        trace!("Queued cancel");
        if self.intake.sender.try_send(Intake::Cancel).is_err() {
            warn!("Cancel dropped, intake closed");
        }
    }

    /// Run one round of the event loop: backend results first, then the
    /// start-pose lookup, then queued intake in arrival order.
    pub fn process<RT: Runtime>(&mut self, runtime: &RT, now: Instant) -> Vec<ArbiterEvent> {
        let mut events = Vec::new();

        while let Ok((sequence, result)) = self.results.receiver.try_recv() {
            trace!("{} answered {} with {:?}", B::BACKEND_NAME, sequence, result);
            self.in_flight.remove(&sequence);
            self.apply(ArbiterInput::BackendResult { sequence, result }, runtime, &mut events);
        }

        self.resolve_lookup(runtime, now, &mut events);

        while let Ok(item) = self.intake.receiver.try_recv() {
            self.backlog.push_back(item);
        }

        // A pending lookup holds everything queued behind it
        while self.pending_lookup.is_none() {
            let Some(item) = self.backlog.pop_front() else {
                break;
            };
            match item {
                Intake::Cancel => self.apply(ArbiterInput::Cancel, runtime, &mut events),
                Intake::Submit(submission) => {
                    if let MotionGoal::LinearCartesian(_) = submission.request.goal {
                        self.start_lookup(submission, runtime, now);
                    } else {
                        self.admit(submission, None, runtime, &mut events);
                    }
                }
            }
        }

        events
    }

    fn start_lookup<RT: Runtime>(&mut self, submission: Submission, runtime: &RT, now: Instant) {
        let MotionGoal::LinearCartesian(target) = &submission.request.goal else {
            return;
        };

        let goal = submission.goal;
        let frames = self.frames.clone();
        let ee_frame = self.settings.ee_frame.clone();
        let reference = target.pose.frame_id.clone();
        let replies = self.lookups.sender.clone();

        debug!("{} looking up {} in {}", goal, ee_frame, reference);
        let task = run_async(
            async move {
                let result = frames.lookup(&ee_frame, &reference, LATEST).await;
                if replies.send(LookupReply { goal, result }).await.is_err() {
                    trace!("Lookup reply for {} dropped, arbiter gone", goal);
                }
            },
            runtime,
        );

        // An unrepresentable deadline expires on the next frame
        let deadline = now
            .checked_add(self.settings.frame_lookup_timeout())
            .unwrap_or(now);
        self.pending_lookup = Some(PendingLookup {
            submission,
            deadline,
            task,
        });
    }

    fn resolve_lookup<RT: Runtime>(
        &mut self,
        runtime: &RT,
        now: Instant,
        events: &mut Vec<ArbiterEvent>,
    ) {
        while let Ok(reply) = self.lookups.receiver.try_recv() {
            match self.pending_lookup.take() {
                Some(pending) if pending.submission.goal == reply.goal => {
                    self.admit(pending.submission, Some(reply.result), runtime, events);
                }
                other => {
                    debug!("Discarding late start pose for {}", reply.goal);
                    self.pending_lookup = other;
                }
            }
        }

        let expired = self
            .pending_lookup
            .as_ref()
            .is_some_and(|pending| now >= pending.deadline);
        if expired && let Some(mut pending) = self.pending_lookup.take() {
            pending.task.abort();
            let error = FrameLookupError::Timeout {
                target: self.settings.ee_frame.clone(),
                reference: linear_frame(&pending.submission.request),
                waited_secs: self.settings.frame_lookup_timeout_secs,
            };
            warn!("{}: {}", pending.submission.goal, error);
            self.reject(pending.submission, error.into(), events);
        }
    }

    /// Translate and hand a submission to the state machine. Linear goals
    /// arrive with their start-pose lookup result.
    fn admit<RT: Runtime>(
        &mut self,
        submission: Submission,
        start: Option<Result<StampedPose, FrameLookupError>>,
        runtime: &RT,
        events: &mut Vec<ArbiterEvent>,
    ) {
        let start = match start.transpose() {
            Ok(start) => start,
            Err(error) => {
                warn!("{}: start pose unavailable: {}", submission.goal, error);
                return self.reject(submission, error.into(), events);
            }
        };

        if let Some(start) = &start {
            let expected = linear_frame(&submission.request);
            if start.frame_id != expected {
                let error = FrameLookupError::FrameMismatch {
                    expected,
                    actual: start.frame_id.clone(),
                };
                warn!("{}: {}", submission.goal, error);
                return self.reject(submission, error.into(), events);
            }
        }

        let translator = GoalTranslator::new(&self.settings);
        let segments = match translator.translate(&submission.request, start.as_ref()) {
            Ok(segments) => segments,
            Err(error) => return self.reject(submission, error.into(), events),
        };

        let Submission {
            goal,
            request,
            completion,
        } = submission;
        let kind = request.kind();

        self.completions.insert(goal, completion);
        events.push(ArbiterEvent::Accepted {
            goal,
            kind,
            segment_count: segments.len(),
        });
        self.apply(
            ArbiterInput::Submit(PendingGoal {
                goal,
                kind,
                segments,
            }),
            runtime,
            events,
        );
    }

    /// Fail a goal that never reached the slot.
    fn reject(&mut self, submission: Submission, error: MotionError, events: &mut Vec<ArbiterEvent>) {
        let outcome = MotionOutcome::Failed(error);
        if submission.completion.try_send(outcome.clone()).is_err() {
            debug!("Requester for {} no longer listening", submission.goal);
        }
        events.push(ArbiterEvent::Completed {
            goal: submission.goal,
            outcome,
        });
    }

    fn apply<RT: Runtime>(
        &mut self,
        input: ArbiterInput,
        runtime: &RT,
        events: &mut Vec<ArbiterEvent>,
    ) {
        for effect in self.machine.handle(input) {
            match effect {
                ArbiterEffect::Dispatch {
                    goal,
                    segment,
                    segment_count,
                    request,
                } => {
                    let sequence = request.sequence;
                    let (cancel, token) = cancel_pair();
                    let backend = self.backend.clone();
                    let results = self.results.sender.clone();

                    let task = run_async(
                        async move {
                            let result = backend.execute(request, token).await;
                            if results.send((sequence, result)).await.is_err() {
                                trace!("Result for {} dropped, arbiter gone", sequence);
                            }
                        },
                        runtime,
                    );
                    self.in_flight.insert(sequence, InFlight { cancel, _task: task });

                    events.push(ArbiterEvent::SegmentDispatched {
                        goal,
                        segment,
                        segment_count,
                        sequence,
                    });
                }
                ArbiterEffect::CancelBackend(sequence) => {
                    match self.in_flight.get(&sequence) {
                        Some(in_flight) => in_flight.cancel.cancel(),
                        None => warn!("No in-flight request {} to cancel", sequence),
                    }
                    events.push(ArbiterEvent::CancelRequested { sequence });
                }
                ArbiterEffect::Complete { goal, outcome } => {
                    match self.completions.remove(&goal) {
                        Some(completion) => {
                            if completion.try_send(outcome.clone()).is_err() {
                                debug!("Requester for {} no longer listening", goal);
                            }
                        }
                        None => warn!("No completion channel for {}", goal),
                    }
                    events.push(ArbiterEvent::Completed { goal, outcome });
                }
            }
        }
    }
}

fn linear_frame(request: &MotionRequest) -> FrameId {
    match &request.goal {
        MotionGoal::LinearCartesian(target) => target.pose.frame_id.clone(),
        MotionGoal::Cartesian(target) => target.pose.frame_id.clone(),
        MotionGoal::Joint(_) => FrameId::World,
    }
}

/// Drains the arbiter's channels once per frame and forwards what happened as
/// [`ArbiterEvent`]s.
pub(crate) fn drive_arbiter<B: PlanningBackend, F: FrameLookup, RT: Runtime>(
    mut arbiter: ResMut<MotionArbiter<B, F>>,
    runtime: Res<ArbiterRuntime<RT>>,
    mut arbiter_events: MessageWriter<ArbiterEvent>,
) {
    for event in arbiter.process(&runtime.0, Instant::now()) {
        arbiter_events.write(event);
    }
}
