//! The single-active-goal state machine.
//!
//! [`GoalArbitrator`] owns the one arbitration slot. It never touches a
//! channel, a task or a clock: every transition is a call to
//! [`GoalArbitrator::handle`] that returns the side effects the caller must
//! carry out, in order. The Bevy side ([`crate::MotionArbiter`]) feeds it
//! events in arrival order and performs the effects.
//!
//! The slot is only released once the backend has answered the in-flight
//! sequence number, so at most one backend request is ever logically active.

use motion_arbiter_common::{
    GoalId, MotionError, MotionKind, MotionOutcome, PlanningGoal, PlanningRequest, PlanningResult,
    SequenceNumber,
};
use tracing::{debug, info};

use crate::translator::GoalSegments;

/// A translated goal waiting to enter the slot.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingGoal {
    /// Requester-facing id
    pub goal: GoalId,
    /// Which kind of request it came from
    pub kind: MotionKind,
    /// Planning goals to execute in order; one unless the motion is linear
    pub segments: GoalSegments,
}

/// Events the arbitrator reacts to.
#[derive(Clone, Debug, PartialEq)]
pub enum ArbiterInput {
    /// A new, already translated request
    Submit(PendingGoal),
    /// The backend answered a dispatched request
    BackendResult {
        /// Sequence number the backend was given
        sequence: SequenceNumber,
        /// What it reported
        result: PlanningResult,
    },
    /// The requester side asked to stop whatever is running
    Cancel,
}

/// Side effects requested by a transition.
#[derive(Clone, Debug, PartialEq)]
pub enum ArbiterEffect {
    /// Send `request` to the backend
    Dispatch {
        /// Goal the segment belongs to
        goal: GoalId,
        /// One-based segment index
        segment: usize,
        /// Total segments of the goal
        segment_count: usize,
        /// Sequenced request for the backend
        request: PlanningRequest,
    },
    /// Ask the backend to stop the request with this sequence number
    CancelBackend(SequenceNumber),
    /// Report a final outcome on the goal's completion channel
    Complete {
        /// Goal being completed
        goal: GoalId,
        /// Final state
        outcome: MotionOutcome,
    },
}

/// Externally visible phase of the active goal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivePhase {
    /// Executing normally
    Running,
    /// Waiting for the backend to acknowledge a cancel
    Cancelling,
    /// Waiting for the backend to acknowledge a cancel, then `successor` runs
    Preempting {
        /// Goal that takes the slot next
        successor: GoalId,
    },
}

/// Snapshot of the slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArbiterStatus {
    /// Nothing in flight
    Idle,
    /// One backend request in flight
    Active {
        /// Goal occupying the slot
        goal: GoalId,
        /// Its kind
        kind: MotionKind,
        /// One-based index of the segment in flight
        segment: usize,
        /// Total segments of the goal
        segment_count: usize,
        /// Sequence number of the segment in flight
        sequence: SequenceNumber,
        /// Running or winding down
        phase: ActivePhase,
    },
}

impl ArbiterStatus {
    /// True when the slot is empty.
    pub fn is_idle(&self) -> bool {
        matches!(self, ArbiterStatus::Idle)
    }
}

/// Why the active goal is winding down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WindDown {
    Canceled,
    Preempted,
}

impl WindDown {
    fn outcome(self) -> MotionOutcome {
        match self {
            WindDown::Canceled => MotionOutcome::Canceled,
            WindDown::Preempted => MotionOutcome::Preempted,
        }
    }
}

#[derive(Debug)]
enum Phase {
    Running,
    Winding {
        cause: WindDown,
        successor: Option<PendingGoal>,
    },
}

#[derive(Debug)]
struct ActiveGoal {
    goal: GoalId,
    kind: MotionKind,
    remaining: GoalSegments,
    segment: usize,
    segment_count: usize,
    in_flight: SequenceNumber,
    phase: Phase,
}

/// Owns the arbitration slot and the dispatch sequence counter.
#[derive(Debug)]
pub struct GoalArbitrator {
    active: Option<ActiveGoal>,
    next_sequence: SequenceNumber,
}

impl Default for GoalArbitrator {
    fn default() -> Self {
        Self::new()
    }
}

impl GoalArbitrator {
    /// An idle arbitrator whose first dispatch is [`SequenceNumber::FIRST`].
    pub fn new() -> Self {
        Self {
            active: None,
            next_sequence: SequenceNumber::FIRST,
        }
    }

    /// Sequence number currently awaiting a backend result, if any.
    pub fn in_flight(&self) -> Option<SequenceNumber> {
        self.active.as_ref().map(|active| active.in_flight)
    }

    /// Snapshot of the slot.
    pub fn status(&self) -> ArbiterStatus {
        match &self.active {
            None => ArbiterStatus::Idle,
            Some(active) => ArbiterStatus::Active {
                goal: active.goal,
                kind: active.kind,
                segment: active.segment,
                segment_count: active.segment_count,
                sequence: active.in_flight,
                phase: match &active.phase {
                    Phase::Running => ActivePhase::Running,
                    Phase::Winding {
                        successor: Some(next),
                        ..
                    } => ActivePhase::Preempting {
                        successor: next.goal,
                    },
                    Phase::Winding { successor: None, .. } => ActivePhase::Cancelling,
                },
            },
        }
    }

    /// Apply one event and return the effects to perform, in order.
    pub fn handle(&mut self, input: ArbiterInput) -> Vec<ArbiterEffect> {
        let mut effects = Vec::new();
        match input {
            ArbiterInput::Submit(pending) => self.on_submit(pending, &mut effects),
            ArbiterInput::BackendResult { sequence, result } => {
                self.on_result(sequence, result, &mut effects)
            }
            ArbiterInput::Cancel => self.on_cancel(&mut effects),
        }
        effects
    }

    fn on_submit(&mut self, pending: PendingGoal, effects: &mut Vec<ArbiterEffect>) {
        let Some(active) = self.active.as_mut() else {
            info!("Accepted {} {} ({} segments)", pending.kind, pending.goal, pending.segments.len());
            self.start(pending, effects);
            return;
        };

        info!("{} preempts {}", pending.goal, active.goal);
        match &mut active.phase {
            Phase::Running => {
                effects.push(ArbiterEffect::CancelBackend(active.in_flight));
                active.phase = Phase::Winding {
                    cause: WindDown::Preempted,
                    successor: Some(pending),
                };
            }
            Phase::Winding { successor, .. } => {
                // Cancel already forwarded; a queued successor never ran
                if let Some(superseded) = successor.replace(pending) {
                    info!("{} preempted before it started", superseded.goal);
                    effects.push(ArbiterEffect::Complete {
                        goal: superseded.goal,
                        outcome: MotionOutcome::Preempted,
                    });
                }
            }
        }
    }

    fn on_cancel(&mut self, effects: &mut Vec<ArbiterEffect>) {
        let Some(active) = self.active.as_mut() else {
            debug!("Cancel while idle ignored");
            return;
        };

        match &mut active.phase {
            Phase::Running => {
                info!("Cancelling {}", active.goal);
                effects.push(ArbiterEffect::CancelBackend(active.in_flight));
                active.phase = Phase::Winding {
                    cause: WindDown::Canceled,
                    successor: None,
                };
            }
            Phase::Winding { successor, .. } => {
                if let Some(queued) = successor.take() {
                    info!("Cancelling {} before it started", queued.goal);
                    effects.push(ArbiterEffect::Complete {
                        goal: queued.goal,
                        outcome: MotionOutcome::Canceled,
                    });
                }
            }
        }
    }

    fn on_result(
        &mut self,
        sequence: SequenceNumber,
        result: PlanningResult,
        effects: &mut Vec<ArbiterEffect>,
    ) {
        let Some(mut active) = self.active.take() else {
            debug!("Discarding stale result for {} while idle", sequence);
            return;
        };
        if active.in_flight != sequence {
            debug!(
                "Discarding stale result for {} (tracking {})",
                sequence, active.in_flight
            );
            self.active = Some(active);
            return;
        }

        match std::mem::replace(&mut active.phase, Phase::Running) {
            Phase::Winding { cause, successor } => {
                let outcome = cause.outcome();
                info!("{} finished as {:?}", active.goal, outcome);
                effects.push(ArbiterEffect::Complete {
                    goal: active.goal,
                    outcome,
                });
                if let Some(next) = successor {
                    self.start(next, effects);
                }
            }
            Phase::Running => match result {
                PlanningResult::Succeeded => {
                    if let Some(next_segment) = active.remaining.next() {
                        active.segment += 1;
                        effects.push(self.dispatch(&mut active, next_segment));
                        self.active = Some(active);
                    } else {
                        info!("{} succeeded", active.goal);
                        effects.push(ArbiterEffect::Complete {
                            goal: active.goal,
                            outcome: MotionOutcome::Succeeded,
                        });
                    }
                }
                PlanningResult::Aborted(reason) => {
                    info!(
                        "{} failed on segment {}/{}: {}",
                        active.goal, active.segment, active.segment_count, reason
                    );
                    effects.push(ArbiterEffect::Complete {
                        goal: active.goal,
                        outcome: MotionOutcome::Failed(MotionError::Backend { reason }),
                    });
                }
                PlanningResult::Canceled => {
                    // Canceled by the backend itself
                    info!("{} canceled by backend", active.goal);
                    effects.push(ArbiterEffect::Complete {
                        goal: active.goal,
                        outcome: MotionOutcome::Canceled,
                    });
                }
            },
        }
    }

    fn start(&mut self, mut pending: PendingGoal, effects: &mut Vec<ArbiterEffect>) {
        let Some(first) = pending.segments.next() else {
            info!("{} has nothing to do", pending.goal);
            effects.push(ArbiterEffect::Complete {
                goal: pending.goal,
                outcome: MotionOutcome::Succeeded,
            });
            return;
        };

        let mut active = ActiveGoal {
            goal: pending.goal,
            kind: pending.kind,
            segment_count: pending.segments.len() + 1,
            remaining: pending.segments,
            segment: 1,
            in_flight: self.next_sequence,
            phase: Phase::Running,
        };
        effects.push(self.dispatch(&mut active, first));
        self.active = Some(active);
    }

    fn dispatch(&mut self, active: &mut ActiveGoal, goal: PlanningGoal) -> ArbiterEffect {
        let sequence = self.next_sequence;
        self.next_sequence = sequence.next();
        active.in_flight = sequence;

        debug!(
            "Dispatching {} segment {}/{} as {}",
            active.goal, active.segment, active.segment_count, sequence
        );
        ArbiterEffect::Dispatch {
            goal: active.goal,
            segment: active.segment,
            segment_count: active.segment_count,
            request: PlanningRequest { sequence, goal },
        }
    }
}
