#![deny(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    clippy::unwrap_used
)]
#![allow(clippy::type_complexity)]

/*!
Single-active-goal motion arbitration for Bevy.

Requesters submit joint, Cartesian or linear Cartesian targets to the
[`MotionArbiter`] resource. Exactly one planning request is in flight on the
[`PlanningBackend`] at any time: a newer submission preempts the active goal,
an explicit cancel stops it, and linear motions run as a chain of short,
tightly constrained segments. Every submission resolves to exactly one
[`MotionOutcome`] on its [`MotionHandle`].

Add [`MotionArbiterPlugin`] with your backend and frame lookup, then insert the
runtime the arbiter should spawn its tasks on as the [`ArbiterRuntime`] resource.

## Example
```rust,no_run
use bevy::prelude::*;
use bevy::tasks::{TaskPool, TaskPoolBuilder};
use motion_arbiter::{
    sim::{SimulatedBackend, SimulatedFrames, SimulatedRobot},
    ArbiterEvent, ArbiterRuntime, ArbiterSettings, MotionArbiter, MotionArbiterPlugin,
};

type SimArbiter = MotionArbiter<SimulatedBackend, SimulatedFrames>;

fn main() {
    let settings = ArbiterSettings::default();
    let robot = SimulatedRobot::new(&settings);

    let mut app = App::new();
    app.add_plugins(MinimalPlugins);
    app.add_plugins(
        MotionArbiterPlugin::<_, _, TaskPool>::new(
            SimulatedBackend::new(robot.clone()),
            SimulatedFrames::new(robot),
            settings,
        )
        .expect("Default settings are valid"),
    );
    app.insert_resource(ArbiterRuntime(TaskPoolBuilder::new().num_threads(2).build()));
    app.add_systems(Startup, move_home);
    app.add_systems(Update, log_outcomes);
    app.run();
}

fn move_home(arbiter: Res<SimArbiter>) {
    let home = arbiter.settings().joint_names.iter().map(|name| (name.clone(), 0.0));
    if let Err(error) = arbiter.submit_joint_target(motion_arbiter::JointTarget::new(home)) {
        error!("Rejected: {}", error);
    }
}

fn log_outcomes(mut events: MessageReader<ArbiterEvent>) {
    for event in events.read() {
        if let ArbiterEvent::Completed { goal, outcome } = event {
            info!("{} finished: {:?}", goal, outcome);
        }
    }
}
```
*/

pub mod arbitrator;
pub mod backend;
pub mod managers;
mod runtime;
pub mod sim;
pub mod translator;

pub use arbitrator::{ActivePhase, ArbiterEffect, ArbiterInput, ArbiterStatus, GoalArbitrator, PendingGoal};
pub use backend::{CancelHandle, CancelToken, FrameLookup, PlanningBackend, cancel_pair};
pub use managers::{MotionArbiter, MotionHandle};
pub use runtime::{ArbiterRuntime, JoinHandle, Runtime};
pub use translator::{GoalSegments, GoalTranslator};

pub use async_trait::async_trait;
pub use motion_arbiter_common::*;

use std::marker::PhantomData;
use std::sync::Arc;

use async_channel::{Receiver, Sender, unbounded};
use bevy::prelude::*;

struct AsyncChannel<T> {
    pub(crate) sender: Sender<T>,
    pub(crate) receiver: Receiver<T>,
}

impl<T> AsyncChannel<T> {
    fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self { sender, receiver }
    }
}

#[derive(Debug, Clone, PartialEq, Message)]
/// Something the arbiter did, observable by any system
pub enum ArbiterEvent {
    /// A goal entered the arbitration slot, or queued to preempt it
    Accepted {
        /// The goal
        goal: GoalId,
        /// Kind of request
        kind: MotionKind,
        /// How many planning requests it was split into
        segment_count: usize,
    },
    /// A planning request went out to the backend
    SegmentDispatched {
        /// Goal the segment belongs to
        goal: GoalId,
        /// One-based segment index
        segment: usize,
        /// Total segments of the goal
        segment_count: usize,
        /// Sequence number the backend was given
        sequence: SequenceNumber,
    },
    /// The backend was asked to stop a request
    CancelRequested {
        /// Sequence number being canceled
        sequence: SequenceNumber,
    },
    /// A goal reached its final state
    Completed {
        /// The goal
        goal: GoalId,
        /// Final state, as reported on the goal's handle
        outcome: MotionOutcome,
    },
}

/// The plugin to add to your bevy [`App`] to arbitrate motion requests onto
/// one backend.
///
/// `RT` is the runtime backend and frame-lookup calls are spawned on; insert
/// it as [`ArbiterRuntime<RT>`] before the first update.
pub struct MotionArbiterPlugin<B: PlanningBackend, F: FrameLookup, RT: Runtime = bevy::tasks::TaskPool> {
    backend: Arc<B>,
    frames: Arc<F>,
    settings: ArbiterSettings,
    _runtime: PhantomData<fn() -> RT>,
}

impl<B: PlanningBackend, F: FrameLookup, RT: Runtime> MotionArbiterPlugin<B, F, RT> {
    /// Create the plugin, rejecting invalid settings.
    pub fn new(backend: B, frames: F, settings: ArbiterSettings) -> Result<Self, ValidationError> {
        Self::from_shared(Arc::new(backend), Arc::new(frames), settings)
    }

    /// Like [`MotionArbiterPlugin::new`] for collaborators you keep a handle to.
    pub fn from_shared(
        backend: Arc<B>,
        frames: Arc<F>,
        settings: ArbiterSettings,
    ) -> Result<Self, ValidationError> {
        settings.validate()?;
        Ok(Self {
            backend,
            frames,
            settings,
            _runtime: PhantomData,
        })
    }
}

impl<B: PlanningBackend, F: FrameLookup, RT: Runtime> Plugin for MotionArbiterPlugin<B, F, RT> {
    fn build(&self, app: &mut App) {
        app.insert_resource(MotionArbiter::new(
            self.backend.clone(),
            self.frames.clone(),
            self.settings.clone(),
        ));
        app.add_message::<ArbiterEvent>();
        app.add_systems(PreUpdate, managers::arbiter::drive_arbiter::<B, F, RT>);
    }
}
