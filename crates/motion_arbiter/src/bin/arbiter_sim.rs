//! Runs the arbiter against the simulated robot through a short script:
//! a preemption, a linear move, a cancel and an unreachable target.
//!
//! Usage: `arbiter_sim [settings.json]`

use std::collections::VecDeque;
use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use bevy::tasks::TaskPoolBuilder;
use motion_arbiter::sim::{SimulatedBackend, SimulatedFrames, SimulatedRobot};
use motion_arbiter::{
    ArbiterEvent, ArbiterRuntime, ArbiterSettings, FrameId, JointTarget, MotionArbiter,
    MotionArbiterPlugin, MotionError, MotionHandle, PathParameters, StampedPose,
};

type SimArbiter = MotionArbiter<SimulatedBackend, SimulatedFrames>;

#[derive(Clone, Copy, Debug)]
enum Stage {
    PreemptJointMove,
    SlowLinearMove,
    CancelCartesianMove,
    UnreachableTarget,
}

#[derive(Resource)]
struct Script {
    stages: VecDeque<Stage>,
    outstanding: Vec<(&'static str, MotionHandle)>,
}

fn main() -> AppExit {
    let settings = match std::env::args().nth(1) {
        Some(path) => match ArbiterSettings::from_json_file(&path) {
            Ok(settings) => settings,
            Err(err) => {
                eprintln!("Could not load settings from {}: {}", path, err);
                return AppExit::error();
            }
        },
        None => ArbiterSettings {
            // Coarser than the default so the demo finishes in seconds
            linear_step_size: 0.05,
            ..Default::default()
        },
    };

    let robot = SimulatedRobot::new(&settings);
    let plugin = match MotionArbiterPlugin::<_, _, bevy::tasks::TaskPool>::new(
        SimulatedBackend::new(robot.clone()),
        SimulatedFrames::new(robot),
        settings,
    ) {
        Ok(plugin) => plugin,
        Err(err) => {
            eprintln!("Invalid settings: {}", err);
            return AppExit::error();
        }
    };

    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_millis(5))),
    )
    .add_plugins(LogPlugin::default());

    app.add_plugins(plugin)
        .insert_resource(ArbiterRuntime(TaskPoolBuilder::new().num_threads(2).build()))
        .insert_resource(Script {
            stages: VecDeque::from([
                Stage::PreemptJointMove,
                Stage::SlowLinearMove,
                Stage::CancelCartesianMove,
                Stage::UnreachableTarget,
            ]),
            outstanding: Vec::new(),
        });

    app.add_systems(Update, (log_arbiter_events, run_script));
    app.run()
}

fn log_arbiter_events(mut arbiter_events: MessageReader<ArbiterEvent>) {
    for event in arbiter_events.read() {
        match event {
            ArbiterEvent::Accepted {
                goal,
                kind,
                segment_count,
            } => info!("{} accepted: {} move in {} segment(s)", goal, kind, segment_count),
            ArbiterEvent::SegmentDispatched {
                goal,
                segment,
                segment_count,
                sequence,
            } => debug!("{} segment {}/{} dispatched as {}", goal, segment, segment_count, sequence),
            ArbiterEvent::CancelRequested { sequence } => info!("Cancel requested for {}", sequence),
            ArbiterEvent::Completed { goal, outcome } => info!("{} completed: {:?}", goal, outcome),
        }
    }
}

fn run_script(
    mut script: ResMut<Script>,
    mut arbiter: ResMut<SimArbiter>,
    mut exit: MessageWriter<AppExit>,
) {
    script.outstanding.retain(|(label, handle)| match handle.try_outcome() {
        Some(outcome) => {
            info!("[{}] {:?}", label, outcome);
            false
        }
        None => true,
    });

    if !script.outstanding.is_empty() || !arbiter.status().is_idle() {
        return;
    }

    let Some(stage) = script.stages.pop_front() else {
        info!("Script finished");
        exit.write(AppExit::Success);
        return;
    };

    info!("Running {:?}", stage);
    match run_stage(stage, &mut arbiter) {
        Ok(handles) => script.outstanding.extend(handles),
        Err(err) => error!("{:?} rejected: {}", stage, err),
    }
}

fn run_stage(
    stage: Stage,
    arbiter: &mut SimArbiter,
) -> Result<Vec<(&'static str, MotionHandle)>, MotionError> {
    let base = FrameId::World;

    Ok(match stage {
        Stage::PreemptJointMove => {
            let bend = arbiter
                .settings()
                .joint_names
                .iter()
                .map(|name| (name.clone(), 0.3))
                .collect::<Vec<_>>();
            // The Cartesian move arrives right behind the joint move and preempts it
            let joint = arbiter.submit_joint_target(JointTarget::new(bend))?;
            let cartesian = arbiter.submit_cartesian_target(StampedPose::from_xyz_rpy(
                0.4, 0.0, 0.5, 0.0, 0.0, 0.3, base,
            ))?;
            vec![("joint move", joint), ("cartesian move", cartesian)]
        }
        Stage::SlowLinearMove => {
            arbiter.set_path_parameters(PathParameters {
                max_velocity_scaling_factor: 0.25,
                max_acceleration_scaling_factor: 0.5,
            })?;
            let linear = arbiter
                .submit_linear_cartesian_target(StampedPose::from_translation(0.4, 0.2, 0.3, base))?;
            vec![("linear move", linear)]
        }
        Stage::CancelCartesianMove => {
            let doomed = arbiter
                .submit_cartesian_target(StampedPose::from_translation(0.0, 0.4, 0.5, base))?;
            arbiter.cancel_current();
            vec![("canceled move", doomed)]
        }
        Stage::UnreachableTarget => {
            let far = arbiter
                .submit_cartesian_target(StampedPose::from_translation(1.5, 0.0, 0.5, base))?;
            vec![("unreachable move", far)]
        }
    })
}
