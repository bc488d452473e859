//! Executor abstraction for backend and frame-lookup tasks.

use std::future::Future;

use bevy::prelude::Resource;

mod bevy_runtime;

/// Spawns the detached tasks the arbiter hands its collaborators.
pub trait Runtime: 'static + Send + Sync {
    /// Handle returned by [`Runtime::spawn`].
    type JoinHandle: JoinHandle;

    /// Run a task to completion in the background.
    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) -> Self::JoinHandle;
}

/// Handle to a spawned task.
pub trait JoinHandle: 'static + Send + Sync {
    /// Stop the task if it is still running.
    fn abort(&mut self);
}

/// The runtime the arbiter spawns onto. Insert it before running the app.
#[derive(Resource)]
pub struct ArbiterRuntime<RT: Runtime>(pub RT);

/// Spawn `task` on `runtime` and box the handle.
pub(crate) fn run_async<F, RT>(task: F, runtime: &RT) -> Box<dyn JoinHandle>
where
    F: Future<Output = ()> + Send + 'static,
    RT: Runtime,
{
    Box::new(runtime.spawn(task))
}
