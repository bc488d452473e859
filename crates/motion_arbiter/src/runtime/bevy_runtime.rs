use std::future::Future;

use bevy::tasks::{Task, TaskPool};

use super::{JoinHandle, Runtime};

impl Runtime for TaskPool {
    type JoinHandle = Option<Task<()>>;

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) -> Self::JoinHandle {
        // Results come back over channels, so nobody polls the task handle
        TaskPool::spawn(self, task).detach();
        None
    }
}

impl JoinHandle for Option<Task<()>> {
    fn abort(&mut self) {
        // Dropping a bevy Task cancels it
        self.take();
    }
}
