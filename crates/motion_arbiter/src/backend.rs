//! Collaborator seams: the planning/execution backend and the frame lookup
//! service.
//!
//! Both are consumed, not implemented, by the arbiter. Implementations live
//! next to whatever transport reaches the real services; [`crate::sim`] has
//! in-process ones.

use async_channel::{Receiver, Sender, bounded};
use async_trait::async_trait;

use motion_arbiter_common::{FrameId, FrameLookupError, PlanningRequest, PlanningResult, StampedPose};

/// Plans and executes one [`PlanningRequest`] at a time.
///
/// The arbiter guarantees at most one outstanding `execute` call per backend
/// instance. Cancellation is cooperative: when `cancel` fires, the backend
/// should stop and return [`PlanningResult::Canceled`] as its acknowledgment.
/// Whatever it returns is taken as the final word on that sequence number.
#[async_trait]
pub trait PlanningBackend: 'static + Send + Sync {
    /// Name used in logs.
    const BACKEND_NAME: &'static str;

    /// Plan and execute `request`, resolving once the motion is finished,
    /// failed, or canceled.
    async fn execute(&self, request: PlanningRequest, cancel: CancelToken) -> PlanningResult;
}

/// Resolves where one frame currently is relative to another.
///
/// The arbiter bounds how long it waits; implementations may block on their
/// own buffers for as long as they like.
#[async_trait]
pub trait FrameLookup: 'static + Send + Sync {
    /// Pose of `target` expressed in `reference` at `stamp`
    /// ([`motion_arbiter_common::LATEST`] for the newest data).
    async fn lookup(
        &self,
        target: &FrameId,
        reference: &FrameId,
        stamp: f64,
    ) -> Result<StampedPose, FrameLookupError>;
}

/// Create a linked cancel handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (sender, receiver) = bounded(1);
    (CancelHandle { sender }, CancelToken { receiver })
}

/// Arbiter side of a cancellation signal. Dropping it also cancels.
#[derive(Debug)]
pub struct CancelHandle {
    sender: Sender<()>,
}

impl CancelHandle {
    /// Ask the backend to stop. Idempotent.
    pub fn cancel(&self) {
        self.sender.close();
    }
}

/// Backend side of a cancellation signal.
#[derive(Clone, Debug)]
pub struct CancelToken {
    receiver: Receiver<()>,
}

impl CancelToken {
    /// True once cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        // The handle never sends; recv only returns when the channel closes
        while self.receiver.recv().await.is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_pair() {
        let (handle, token) = cancel_pair();
        assert!(!token.is_cancelled());

        handle.cancel();
        assert!(token.is_cancelled());
        futures_lite::future::block_on(token.cancelled());

        // Idempotent
        handle.cancel();
        assert!(token.clone().is_cancelled());
    }

    #[test]
    fn test_dropping_handle_cancels() {
        let (handle, token) = cancel_pair();
        drop(handle);
        assert!(token.is_cancelled());
    }
}
