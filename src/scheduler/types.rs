//! Cancellation context threaded through every job and processor call.

use tokio_util::sync::CancellationToken;

/// Execution context handed down the call chain.
///
/// Cancellation is cooperative: the owning runner cancels the token, and
/// downstream code checks it at safe points before taking further store
/// actions. Nothing is ever aborted mid-write.
#[derive(Clone, Default)]
pub struct JobContext {
    cancellation: CancellationToken,
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancellation_requested(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Request cancellation. Called by the owning runner, observed by every
    /// downstream safe-point check.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancellation
    }
}
