//! Cancellation handles.
//!
//! Every request hands back an [`AbortHandle`]: one cancellation signal
//! paired with an explicit cancel function. Clones observe the same signal;
//! once aborted it stays aborted, and aborting after completion is a no-op.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus the reason it was cancelled with.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the signal. The first reason wins; later calls are no-ops.
    pub fn abort(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason passed to [`abort`](Self::abort), if any.
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Resolves once the handle is aborted.
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }

    /// The underlying signal, for passing into fetch functions.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}
