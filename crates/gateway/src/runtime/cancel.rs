//! One-shot stop signal for a turn.
//!
//! The connection handler and both pipeline workers hold clones of the same
//! token; whoever trips it first wins, and it never resets. Workers read it
//! at every suspension point, which is what makes cancellation cooperative
//! rather than forced (the handler's abort only kicks in after the grace
//! window).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared latch asking the turn's pipeline to stop.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the latch. Idempotent; there is no way back.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset_and_latches_on_cancel() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn every_clone_observes_the_same_signal() {
        let token = CancelToken::default();
        let held_by_worker = token.clone();
        assert!(!held_by_worker.is_cancelled());
        token.cancel();
        assert!(held_by_worker.is_cancelled());
    }
}
