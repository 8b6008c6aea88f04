//! Cooperative abort signalling between the executor and the revert watcher.
//!
//! One `AbortHandle` is armed at startup and wired to the process signals; any
//! number of `AbortToken` clones observe it. The token fires at most once and
//! never resets, so "was cancellation requested" has exactly one answer for
//! the rest of the run.

use tokio::sync::watch;
use tracing::info;

/// Sender half: fires the abort. Held by the signal listener.
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

/// Receiver half: observed by the executor at cycle boundaries and awaited by
/// the revert watcher.
#[derive(Clone)]
pub struct AbortToken {
    rx: watch::Receiver<bool>,
}

/// Create a connected handle/token pair.
pub fn abort_pair() -> (AbortHandle, AbortToken) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortToken { rx })
}

impl AbortHandle {
    /// Request cancellation. Idempotent: the first call fires the token,
    /// later calls are no-ops.
    pub fn fire(&self) {
        let already = self.tx.send_replace(true);
        if !already {
            info!("abort requested; revert will take over at the next safe point");
        }
    }
}

impl AbortToken {
    /// Non-blocking check, used at cycle boundaries.
    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the abort fires. Resolves immediately if it already has.
    pub async fn fired(&self) {
        let mut rx = self.rx.clone();
        // The sender lives for the whole run; a closed channel without a
        // fired value means shutdown, which we treat the same as fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_starts_unfired() {
        let (_handle, token) = abort_pair();
        assert!(!token.is_fired());
    }

    #[tokio::test]
    async fn fire_reaches_every_clone() {
        let (handle, token) = abort_pair();
        let other = token.clone();
        handle.fire();
        assert!(token.is_fired());
        assert!(other.is_fired());
    }

    #[tokio::test]
    async fn fire_is_idempotent() {
        let (handle, token) = abort_pair();
        handle.fire();
        handle.fire();
        assert!(token.is_fired());
    }

    #[tokio::test]
    async fn fired_resolves_after_fire() {
        let (handle, token) = abort_pair();

        let waiter = tokio::spawn(async move {
            token.fired().await;
        });

        handle.fire();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("fired() never resolved")
            .unwrap();
    }

    #[tokio::test]
    async fn fired_resolves_immediately_when_already_fired() {
        let (handle, token) = abort_pair();
        handle.fire();
        tokio::time::timeout(Duration::from_millis(50), token.fired())
            .await
            .expect("fired() should resolve without waiting");
    }
}
