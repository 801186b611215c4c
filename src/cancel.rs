// ABOUTME: Cooperative cancellation signal shared between a caller and an attempt.
// ABOUTME: Backed by a tokio watch channel so any number of waiters can observe it.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in `self`, so wait_for only ends by observing `true`.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}
