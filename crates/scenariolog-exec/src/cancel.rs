//! Cooperative cancellation for running steps.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};

/// A cloneable cancellation flag.
///
/// Every clone observes the same state; once cancelled a token stays
/// cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
  tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  pub fn cancel(&self) { self.tx.send_replace(true); }

  pub fn is_cancelled(&self) -> bool { *self.tx.borrow() }

  /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
  pub async fn cancelled(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives as long as `self`, so this only returns on cancel.
    let _ = rx.wait_for(|cancelled| *cancelled).await;
  }

  /// Cancel this token once `after` has elapsed.
  ///
  /// Must be called from within a tokio runtime. Abort the returned handle to
  /// disarm the timer.
  pub fn cancel_after(&self, after: Duration) -> JoinHandle<()> {
    let token = self.clone();
    tokio::spawn(async move {
      tokio::time::sleep(after).await;
      token.cancel();
    })
  }
}

impl Default for CancelToken {
  fn default() -> Self { Self::new() }
}
