//! Cancellation signalling between the response body and the streaming pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Shared handle used to stop a chat stream when its consumer goes away.
///
/// The transport side calls [`cancel`](Self::cancel) (usually from a `Drop`);
/// the pipeline awaits [`cancelled`](Self::cancelled) alongside the provider
/// read and drops the provider connection as soon as it fires.
#[derive(Clone)]
pub struct StreamCancelHandle {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
    completed: Arc<AtomicBool>,
}

impl StreamCancelHandle {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
            completed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the stream as finished normally; later `cancel` calls become no-ops.
    pub fn mark_completed(&self) {
        self.completed.store(true, Ordering::SeqCst);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Signal cancellation unless the stream already completed.
    pub fn cancel(&self) {
        if !self.is_completed() {
            let _ = self.sender.send(true);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once cancellation has been signalled.
    ///
    /// Never resolves if every sender is gone without cancelling.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        loop {
            if *receiver.borrow_and_update() {
                return;
            }
            if receiver.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for StreamCancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
