//! FIFO of computed results awaiting delivery.
//!
//! Any number of dispatchers push and any number of writer loops pop. Each
//! result is handed to exactly one popper. Poppers park on a [`Notify`]
//! instead of polling.

use std::collections::VecDeque;

use parking_lot::Mutex;
use relay_core::JobResult;
use tokio::sync::Notify;

/// Shared queue of [`JobResult`]s.
#[derive(Debug, Default)]
pub struct ResultQueue {
    items: Mutex<VecDeque<JobResult>>,
    available: Notify,
}

impl ResultQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result and wake one waiting popper.
    pub fn push(&self, result: JobResult) {
        self.items.lock().push_back(result);
        self.available.notify_one();
    }

    /// Remove the oldest result, if any.
    pub fn try_pop(&self) -> Option<JobResult> {
        self.items.lock().pop_front()
    }

    /// Wait for and remove the oldest result.
    ///
    /// Cancel-safe: dropping the future never loses a result.
    pub async fn pop(&self) -> JobResult {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a push in between is not missed.
            let _ = notified.as_mut().enable();
            if let Some(result) = self.try_pop() {
                return result;
            }
            notified.await;
        }
    }

    /// Number of queued results.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
