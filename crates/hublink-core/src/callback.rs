//! FIFO delivery of user-visible callbacks.
//!
//! Every delegate notification and per-operation completion is posted to a
//! [`CallbackQueue`] instead of being invoked inline. The queue is a single
//! drain task fed by an unbounded channel, so callbacks run strictly in
//! post order and never while any connection-internal lock is held.

use std::sync::OnceLock;

use tokio::sync::mpsc;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A serialising executor for user-visible callbacks.
///
/// Cloning the queue produces another handle to the same drain task, so
/// all clones share one FIFO order. Creating a queue spawns its drain task
/// and therefore requires an active Tokio runtime.
#[derive(Clone)]
pub struct CallbackQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl CallbackQueue {
    /// Creates a new queue with its own drain task.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
        });
        Self { tx }
    }

    /// Returns the per-process shared queue, creating it on first use.
    ///
    /// This is the default executor for connections whose options do not
    /// supply their own.
    pub fn shared() -> Self {
        static SHARED: OnceLock<CallbackQueue> = OnceLock::new();
        SHARED.get_or_init(CallbackQueue::new).clone()
    }

    /// Schedules `job` to run after all previously posted jobs.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) {
        if self.tx.send(Box::new(job)).is_err() {
            trace!("callback dropped, queue drain task is gone");
        }
    }
}

impl Default for CallbackQueue {
    fn default() -> Self {
        Self::shared()
    }
}

impl std::fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackQueue").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn posts_run_in_fifo_order() {
        let queue = CallbackQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for i in 0..100 {
            let tx = tx.clone();
            queue.post(move || {
                let _ = tx.send(i);
            });
        }

        for expected in 0..100 {
            assert_eq!(rx.recv().await, Some(expected));
        }
    }

    #[tokio::test]
    async fn clones_share_one_order() {
        let queue = CallbackQueue::new();
        let other = queue.clone();
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let c = Arc::clone(&counter);
        queue.post(move || {
            c.store(1, Ordering::SeqCst);
        });
        let c = Arc::clone(&counter);
        other.post(move || {
            assert_eq!(c.load(Ordering::SeqCst), 1);
            let _ = tx.send(());
        });

        rx.recv().await.unwrap();
    }
}
