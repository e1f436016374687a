//! In-memory FIFO handing raw payloads from the network thread to the worker.
//!
//! Producers never block on capacity; the queue is bounded only by memory.
//! Consumers wait on a condition variable with a bounded timeout.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct Inner {
    messages: Mutex<VecDeque<String>>,
    not_empty: Condvar,
}

/// Cloneable handle; all clones share the same queue.
#[derive(Clone, Default)]
pub struct IngestionQueue {
    inner: Arc<Inner>,
}

impl IngestionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append to the tail and wake one waiting consumer.
    pub fn push(&self, message: impl Into<String>) {
        self.lock().push_back(message.into());
        self.inner.not_empty.notify_one();
    }

    /// Pop the head, waiting up to `timeout` for one to arrive.
    /// Returns `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<String> {
        let guard = self.lock();
        let (mut guard, _) = self
            .inner
            .not_empty
            .wait_timeout_while(guard, timeout, |q| q.is_empty())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.pop_front()
    }

    /// Pop the head without waiting.
    pub fn try_pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panicking holder cannot leave the deque half-modified, so a poisoned
    // lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner
            .messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
