//! Unbounded message queue with an awaitable "item available" signal
//!
//! Producers call [`MessageQueue::enqueue`] from anywhere; the consumer loop
//! calls [`MessageQueue::wait`] and then drains with
//! [`MessageQueue::try_dequeue`] until it returns `None`.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Thread-safe FIFO hand-off between pipeline stages
///
/// The wait signal is level-triggered: any number of enqueues before a wait
/// release exactly one wait, and an enqueue that happens before anyone waits
/// is remembered.
pub struct MessageQueue<T> {
    name: &'static str,
    items: Mutex<VecDeque<T>>,
    available: Notify,
    closed: AtomicBool,
}

impl<T> MessageQueue<T> {
    /// Create an empty queue; `name` only appears in logs
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Append an item and wake the consumer
    ///
    /// Never blocks. After [`close`](Self::close) the item is dropped.
    pub fn enqueue(&self, item: T) {
        if self.is_closed() {
            tracing::debug!(queue = self.name, "enqueue after close, dropping item");
            return;
        }

        let depth = {
            let mut items = self
                .items
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            items.push_back(item);
            items.len()
        };

        tracing::trace!(queue = self.name, depth, "item enqueued");
        self.available.notify_one();
    }

    /// Remove and return the oldest item, if any
    pub fn try_dequeue(&self) -> Option<T> {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
    }

    /// Wait until something was enqueued since the last successful wait
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires first, or
    /// [`Error::Closed`] once the queue has been closed.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        // Registered before the closed check so a concurrent close still wakes us
        let notified = self.available.notified();

        if self.is_closed() {
            return Err(Error::Closed);
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            () = notified => {
                if self.is_closed() {
                    Err(Error::Closed)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Close the queue, releasing every waiter
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(queue = self.name, pending = self.len(), "queue closed");
            self.available.notify_waiters();
        }
    }

    /// Whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of items currently queued
    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the queue currently holds no items
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue name used in logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> std::fmt::Debug for MessageQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
