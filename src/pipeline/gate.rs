//! Readiness gate enforcing half-duplex turn-taking
//!
//! The gate holds at most one permit. The speaker side opens it when the
//! system may listen again; the listener consumes it before each capture.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Single-permit "ready to listen" signal
#[derive(Debug, Default)]
pub struct ReadyGate {
    permit: Notify,
    opened: AtomicU64,
    closed: AtomicBool,
}

impl ReadyGate {
    /// Create a gate in the not-ready state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow exactly one pending or future wait to proceed
    ///
    /// Calling this while already ready does not accumulate a second permit.
    pub fn set_ready(&self) {
        if self.is_closed() {
            tracing::debug!("gate opened after close, ignoring");
            return;
        }

        let count = self.opened.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(count, "gate opened");
        self.permit.notify_one();
    }

    /// Wait until the gate is ready, consuming the permit
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`] if `cancel` fires first, or
    /// [`Error::Closed`] once the gate has been closed.
    pub async fn wait_for_ready(&self, cancel: &CancellationToken) -> Result<()> {
        let notified = self.permit.notified();

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

    /// Close the gate, releasing any waiter; idempotent
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!("gate closed");
            self.permit.notify_waiters();
        }
    }

    /// Whether [`close`](Self::close) has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// How many times the gate has been opened since creation
    #[must_use]
    pub fn times_opened(&self) -> u64 {
        self.opened.load(Ordering::Acquire)
    }
}
