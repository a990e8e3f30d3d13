//! Deduplicated FIFO of addresses waiting to be dialed.

use crate::reporter::Reporter;
use bitcoin_seeder_connection::Address;
use log::trace;
use parking_lot::{Condvar, Mutex};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

/// Errors that can occur when consuming from an [`AddressQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A drain was asked for zero addresses.
    ZeroCount,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::ZeroCount => write!(f, "Drain count must be at least one"),
        }
    }
}

impl std::error::Error for QueueError {}

#[derive(Debug, Default)]
struct Inner {
    /// Every address ever accepted, drained or not.
    seen: HashSet<Address>,
    /// Accepted addresses not yet drained. VecDeque for FIFO.
    pending: VecDeque<Address>,
}

/// Thread-safe queue of addresses to crawl.
///
/// An address is accepted at most once for the lifetime of the queue, so a
/// host gossiped by many peers is dialed once. Identity ignores the port.
pub struct AddressQueue {
    inner: Mutex<Inner>,
    available: Condvar,
    reporter: Option<Arc<dyn Reporter>>,
}

impl AddressQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            available: Condvar::new(),
            reporter: None,
        }
    }

    /// Create a queue that reports every newly accepted address.
    pub fn with_reporter(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter: Some(reporter),
            ..Self::new()
        }
    }

    /// Add `address` unless it has been seen before.
    ///
    /// Returns `true` if the address was new. The first address to land in an
    /// empty queue wakes one blocked consumer.
    pub fn offer(&self, address: Address) -> bool {
        {
            let mut inner = self.inner.lock();
            if !inner.seen.insert(address) {
                trace!("Duplicate address {address}");
                return false;
            }
            inner.pending.push_back(address);
            if inner.pending.len() == 1 {
                self.available.notify_one();
            }
        }

        if let Some(reporter) = &self.reporter {
            reporter.report_new_address(&address);
        }
        true
    }

    /// Remove up to `max` addresses from the head of the queue.
    ///
    /// With `block` unset an empty queue yields an empty batch. With `block`
    /// set the call waits until at least one address is available.
    pub fn drain(&self, max: usize, block: bool) -> Result<Vec<Address>, QueueError> {
        if max == 0 {
            return Err(QueueError::ZeroCount);
        }

        let mut inner = self.inner.lock();
        if block {
            while inner.pending.is_empty() {
                self.available.wait(&mut inner);
            }
        }

        let count = max.min(inner.pending.len());
        let batch: Vec<Address> = inner.pending.drain(..count).collect();
        // Pass the wakeup on if another consumer can make progress.
        if !inner.pending.is_empty() {
            self.available.notify_one();
        }
        Ok(batch)
    }

    /// Addresses accepted but not yet drained.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Addresses accepted over the lifetime of the queue.
    pub fn seen_count(&self) -> usize {
        self.inner.lock().seen.len()
    }
}

impl Default for AddressQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AddressQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AddressQueue")
            .field("pending", &inner.pending.len())
            .field("seen", &inner.seen.len())
            .finish()
    }
}
