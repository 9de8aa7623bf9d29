//! Session epoch: each `start_listening` advances a generation counter.
//! Events queued before a restart carry an older stamp and are dropped by the
//! event loop instead of polluting the fresh session.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct SessionEpoch {
    current: AtomicU64,
}

impl SessionEpoch {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
        }
    }

    /// Epoch to stamp onto an event being enqueued.
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Advance to a fresh epoch, invalidating everything stamped earlier.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// True when `stamp` is still the live epoch.
    #[inline]
    pub fn is_current(&self, stamp: u64) -> bool {
        self.current() == stamp
    }
}

impl Default for SessionEpoch {
    fn default() -> Self {
        Self::new()
    }
}
