//! Monotonic millisecond timebase.
//! The detector only ever subtracts two readings with wrapping arithmetic,
//! so u32 rollover in a long-lived process is harmless.

use std::time::Instant;

/// Monotonic millisecond counter. Implementations may wrap.
pub trait Timebase: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// Process-lifetime timebase backed by `Instant`.
pub struct MonotonicTimebase {
    origin: Instant,
}

impl MonotonicTimebase {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimebase {
    fn default() -> Self {
        Self::new()
    }
}

impl Timebase for MonotonicTimebase {
    fn now_ms(&self) -> u32 {
        self.origin.elapsed().as_millis() as u32
    }
}
