//! Wall-clock sources for the registry and the playback clock.
//!
//! Everything downstream works in whole milliseconds since the Unix epoch,
//! which is what the show clock is anchored to. Tests swap in a
//! [`ManualClock`] so liveness and cadence can be driven without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use minstant::{Anchor, Instant};

/// A source of "now" in milliseconds since the Unix epoch.
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// TSC-backed wall clock.
///
/// Reads go through [`minstant::Instant`], converted to Unix time via an
/// [`Anchor`] captured at construction. Monotonic between calls, unlike
/// `SystemTime`, so elapsed-time arithmetic never runs backwards.
pub struct SystemClock {
    anchor: Anchor,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            anchor: Anchor::new(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_unix_nanos(&self.anchor) / 1_000_000
    }
}

/// Hand-driven clock.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a clock frozen at `now_ms`.
    #[must_use]
    pub const fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let ms = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jumps to an absolute time.
    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
