//! Pausable, resumable show clock.
//!
//! ```text
//!            start(offset)
//!   Stopped ───────────────▶ Running
//!      ▲                        │
//!      └────────────────────────┘
//!        stop(): offset = floor(elapsed / 1000)
//! ```
//!
//! Elapsed time while running is `(now - root) + offset * 1000`. Stopping
//! folds the elapsed time back into the offset, so the next `start` with that
//! offset resumes where the show left off. Out-of-order calls (`start` while
//! running, `stop` while stopped) leave the state untouched.
//!
//! The clock also owns the per-run tick counter that paces time broadcasts.
//! A tick is due when the time elapsed *in this run* reaches `1000 * ticks`;
//! the counter only ever advances by one per poll, so broadcast values march
//! forward one second at a time no matter how unevenly the poller runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::time::TimeSource;

/// Clock state. `root_ms == 0` exactly when stopped.
#[derive(Debug, Default)]
struct ClockState {
    offset_secs: u64,
    root_ms: u64,
    ticks_sent: u64,
}

impl ClockState {
    const fn is_running(&self) -> bool {
        self.root_ms != 0
    }

    fn run_elapsed_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.root_ms)
    }

    fn elapsed_ms(&self, now_ms: u64) -> u64 {
        let base = self.offset_secs.saturating_mul(1_000);
        if self.is_running() {
            self.run_elapsed_ms(now_ms).saturating_add(base)
        } else {
            base
        }
    }
}

/// A time tick that is due for broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueTick {
    /// 1-based ordinal of the tick within the current run.
    pub ordinal: u64,
    /// Absolute elapsed show time, offset included.
    pub elapsed_ms: u64,
}

/// Shared playback clock.
pub struct PlaybackClock {
    state: Mutex<ClockState>,
    time: Arc<dyn TimeSource>,
}

impl PlaybackClock {
    #[must_use]
    pub fn new(time: Arc<dyn TimeSource>) -> Self {
        Self {
            state: Mutex::new(ClockState::default()),
            time,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn now_ms(&self) -> u64 {
        // 0 is reserved for "not running"; a source reporting the epoch
        // itself must still start a run.
        self.time.now_ms().max(1)
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock().is_running()
    }

    /// Offset a stopped clock would resume from.
    #[must_use]
    pub fn offset_secs(&self) -> u64 {
        self.lock().offset_secs
    }

    /// Elapsed show time. While stopped this is the frozen offset.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        let now = self.now_ms();
        self.lock().elapsed_ms(now)
    }

    /// Starts a run at `offset_secs`.
    ///
    /// Returns `false` (and changes nothing) if already running.
    pub fn start(&self, offset_secs: u64) -> bool {
        let now = self.now_ms();
        let mut state = self.lock();
        if state.is_running() {
            return false;
        }
        state.offset_secs = offset_secs;
        state.root_ms = now;
        state.ticks_sent = 0;
        true
    }

    /// Stops the run, returning the whole seconds elapsed.
    ///
    /// Returns `None` if already stopped.
    pub fn stop(&self) -> Option<u64> {
        self.stop_with(|_| ())
    }

    /// Like [`stop`](Self::stop), running `on_stop` with the stored offset
    /// before the lock is released.
    ///
    /// Anything `on_stop` sends is ordered after every tick handed out by
    /// [`tick_with`](Self::tick_with) for the run being stopped.
    pub fn stop_with<F: FnOnce(u64)>(&self, on_stop: F) -> Option<u64> {
        let now = self.now_ms();
        let mut state = self.lock();
        if !state.is_running() {
            return None;
        }
        let elapsed_secs = state.elapsed_ms(now) / 1_000;
        state.offset_secs = elapsed_secs;
        state.root_ms = 0;
        on_stop(elapsed_secs);
        Some(elapsed_secs)
    }

    /// Runs `emit` only if the clock is stopped, holding the lock
    /// throughout. Returns whether it ran.
    ///
    /// A concurrent [`start`](Self::start) waits for `emit` to return, so
    /// anything sent here is ordered before the first tick of the next run.
    pub fn when_stopped<F: FnOnce()>(&self, emit: F) -> bool {
        let state = self.lock();
        if state.is_running() {
            return false;
        }
        emit();
        true
    }

    /// Sets the resume offset without starting.
    ///
    /// Ignored while running; the live offset only changes through `stop`.
    pub fn set_offset(&self, offset_secs: u64) -> bool {
        let mut state = self.lock();
        if state.is_running() {
            return false;
        }
        state.offset_secs = offset_secs;
        true
    }

    /// Claims the next tick if one is due.
    #[must_use]
    pub fn poll_tick(&self) -> Option<DueTick> {
        self.tick_with(|_| ())
    }

    /// Claims the next tick if one is due and hands it to `emit` while the
    /// clock is still locked.
    pub fn tick_with<F: FnOnce(DueTick)>(&self, emit: F) -> Option<DueTick> {
        let now = self.now_ms();
        let mut state = self.lock();
        if !state.is_running() {
            return None;
        }
        if state.run_elapsed_ms(now) < state.ticks_sent.saturating_mul(1_000) {
            return None;
        }
        state.ticks_sent += 1;
        let tick = DueTick {
            ordinal: state.ticks_sent,
            elapsed_ms: state.elapsed_ms(now),
        };
        emit(tick);
        Some(tick)
    }
}
