//! Time broadcaster thread.
//!
//! Polls the clock well below a second and sends a tick whenever one is due.
//! Pacing lives in [`PlaybackClock::tick_with`], not here, so a late or early
//! wakeup never shifts the cadence: it only changes how soon after the
//! second boundary the tick goes out.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{DueTick, PlaybackClock};
use crate::protocol::ControlMessage;
use crate::shutdown::Shutdown;
use crate::trace::debug;

use super::announce::Announcer;

/// Sends the next tick if it is due.
pub(crate) fn emit_due_tick(clock: &PlaybackClock, announcer: &Announcer) -> Option<DueTick> {
    clock.tick_with(|tick| {
        debug!(ordinal = tick.ordinal, elapsed_ms = tick.elapsed_ms, "time tick");
        announcer.send(ControlMessage::tick(tick.elapsed_ms));
    })
}

pub(crate) struct TimeBroadcaster {
    clock: Arc<PlaybackClock>,
    announcer: Arc<Announcer>,
    shutdown: Arc<Shutdown>,
    poll: Duration,
}

impl TimeBroadcaster {
    pub(crate) fn new(
        clock: Arc<PlaybackClock>,
        announcer: Arc<Announcer>,
        shutdown: Arc<Shutdown>,
        poll: Duration,
    ) -> Self {
        Self {
            clock,
            announcer,
            shutdown,
            poll,
        }
    }

    pub(crate) fn run(&self) {
        while !self.shutdown.is_set() {
            emit_due_tick(&self.clock, &self.announcer);
            if self.shutdown.wait(self.poll) {
                break;
            }
        }
    }
}
