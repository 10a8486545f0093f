//! Discovery heartbeat thread.
//!
//! Probes with `heartbeat` while the show is stopped so idle devices keep
//! answering and stay on the roster. During a run the time ticks keep
//! devices talking instead, and extra broadcasts would only compete with
//! them. The catch is that a device powered on mid-show is not discovered
//! until the next stop.

use std::sync::Arc;

use crate::clock::PlaybackClock;
use crate::config::TimingConfig;
use crate::protocol::ControlMessage;
use crate::registry::Registry;
use crate::shutdown::Shutdown;

use super::announce::Announcer;

pub(crate) struct HeartbeatDriver {
    announcer: Arc<Announcer>,
    clock: Arc<PlaybackClock>,
    registry: Arc<Registry>,
    shutdown: Arc<Shutdown>,
    timing: TimingConfig,
}

impl HeartbeatDriver {
    pub(crate) fn new(
        announcer: Arc<Announcer>,
        clock: Arc<PlaybackClock>,
        registry: Arc<Registry>,
        shutdown: Arc<Shutdown>,
        timing: TimingConfig,
    ) -> Self {
        Self {
            announcer,
            clock,
            registry,
            shutdown,
            timing,
        }
    }

    pub(crate) fn run(&self) {
        while !self.shutdown.is_set() {
            let pause = self.beat();
            if self.shutdown.wait(pause) {
                break;
            }
        }
    }

    /// One iteration: probe if stopped, then pick the next pause from the
    /// number of connected devices.
    ///
    /// The heartbeat is sent under the clock lock, so it can never land after
    /// the first tick of a run that starts concurrently.
    fn beat(&self) -> std::time::Duration {
        self.clock.when_stopped(|| {
            self.announcer.send(ControlMessage::Heartbeat);
        });
        self.timing
            .heartbeat_interval(self.registry.counts().connected)
    }
}
