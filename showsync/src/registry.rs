//! Roster of every device that has ever answered.
//!
//! Entries are keyed by source IP and kept in first-seen order. Nothing is
//! ever removed: a device that goes quiet flips to
//! [`Liveness::Disconnected`] on the next read, and comes back as soon as it
//! speaks again. Liveness is never stored; it is recomputed from
//! `last_seen_ms` on every read, so there is no background writer to race
//! the listener.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;

use crate::protocol::DeviceReport;
use crate::time::TimeSource;

/// Reachability derived from the time since a device last spoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Connected,
    Disconnected,
}

/// Stored state for one device.
#[derive(Debug, Clone)]
struct DeviceState {
    address: IpAddr,
    device_id: String,
    task_status: String,
    last_seen_ms: Option<u64>,
}

/// Read-time view of a device, liveness included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSnapshot {
    pub address: IpAddr,
    pub device_id: String,
    pub task_status: String,
    pub last_seen_ms: Option<u64>,
    /// Milliseconds since the last datagram, as of the snapshot.
    pub silent_for_ms: Option<u64>,
    pub liveness: Liveness,
}

/// Roster totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub connected: usize,
    pub disconnected: usize,
    pub total: usize,
}

#[derive(Debug, Default)]
struct Roster {
    devices: Vec<DeviceState>,
    index: HashMap<IpAddr, usize>,
}

/// Thread-safe device roster.
///
/// Only the response listener writes; any number of readers may take
/// snapshots concurrently. Each operation holds the lock for its whole
/// duration, so a reader sees an entry either before or after an update.
pub struct Registry {
    roster: RwLock<Roster>,
    clock: Arc<dyn TimeSource>,
    liveness_timeout_ms: u64,
}

impl Registry {
    #[must_use]
    pub fn new(clock: Arc<dyn TimeSource>, liveness_timeout: Duration) -> Self {
        Self {
            roster: RwLock::new(Roster::default()),
            clock,
            liveness_timeout_ms: u64::try_from(liveness_timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Records a datagram from `address`.
    ///
    /// Creates the entry on first contact; afterwards refreshes id, status
    /// and last-seen time in place.
    pub fn observe(&self, address: IpAddr, message: &str) {
        let report = DeviceReport::parse(message);
        let now = self.clock.now_ms();
        let mut roster = self.roster.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(&slot) = roster.index.get(&address) {
            let device = &mut roster.devices[slot];
            report.device_id.clone_into(&mut device.device_id);
            report.task_status.clone_into(&mut device.task_status);
            device.last_seen_ms = Some(now);
            return;
        }

        let slot = roster.devices.len();
        roster.devices.push(DeviceState {
            address,
            device_id: report.device_id.to_owned(),
            task_status: report.task_status.to_owned(),
            last_seen_ms: Some(now),
        });
        roster.index.insert(address, slot);
    }

    /// All devices in first-seen order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeviceSnapshot> {
        let now = self.clock.now_ms();
        let roster = self.roster.read().unwrap_or_else(PoisonError::into_inner);
        roster
            .devices
            .iter()
            .map(|device| {
                let silent_for_ms = device.last_seen_ms.map(|seen| now.saturating_sub(seen));
                let liveness = match silent_for_ms {
                    Some(silent) if silent <= self.liveness_timeout_ms => Liveness::Connected,
                    _ => Liveness::Disconnected,
                };
                DeviceSnapshot {
                    address: device.address,
                    device_id: device.device_id.clone(),
                    task_status: device.task_status.clone(),
                    last_seen_ms: device.last_seen_ms,
                    silent_for_ms,
                    liveness,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn counts(&self) -> Counts {
        let snapshot = self.snapshot();
        let connected = snapshot
            .iter()
            .filter(|d| d.liveness == Liveness::Connected)
            .count();
        Counts {
            connected,
            disconnected: snapshot.len() - connected,
            total: snapshot.len(),
        }
    }

    /// Number of distinct addresses seen.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roster
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .devices
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
