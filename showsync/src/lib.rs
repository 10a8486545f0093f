//! Show controller for networked light-dance devices.
//!
//! Devices on the LAN are kept in step by UDP broadcast: a `heartbeat`
//! probe while the show is stopped, the elapsed show time once per second
//! while it runs, and `stop` when it ends. Devices answer with
//! `<id>: <status>` and the controller tracks who is still talking.
//!
//! See [`controller`] for the thread layout and wire traffic.

pub mod audio;
pub mod clock;
pub mod config;
pub mod controller;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod shutdown;
pub mod time;
mod trace;

pub use config::{AudioConfig, BroadcastTarget, ControllerConfig, TimingConfig};
pub use controller::{Controller, ControllerError, StartOutcome, StopOutcome};
pub use registry::{Counts, DeviceSnapshot, Liveness};
pub use trace::init_tracing;
