//! Controller configuration.
//!
//! Defaults reproduce the deployed light-dance setup: broadcasts to
//! `x.y.z.255:12345`, replies on `12346`, devices considered gone after two
//! seconds of silence.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::time::Duration;

/// Port devices listen on for control broadcasts.
pub const DEFAULT_CONTROL_PORT: u16 = 12345;

/// Port the controller listens on for device replies.
pub const DEFAULT_RESPONSE_PORT: u16 = 12346;

/// Subnet size assumed when deriving the broadcast address.
///
/// The interface netmask is not consulted. Wider or narrower LANs need
/// [`BroadcastTarget::Discover`] with their own prefix, or a fixed address.
pub const DEFAULT_PREFIX_LEN: u8 = 24;

/// Where control broadcasts go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTarget {
    /// Find the outbound interface address and set all host bits under
    /// `prefix_len`.
    Discover { prefix_len: u8 },
    /// Use this address as is.
    Fixed(Ipv4Addr),
}

impl Default for BroadcastTarget {
    fn default() -> Self {
        Self::Discover {
            prefix_len: DEFAULT_PREFIX_LEN,
        }
    }
}

/// Intervals for the background threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingConfig {
    /// Silence after which a device is reported disconnected.
    ///
    /// **Default**: 2s
    pub liveness_timeout: Duration,

    /// Heartbeat period while no device is connected.
    ///
    /// Slower probing keeps an empty network quiet.
    ///
    /// **Default**: 500ms
    pub heartbeat_idle: Duration,

    /// Heartbeat period while at least one device is connected.
    ///
    /// **Default**: 100ms
    pub heartbeat_active: Duration,

    /// Longest the listener blocks before re-checking shutdown.
    ///
    /// **Default**: 100ms
    pub receive_timeout: Duration,

    /// How often the time broadcaster checks for a due tick.
    ///
    /// Bounds how late a tick can go out after its second boundary.
    ///
    /// **Default**: 50ms
    pub tick_poll: Duration,
}

impl TimingConfig {
    /// Tight intervals for loopback tests and small benches.
    #[must_use]
    pub fn local() -> Self {
        Self {
            liveness_timeout: Duration::from_millis(500),
            heartbeat_idle: Duration::from_millis(50),
            heartbeat_active: Duration::from_millis(20),
            receive_timeout: Duration::from_millis(20),
            tick_poll: Duration::from_millis(10),
        }
    }

    /// Gentler probing for crowded or lossy Wi-Fi.
    #[must_use]
    pub fn relaxed() -> Self {
        Self {
            liveness_timeout: Duration::from_secs(5),
            heartbeat_idle: Duration::from_secs(1),
            heartbeat_active: Duration::from_millis(250),
            ..Self::default()
        }
    }

    /// Heartbeat period for the given number of connected devices.
    #[must_use]
    pub const fn heartbeat_interval(&self, connected: usize) -> Duration {
        if connected == 0 {
            self.heartbeat_idle
        } else {
            self.heartbeat_active
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: Duration::from_secs(2),
            heartbeat_idle: Duration::from_millis(500),
            heartbeat_active: Duration::from_millis(100),
            receive_timeout: Duration::from_millis(100),
            tick_poll: Duration::from_millis(50),
        }
    }
}

/// External audio player settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioConfig {
    /// Track to play.
    pub file: PathBuf,
    /// Player executable.
    pub program: String,
    /// Player arguments. `{offset}` becomes the start offset in seconds and
    /// `{file}` the track path.
    pub args: Vec<String>,
}

impl AudioConfig {
    /// `ffplay` without a window, exiting at end of track.
    #[must_use]
    pub fn ffplay(file: impl Into<PathBuf>) -> Self {
        Self {
            file: file.into(),
            program: "ffplay".to_owned(),
            args: ["-nodisp", "-autoexit", "-loglevel", "quiet", "-ss", "{offset}", "{file}"]
                .map(str::to_owned)
                .to_vec(),
        }
    }
}

/// Everything [`Controller::spawn`](crate::Controller::spawn) needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Interface the response socket binds to.
    pub bind_ip: Ipv4Addr,
    /// Destination port for control broadcasts.
    pub control_port: u16,
    /// Local port device replies arrive on.
    pub response_port: u16,
    pub broadcast: BroadcastTarget,
    pub timing: TimingConfig,
    /// `None` runs without audio.
    pub audio: Option<AudioConfig>,
}

impl ControllerConfig {
    /// Socket address the response socket binds to.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.bind_ip, self.response_port)
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            bind_ip: Ipv4Addr::UNSPECIFIED,
            control_port: DEFAULT_CONTROL_PORT,
            response_port: DEFAULT_RESPONSE_PORT,
            broadcast: BroadcastTarget::default(),
            timing: TimingConfig::default(),
            audio: None,
        }
    }
}
