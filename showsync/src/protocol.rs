//! Controller ↔ device wire protocol.
//!
//! # Control messages (controller → devices, broadcast)
//!
//! There is no type tag. Receivers tell messages apart by content:
//!
//! | Payload                   | Meaning                                  |
//! |---------------------------|------------------------------------------|
//! | ASCII `heartbeat`         | discovery probe, sent while stopped      |
//! | ASCII `stop`              | halt immediately                         |
//! | 4 bytes, big-endian `u32` | absolute elapsed show time in ms         |
//!
//! Text keywords are matched first, so a 4-byte payload that happens to read
//! `stop` is the keyword. A tick of exactly `0x73746f70` ms (about 22 days of
//! show time) is therefore unreachable, which no show comes close to.
//!
//! # Device reports (devices → controller, unicast)
//!
//! UTF-8 text, either `"<device id>: <task status>"` or a bare status. Only
//! the first `:` separates; the remainder belongs to the status.

use std::fmt;

use thiserror::Error;

/// Discovery probe payload.
pub const HEARTBEAT: &[u8] = b"heartbeat";

/// Halt payload.
pub const STOP: &[u8] = b"stop";

/// Size of an encoded time tick.
pub const TICK_SIZE: usize = 4;

/// Device id used when a report carries none.
pub const UNKNOWN_DEVICE: &str = "Unknown";

/// Separator between device id and status in a report.
pub const REPORT_SEPARATOR: char = ':';

/// A message broadcast by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    Heartbeat,
    Stop,
    /// Elapsed show time in milliseconds.
    Tick(u32),
}

impl ControlMessage {
    /// Builds a tick, saturating times beyond the 32-bit wire range.
    #[must_use]
    pub fn tick(elapsed_ms: u64) -> Self {
        Self::Tick(u32::try_from(elapsed_ms).unwrap_or(u32::MAX))
    }

    /// Encodes into `buf`, clearing it first (capacity is kept).
    pub fn encode(&self, buf: &mut Vec<u8>) {
        buf.clear();
        match self {
            Self::Heartbeat => buf.extend_from_slice(HEARTBEAT),
            Self::Stop => buf.extend_from_slice(STOP),
            Self::Tick(ms) => buf.extend_from_slice(&ms.to_be_bytes()),
        }
    }

    /// Decodes a controller datagram the way a device would.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::Unrecognized`] if the payload is neither keyword and
    /// not exactly [`TICK_SIZE`] bytes long.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        if bytes == HEARTBEAT {
            return Ok(Self::Heartbeat);
        }
        if bytes == STOP {
            return Ok(Self::Stop);
        }
        let raw: [u8; TICK_SIZE] = bytes
            .try_into()
            .map_err(|_| ProtocolError::Unrecognized { len: bytes.len() })?;
        Ok(Self::Tick(u32::from_be_bytes(raw)))
    }
}

/// Human-readable form, as shown in the operator's broadcast readout.
impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heartbeat => f.write_str("heartbeat"),
            Self::Stop => f.write_str("stop"),
            Self::Tick(ms) => write!(f, "{ms}"),
        }
    }
}

/// Parsed device report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReport<'a> {
    pub device_id: &'a str,
    pub task_status: &'a str,
}

impl<'a> DeviceReport<'a> {
    /// Parses a report. Never fails: anything without a separator is a bare
    /// status from an anonymous device.
    #[must_use]
    pub fn parse(text: &'a str) -> Self {
        match text.split_once(REPORT_SEPARATOR) {
            Some((id, status)) => Self {
                device_id: id.trim(),
                task_status: status.trim(),
            },
            None => Self {
                device_id: UNKNOWN_DEVICE,
                task_status: text,
            },
        }
    }
}

/// Errors decoding controller messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unrecognized control payload ({len} bytes)")]
    Unrecognized { len: usize },
}
