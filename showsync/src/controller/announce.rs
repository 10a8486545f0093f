//! Outbound side shared by every sender.
//!
//! Heartbeats, ticks and the stop message all funnel through one
//! [`Announcer`], which encodes them, hands them to the sink, and remembers
//! the last one in readable form for operator displays. Send failures are
//! logged and dropped; the protocol recovers on the next message.

use std::sync::{Arc, Mutex, PoisonError};

use crate::net::BroadcastSink;
use crate::protocol::ControlMessage;
use crate::trace::{trace, warn};

struct Outbox {
    scratch: Vec<u8>,
    last: Option<ControlMessage>,
}

pub(crate) struct Announcer {
    sink: Arc<dyn BroadcastSink>,
    outbox: Mutex<Outbox>,
}

impl Announcer {
    pub(crate) fn new(sink: Arc<dyn BroadcastSink>) -> Self {
        Self {
            sink,
            outbox: Mutex::new(Outbox {
                scratch: Vec::with_capacity(16),
                last: None,
            }),
        }
    }

    /// Broadcasts `msg`. Returns whether the send succeeded.
    pub(crate) fn send(&self, msg: ControlMessage) -> bool {
        let mut outbox = self.outbox.lock().unwrap_or_else(PoisonError::into_inner);
        msg.encode(&mut outbox.scratch);
        outbox.last = Some(msg);
        match self.sink.broadcast(&outbox.scratch) {
            Ok(()) => {
                trace!(message = %msg, "broadcast");
                true
            }
            Err(_e) => {
                warn!(message = %msg, error = %_e, "broadcast failed");
                false
            }
        }
    }

    /// Last message sent, as text. Empty before the first send.
    pub(crate) fn display(&self) -> String {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last
            .map(|msg| msg.to_string())
            .unwrap_or_default()
    }
}
