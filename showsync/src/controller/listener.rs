//! Response listener thread.
//!
//! Feeds every device reply into the registry. Each datagram stands alone:
//! one that is not UTF-8 is dropped and the loop moves on, so a misbehaving
//! device cannot disturb the others or take the listener down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::net::Receiver;
use crate::registry::Registry;
use crate::shutdown::Shutdown;
use crate::trace::{debug, trace, warn};

/// Largest reply kept; longer ones are truncated.
pub(crate) const MAX_REPLY_SIZE: usize = 1024;

pub(crate) struct ResponseListener {
    receiver: Receiver,
    registry: Arc<Registry>,
    shutdown: Arc<Shutdown>,
    timeout: Duration,
    buf: Vec<u8>,
}

impl ResponseListener {
    pub(crate) fn new(
        receiver: Receiver,
        registry: Arc<Registry>,
        shutdown: Arc<Shutdown>,
        timeout: Duration,
    ) -> Self {
        Self {
            receiver,
            registry,
            shutdown,
            timeout,
            buf: vec![0u8; MAX_REPLY_SIZE],
        }
    }

    /// Receives until shutdown. The receive timeout bounds how long a
    /// shutdown request can go unnoticed.
    pub(crate) fn run(&mut self) {
        while !self.shutdown.is_set() {
            match self.receiver.receive(&mut self.buf, self.timeout) {
                Ok(Some((len, from))) => self.handle(len, from),
                Ok(None) => {}
                Err(_e) => {
                    warn!(error = %_e, "receive failed");
                    // Back off instead of spinning on a persistent error.
                    self.shutdown.wait(self.timeout);
                }
            }
        }
    }

    fn handle(&self, len: usize, from: SocketAddr) {
        match std::str::from_utf8(&self.buf[..len]) {
            Ok(text) => {
                trace!(from = %from, reply = text, "device reply");
                self.registry.observe(from.ip(), text);
            }
            Err(_e) => {
                debug!(from = %from, len, error = %_e, "dropping non-UTF-8 reply");
            }
        }
    }
}
