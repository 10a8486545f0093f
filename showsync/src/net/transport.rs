//! The controller's single socket plus its broadcast destination.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use thiserror::Error;

use crate::config::ControllerConfig;
use crate::trace::{debug, info};

use super::{UdpSocket, subnet};

const RX: Token = Token(0);

/// Startup failures. All of them are fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot determine local IPv4 address: {0}")]
    LocalAddress(#[source] io::Error),
    #[error("local address {0} has no broadcast subnet")]
    NoSubnet(Ipv4Addr),
    #[error("prefix length /{0} has no broadcast address")]
    InvalidPrefix(u8),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },
    #[error("failed to set up receive polling: {0}")]
    Poll(#[source] io::Error),
}

/// Somewhere control broadcasts can be sent.
///
/// [`Transport`] is the real one; tests substitute recorders.
pub trait BroadcastSink: Send + Sync {
    /// Sends `payload` to every device. Best effort.
    ///
    /// # Errors
    ///
    /// Returns the underlying send error. Nothing retries it.
    fn broadcast(&self, payload: &[u8]) -> io::Result<()>;
}

/// Bound socket plus broadcast destination.
pub struct Transport {
    socket: UdpSocket,
    destination: SocketAddr,
}

impl Transport {
    /// Resolves the broadcast address and binds the response port.
    ///
    /// # Errors
    ///
    /// See [`TransportError`].
    pub fn open(config: &ControllerConfig) -> Result<Self, TransportError> {
        let broadcast = subnet::resolve(config.broadcast)?;
        let destination = SocketAddrV4::new(broadcast, config.control_port);
        Self::bind(config.bind_addr(), destination.into())
    }

    /// Binds `bind` and sends broadcasts to `destination`, no discovery.
    ///
    /// # Errors
    ///
    /// [`TransportError::Bind`] if the socket cannot be bound.
    pub fn bind(bind: SocketAddrV4, destination: SocketAddr) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind_broadcast(bind)
            .map_err(|source| TransportError::Bind { addr: bind, source })?;
        info!(
            bind = %bind,
            destination = %destination,
            "transport ready"
        );
        Ok(Self {
            socket,
            destination,
        })
    }

    /// Where broadcasts go.
    #[must_use]
    pub const fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Address of the response socket.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Creates the receive side. Only one receiver should exist at a time;
    /// two would split the incoming datagrams between them.
    ///
    /// # Errors
    ///
    /// [`TransportError::Poll`] if the poller cannot be created.
    pub fn receiver(self: &Arc<Self>) -> Result<Receiver, TransportError> {
        let poll = Poll::new().map_err(TransportError::Poll)?;
        let fd = self.socket.as_raw_fd();
        poll.registry()
            .register(&mut SourceFd(&fd), RX, Interest::READABLE)
            .map_err(TransportError::Poll)?;
        Ok(Receiver {
            transport: Arc::clone(self),
            poll,
            events: Events::with_capacity(8),
        })
    }
}

impl BroadcastSink for Transport {
    fn broadcast(&self, payload: &[u8]) -> io::Result<()> {
        let sent = self.socket.send_to(payload, self.destination)?;
        if sent != payload.len() {
            debug!(sent, expected = payload.len(), "short broadcast");
        }
        Ok(())
    }
}

/// Blocking-with-timeout receive side of a [`Transport`].
pub struct Receiver {
    transport: Arc<Transport>,
    poll: Poll,
    events: Events,
}

impl Receiver {
    /// Waits up to `timeout` for one datagram.
    ///
    /// Returns `Ok(None)` on timeout. Datagrams longer than `buf` are
    /// truncated.
    ///
    /// # Errors
    ///
    /// Socket or poller failures other than interruption.
    pub fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<(usize, SocketAddr)>> {
        // Readiness is edge-triggered: anything already queued must be read
        // before parking, or it would wait for the next arrival.
        if let Some(got) = self.transport.socket.try_recv_from(buf)? {
            return Ok(Some(got));
        }
        match self.poll.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(None),
            Err(e) => return Err(e),
        }
        if self.events.is_empty() {
            return Ok(None);
        }
        self.transport.socket.try_recv_from(buf)
    }
}
