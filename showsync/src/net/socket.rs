//! Broadcast-capable UDP socket on top of mio.
//!
//! std and mio both bind immediately on construction, which leaves no window
//! to set `SO_REUSEADDR`. The socket is therefore created and configured
//! through rustix, bound, and only then handed to mio.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, SocketAddrV4};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};

use mio::net::UdpSocket as MioUdpSocket;
use rustix::net::{AddressFamily, SocketType, sockopt};

/// A non-blocking UDP socket with broadcast enabled.
pub struct UdpSocket {
    inner: MioUdpSocket,
}

impl UdpSocket {
    /// Creates a socket with `SO_REUSEADDR` and `SO_BROADCAST` set, bound to
    /// `addr`.
    ///
    /// Address reuse lets a restarted controller take the response port back
    /// while the previous socket lingers.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be created, configured or bound.
    pub fn bind_broadcast(addr: SocketAddrV4) -> io::Result<Self> {
        let fd = rustix::net::socket(AddressFamily::INET, SocketType::DGRAM, None)?;
        sockopt::set_socket_reuseaddr(&fd, true)?;
        sockopt::set_socket_broadcast(&fd, true)?;
        rustix::net::bind(&fd, &addr)?;

        let socket = std::net::UdpSocket::from(fd);
        socket.set_nonblocking(true)?;
        Ok(Self {
            inner: MioUdpSocket::from_std(socket),
        })
    }

    /// Returns the local address this socket is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the local address cannot be retrieved.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Sends one datagram.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure, including `WouldBlock` when the send
    /// buffer is full. Callers treat that like any other lost datagram.
    pub fn send_to(&self, buf: &[u8], dest: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, dest)
    }

    /// Receives one datagram, returning `Ok(None)` instead of `WouldBlock`.
    ///
    /// Datagrams longer than `buf` are truncated.
    ///
    /// # Errors
    ///
    /// Returns any error other than `WouldBlock`.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.inner.recv_from(buf) {
            Ok(got) => Ok(Some(got)),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether `SO_BROADCAST` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the option cannot be read.
    pub fn broadcast_enabled(&self) -> io::Result<bool> {
        Ok(sockopt::socket_broadcast(self.inner.as_fd())?)
    }
}

impl AsFd for UdpSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl AsRawFd for UdpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
