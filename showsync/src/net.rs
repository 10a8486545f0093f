//! Network plumbing: the shared UDP socket, broadcast address discovery,
//! and the [`Transport`] the controller threads talk through.
//!
//! One socket does everything. It is bound to the response port, sends
//! control broadcasts to `<broadcast address>:<control port>`, and receives
//! device replies. Sending and receiving from different threads is safe on a
//! shared UDP socket, so the transport is simply wrapped in an `Arc`.

pub mod socket;
pub mod subnet;
pub mod transport;

pub use socket::UdpSocket;
pub use transport::{BroadcastSink, Receiver, Transport, TransportError};
