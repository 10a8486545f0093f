//! Broadcast address discovery.
//!
//! The outbound interface is found by "connecting" a throwaway UDP socket to
//! a public address. Connecting a datagram socket only selects a route, no
//! packet leaves the host, and the socket's local address is then the
//! address of the interface that route uses.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use crate::config::BroadcastTarget;
use crate::trace::info;

use super::TransportError;

/// Any routable address works; nothing is sent to it.
const ROUTE_PROBE: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 80);

/// Local IPv4 address of the interface carrying the default route.
///
/// # Errors
///
/// Fails when there is no route (offline host) or the route is IPv6.
pub fn local_ipv4() -> io::Result<Ipv4Addr> {
    let probe = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    probe.connect(ROUTE_PROBE)?;
    match probe.local_addr()? {
        SocketAddr::V4(addr) => Ok(*addr.ip()),
        SocketAddr::V6(addr) => Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("default route uses IPv6 address {}", addr.ip()),
        )),
    }
}

/// Directed broadcast address of `host` under a `/prefix_len` subnet.
///
/// `/31` and `/32` have no broadcast address, so only prefixes up to `/30`
/// are accepted.
#[must_use]
pub fn broadcast_address(host: Ipv4Addr, prefix_len: u8) -> Option<Ipv4Addr> {
    if prefix_len > 30 {
        return None;
    }
    let host_bits = u32::MAX.checked_shr(u32::from(prefix_len)).unwrap_or(0);
    Some(Ipv4Addr::from(u32::from(host) | host_bits))
}

/// Resolves the configured target to a concrete broadcast address.
///
/// # Errors
///
/// Fails when discovery finds no usable IPv4 interface or the prefix length
/// has no broadcast address. There is no fallback: without a destination
/// the controller cannot reach any device.
pub fn resolve(target: BroadcastTarget) -> Result<Ipv4Addr, TransportError> {
    match target {
        BroadcastTarget::Fixed(addr) => Ok(addr),
        BroadcastTarget::Discover { prefix_len } => {
            let host = local_ipv4().map_err(TransportError::LocalAddress)?;
            let broadcast = derive(host, prefix_len)?;
            // The interface netmask is not read; the prefix is an assumption.
            info!(
                host = %host,
                prefix_len,
                broadcast = %broadcast,
                "broadcast address derived from assumed /{} subnet; pass a fixed address or prefix if the LAN differs",
                prefix_len
            );
            Ok(broadcast)
        }
    }
}

fn derive(host: Ipv4Addr, prefix_len: u8) -> Result<Ipv4Addr, TransportError> {
    if host.is_unspecified() || host.is_loopback() {
        return Err(TransportError::NoSubnet(host));
    }
    broadcast_address(host, prefix_len).ok_or(TransportError::InvalidPrefix(prefix_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_c_broadcast() {
        assert_eq!(
            broadcast_address(Ipv4Addr::new(192, 168, 1, 37), 24),
            Some(Ipv4Addr::new(192, 168, 1, 255))
        );
    }

    #[test]
    fn other_prefixes() {
        let host = Ipv4Addr::new(10, 20, 30, 40);
        assert_eq!(
            broadcast_address(host, 8),
            Some(Ipv4Addr::new(10, 255, 255, 255))
        );
        assert_eq!(
            broadcast_address(host, 20),
            Some(Ipv4Addr::new(10, 20, 31, 255))
        );
        assert_eq!(
            broadcast_address(host, 30),
            Some(Ipv4Addr::new(10, 20, 30, 43))
        );
        assert_eq!(broadcast_address(host, 0), Some(Ipv4Addr::BROADCAST));
    }

    #[test]
    fn point_to_point_prefixes_have_no_broadcast() {
        let host = Ipv4Addr::new(10, 0, 0, 1);
        assert_eq!(broadcast_address(host, 31), None);
        assert_eq!(broadcast_address(host, 32), None);
    }

    #[test]
    fn wider_lan_needs_its_own_prefix() {
        let host = Ipv4Addr::new(192, 168, 2, 7);
        assert_eq!(derive(host, 24).unwrap(), Ipv4Addr::new(192, 168, 2, 255));
        assert_eq!(derive(host, 23).unwrap(), Ipv4Addr::new(192, 168, 3, 255));
        assert_eq!(derive(host, 16).unwrap(), Ipv4Addr::new(192, 168, 255, 255));
    }

    #[test]
    fn fixed_target_skips_discovery() {
        let addr = Ipv4Addr::new(172, 16, 0, 255);
        assert_eq!(resolve(BroadcastTarget::Fixed(addr)).unwrap(), addr);
    }

    #[test]
    fn loopback_host_is_rejected() {
        assert!(matches!(
            derive(Ipv4Addr::LOCALHOST, 24),
            Err(TransportError::NoSubnet(_))
        ));
        assert!(matches!(
            derive(Ipv4Addr::UNSPECIFIED, 24),
            Err(TransportError::NoSubnet(_))
        ));
    }

    #[test]
    fn bad_prefix_is_reported() {
        assert!(matches!(
            derive(Ipv4Addr::new(192, 168, 0, 2), 31),
            Err(TransportError::InvalidPrefix(31))
        ));
    }
}
