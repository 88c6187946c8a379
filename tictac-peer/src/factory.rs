//! Socket factory: picks address family and socket kind for a target address.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpSocket;

use crate::error::ConnectError;
use crate::TransportKind;

/// Unbound socket of the right family and kind.
pub enum Handle {
    Stream(TcpSocket),
    Datagram(Socket),
}

/// IPv6 when the address text contains a colon, IPv4 otherwise.
pub fn is_ipv6(address: &str) -> bool {
    address.contains(':')
}

/// Create an unbound socket for `address`. UDP sockets get SO_REUSEADDR so a
/// restarted acceptor can rebind right away.
pub fn create_handle(address: &str, kind: TransportKind) -> Result<Handle, ConnectError> {
    let v6 = is_ipv6(address);
    match kind {
        TransportKind::Tcp => {
            let sock = if v6 {
                TcpSocket::new_v6()
            } else {
                TcpSocket::new_v4()
            }
            .map_err(ConnectError::Socket)?;
            Ok(Handle::Stream(sock))
        }
        TransportKind::Udp => {
            let domain = if v6 { Domain::IPV6 } else { Domain::IPV4 };
            let sock = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
                .map_err(ConnectError::Socket)?;
            sock.set_reuse_address(true).map_err(ConnectError::Socket)?;
            sock.set_nonblocking(true).map_err(ConnectError::Socket)?;
            Ok(Handle::Datagram(sock))
        }
    }
}

/// Resolve `address:port` to a socket address of the family `create_handle` picks.
pub async fn resolve(address: &str, port: u16) -> Result<SocketAddr, ConnectError> {
    // A literal always matches: only IPv6 literals contain a colon.
    if let Ok(ip) = address.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    let found = tokio::net::lookup_host((address, port))
        .await
        .map_err(|e| ConnectError::Resolve {
            address: address.to_string(),
            reason: e.to_string(),
        })?;
    pick_family(address, found)
}

/// First candidate in the family detected from `address`.
fn pick_family(
    address: &str,
    candidates: impl IntoIterator<Item = SocketAddr>,
) -> Result<SocketAddr, ConnectError> {
    let want_v6 = is_ipv6(address);
    let mut other = None;
    for addr in candidates {
        if addr.is_ipv6() == want_v6 {
            return Ok(addr);
        }
        other.get_or_insert(addr);
    }
    match other {
        Some(addr) => Err(ConnectError::AddressFamily(addr)),
        None => Err(ConnectError::Resolve {
            address: address.to_string(),
            reason: "no addresses".to_string(),
        }),
    }
}
