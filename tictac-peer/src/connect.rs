//! Connection establishment: acceptor and initiator roles over TCP and UDP.
//! UDP has no connection, so the two sides trade a fixed token pair first.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

use tictac_core::{HANDSHAKE_ACK_TOKEN, HANDSHAKE_TOKEN};
use tokio::net::{TcpSocket, UdpSocket};
use tokio::time::Instant;

use crate::error::ConnectError;
use crate::factory::{self, Handle};
use crate::transport::{DatagramEndpoint, Endpoint, StreamEndpoint, RECV_BUFFER};
use crate::{Role, Timeouts, TransportKind};

/// Bring up an endpoint for `role` over `kind`. The acceptor binds `address:port`;
/// the initiator targets it.
pub async fn establish_connection(
    kind: TransportKind,
    role: Role,
    address: &str,
    port: u16,
    timeouts: &Timeouts,
) -> Result<Endpoint, ConnectError> {
    let addr = factory::resolve(address, port).await?;
    let handle = factory::create_handle(address, kind)?;
    let endpoint: Endpoint = match (handle, role) {
        (Handle::Stream(sock), Role::Acceptor) => Arc::new(tcp_accept(sock, addr).await?),
        (Handle::Stream(sock), Role::Initiator) => Arc::new(tcp_connect(sock, addr).await?),
        (Handle::Datagram(sock), Role::Acceptor) => {
            let (socket, peer) = udp_accept(sock, addr).await?;
            Arc::new(DatagramEndpoint::new(socket, peer, timeouts.receive))
        }
        (Handle::Datagram(sock), Role::Initiator) => {
            let socket = udp_connect(sock, addr, timeouts).await?;
            Arc::new(DatagramEndpoint::new(socket, addr, timeouts.receive))
        }
    };
    Ok(endpoint)
}

async fn tcp_accept(sock: TcpSocket, addr: SocketAddr) -> Result<StreamEndpoint, ConnectError> {
    sock.bind(addr)
        .map_err(|source| ConnectError::Bind { addr, source })?;
    let listener = sock.listen(1).map_err(ConnectError::Listen)?;
    tracing::info!(%addr, "waiting for TCP peer");
    let (stream, peer) = listener.accept().await.map_err(ConnectError::Accept)?;
    // Listener drops here; only the accepted stream lives on.
    tracing::info!(%peer, "TCP peer connected");
    Ok(StreamEndpoint::new(stream))
}

async fn tcp_connect(sock: TcpSocket, addr: SocketAddr) -> Result<StreamEndpoint, ConnectError> {
    let stream = sock
        .connect(addr)
        .await
        .map_err(|source| ConnectError::ConnectFailed { addr, source })?;
    tracing::info!(%addr, "connected to TCP peer");
    Ok(StreamEndpoint::new(stream))
}

async fn udp_accept(
    sock: socket2::Socket,
    addr: SocketAddr,
) -> Result<(UdpSocket, SocketAddr), ConnectError> {
    sock.bind(&addr.into())
        .map_err(|source| ConnectError::Bind { addr, source })?;
    let socket = UdpSocket::from_std(sock.into()).map_err(ConnectError::Socket)?;
    tracing::info!(%addr, "waiting for first UDP datagram");
    let mut buf = [0u8; RECV_BUFFER];
    let (n, peer) = socket
        .recv_from(&mut buf)
        .await
        .map_err(ConnectError::Handshake)?;
    let hello = String::from_utf8_lossy(&buf[..n]);
    if hello != HANDSHAKE_TOKEN {
        tracing::warn!(%peer, payload = %hello, "first datagram is not a handshake; taking sender as peer");
    }
    socket
        .send_to(HANDSHAKE_ACK_TOKEN.as_bytes(), peer)
        .await
        .map_err(ConnectError::Handshake)?;
    tracing::info!(%peer, "UDP peer confirmed");
    Ok((socket, peer))
}

async fn udp_connect(
    sock: socket2::Socket,
    target: SocketAddr,
    timeouts: &Timeouts,
) -> Result<UdpSocket, ConnectError> {
    let local = wildcard(&target);
    sock.bind(&local.into())
        .map_err(|source| ConnectError::Bind {
            addr: local,
            source,
        })?;
    let socket = UdpSocket::from_std(sock.into()).map_err(ConnectError::Socket)?;
    socket
        .send_to(HANDSHAKE_TOKEN.as_bytes(), target)
        .await
        .map_err(ConnectError::Handshake)?;
    tracing::info!(%target, "handshake sent, waiting for confirmation");

    let deadline = Instant::now() + timeouts.handshake;
    let mut buf = [0u8; RECV_BUFFER];
    loop {
        let (n, from) = match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => return Err(ConnectError::HandshakeTimeout(target)),
            Ok(Ok(v)) => v,
            // ICMP port unreachable on some platforms; keep waiting until the deadline.
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused
                ) =>
            {
                continue
            }
            Ok(Err(e)) => return Err(ConnectError::Handshake(e)),
        };
        if from != target {
            tracing::warn!(%from, %target, "ignoring datagram from unexpected address");
            continue;
        }
        let reply = String::from_utf8_lossy(&buf[..n]);
        if reply != HANDSHAKE_ACK_TOKEN {
            tracing::warn!(%reply, "unexpected handshake reply");
            return Err(ConnectError::UnexpectedReply(reply.into_owned()));
        }
        tracing::info!(%target, "UDP connection confirmed");
        return Ok(socket);
    }
}

fn wildcard(target: &SocketAddr) -> SocketAddr {
    let ip = match target {
        SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    SocketAddr::new(ip, 0)
}
