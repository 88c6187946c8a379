//! Connection and transport errors.

use std::net::SocketAddr;

use tictac_core::AbortReason;

/// Failure to bring up an endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("cannot resolve {address}: {reason}")]
    Resolve { address: String, reason: String },
    #[error("address family mismatch for {0}")]
    AddressFamily(SocketAddr),
    #[error("socket setup failed: {0}")]
    Socket(#[source] std::io::Error),
    #[error("bind to {addr} failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("listen failed: {0}")]
    Listen(#[source] std::io::Error),
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("no handshake reply from {0}")]
    HandshakeTimeout(SocketAddr),
    #[error("unexpected handshake reply {0:?}")]
    UnexpectedReply(String),
    #[error("handshake I/O failed: {0}")]
    Handshake(#[source] std::io::Error),
}

/// Failure of a single send or receive.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),
    #[error("receive timed out")]
    ReceiveTimeout,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("endpoint closed")]
    Closed,
    #[error("receive failed: {0}")]
    Io(#[source] std::io::Error),
}

impl From<TransportError> for AbortReason {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::SendFailed(io) => AbortReason::SendFailed(io.to_string()),
            TransportError::ReceiveTimeout => AbortReason::ReceiveTimeout,
            TransportError::ConnectionClosed => AbortReason::PeerDisconnected,
            other => AbortReason::Transport(other.to_string()),
        }
    }
}
