//! Peer-to-peer tic-tac-toe over TCP or UDP: socket setup, connection roles,
//! send/receive primitives and the match driver around `tictac_core`.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use tictac_core::Mark;

pub mod config;
pub mod connect;
pub mod driver;
pub mod error;
pub mod factory;
pub mod transport;

pub use connect::establish_connection;
pub use driver::{connect_and_play, run_match, MoveSource};
pub use error::{ConnectError, TransportError};
pub use transport::{DatagramEndpoint, Endpoint, StreamEndpoint, Transport};

/// Default UDP handshake wait.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default UDP receive wait during a match.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Reliable byte stream.
    Tcp,
    /// Connectionless datagrams.
    Udp,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "tcp"),
            TransportKind::Udp => write!(f, "udp"),
        }
    }
}

impl std::str::FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(TransportKind::Tcp),
            "udp" => Ok(TransportKind::Udp),
            other => Err(format!("unknown transport {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Binds and waits; plays X and moves first.
    Acceptor,
    /// Reaches out to a known address; plays O.
    Initiator,
}

impl Role {
    pub fn mark(self) -> Mark {
        match self {
            Role::Acceptor => Mark::X,
            Role::Initiator => Mark::O,
        }
    }

    pub fn moves_first(self) -> bool {
        self == Role::Acceptor
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acceptor" | "host" => Ok(Role::Acceptor),
            "initiator" | "client" => Ok(Role::Initiator),
            other => Err(format!("unknown role {other:?}")),
        }
    }
}

/// Waits applied on the UDP transport. TCP blocks without a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub handshake: Duration,
    pub receive: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake: DEFAULT_HANDSHAKE_TIMEOUT,
            receive: DEFAULT_RECEIVE_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acceptor_plays_x_first() {
        assert_eq!(Role::Acceptor.mark(), Mark::X);
        assert!(Role::Acceptor.moves_first());
        assert_eq!(Role::Initiator.mark(), Mark::O);
        assert!(!Role::Initiator.moves_first());
    }

    #[test]
    fn parse_names() {
        assert_eq!("UDP".parse::<TransportKind>(), Ok(TransportKind::Udp));
        assert_eq!("host".parse::<Role>(), Ok(Role::Acceptor));
        assert!("sctp".parse::<TransportKind>().is_err());
    }
}
