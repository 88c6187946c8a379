//! Peer-to-peer tic-tac-toe core.
//! Host-driven: no I/O; host passes events and sends the messages the session returns.

pub mod board;
pub mod protocol;
pub mod session;
pub mod wire;

pub use board::{Board, Cell, Mark, PlaceError};
pub use protocol::{Message, HANDSHAKE_ACK_TOKEN, HANDSHAKE_TOKEN};
pub use session::{AbortReason, LocalMoveError, MatchOutcome, MatchSession, Phase, ProtocolError};
pub use wire::{decode, decode_bytes, encode};
