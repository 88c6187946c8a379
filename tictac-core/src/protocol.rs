//! Wire protocol: message kinds and fixed tokens.

/// Tag of a move message.
pub const MOVE_TAG: &str = "MOVE";
/// Tag of a game-over announcement.
pub const GAME_OVER_TAG: &str = "GAMEOVER";
/// Tag of a draw announcement.
pub const DRAW_TAG: &str = "DRAW";
/// Field separator.
pub const SEPARATOR: char = '|';

/// UDP initiator's first datagram. Transport-level, never decoded as a game message.
pub const HANDSHAKE_TOKEN: &str = "CONNECT_UDP";
/// UDP acceptor's reply to the handshake.
pub const HANDSHAKE_ACK_TOKEN: &str = "CONNECT_CONFIRMED";

/// All game messages. Encoding is pipe-delimited ASCII (see wire module).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Mover placed its mark at (row, col), zero-based.
    Move { row: u8, col: u8 },
    /// Sender detected a completed line for the given mark.
    GameOver(char),
    /// Sender filled the board with no line.
    Draw,
    /// Received text that matches none of the grammars. Kept verbatim for logging.
    Malformed(String),
}
