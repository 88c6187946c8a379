//! Host-driven match session: the host passes events (local move, message received,
//! transport failure) and the session returns the messages to send. No I/O here.

use std::fmt;

use crate::board::{Board, Mark, PlaceError};
use crate::protocol::Message;

/// Where the match stands. Only `Finished` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    AwaitingConnection,
    /// Waiting for local input.
    LocalTurn,
    /// Local move applied; its `Move` has been handed to the host but not confirmed sent.
    MoveInFlight,
    /// Waiting for the peer's message.
    RemoteTurn,
    /// The peer's last move completed a line or filled the board; only its
    /// `GameOver`/`Draw` announcement may follow.
    AwaitingVerdict,
    Finished(MatchOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    LocalWin,
    RemoteWin,
    Draw,
    Aborted(AbortReason),
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchOutcome::LocalWin => write!(f, "you won"),
            MatchOutcome::RemoteWin => write!(f, "you lost"),
            MatchOutcome::Draw => write!(f, "draw"),
            MatchOutcome::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// Why a match ended without a game result.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbortReason {
    #[error("peer disconnected")]
    PeerDisconnected,
    #[error("timed out waiting for peer")]
    ReceiveTimeout,
    #[error("send failed: {0}")]
    SendFailed(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("local player quit")]
    LocalQuit,
}

/// Peer broke the message protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message {0:?}")]
    Malformed(String),
    #[error("unexpected {message:?} while {phase}")]
    OutOfSequence { phase: &'static str, message: String },
    #[error("illegal move from peer: {0}")]
    IllegalMove(#[source] PlaceError),
}

/// Local move refused; the host should ask again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LocalMoveError {
    #[error("not your turn")]
    NotYourTurn,
    #[error(transparent)]
    Place(#[from] PlaceError),
}

pub struct MatchSession {
    board: Board,
    local_mark: Mark,
    local_moves_first: bool,
    phase: Phase,
}

impl MatchSession {
    pub fn new(local_mark: Mark, local_moves_first: bool) -> Self {
        Self {
            board: Board::new(),
            local_mark,
            local_moves_first,
            phase: Phase::AwaitingConnection,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn local_mark(&self) -> Mark {
        self.local_mark
    }

    pub fn remote_mark(&self) -> Mark {
        self.local_mark.opponent()
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn outcome(&self) -> Option<&MatchOutcome> {
        match &self.phase {
            Phase::Finished(o) => Some(o),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome().is_some()
    }

    /// Connection is up: the first mover takes the local turn.
    pub fn on_connected(&mut self) {
        if self.phase != Phase::AwaitingConnection {
            return;
        }
        self.phase = if self.local_moves_first {
            Phase::LocalTurn
        } else {
            Phase::RemoteTurn
        };
        tracing::debug!(phase = ?self.phase, mark = %self.local_mark, "session started");
    }

    /// Apply a local move. Returns the `Move` to send; call `on_move_sent` or
    /// `on_send_failed` once the host knows how the send went.
    pub fn on_local_move(&mut self, row: usize, col: usize) -> Result<Message, LocalMoveError> {
        if self.phase != Phase::LocalTurn {
            return Err(LocalMoveError::NotYourTurn);
        }
        self.board.place(row, col, self.local_mark)?;
        self.phase = Phase::MoveInFlight;
        // place() only accepts 0..3, so both fit in u8.
        Ok(Message::Move {
            row: row as u8,
            col: col as u8,
        })
    }

    /// The local `Move` went out. Evaluates the board against the local mark and
    /// returns the announcement to send, if the match just ended.
    pub fn on_move_sent(&mut self) -> Option<Message> {
        if self.phase != Phase::MoveInFlight {
            return None;
        }
        if self.board.has_won(self.local_mark) {
            self.finish(MatchOutcome::LocalWin);
            Some(Message::GameOver(self.local_mark.symbol()))
        } else if self.board.is_full() {
            self.finish(MatchOutcome::Draw);
            Some(Message::Draw)
        } else {
            self.phase = Phase::RemoteTurn;
            None
        }
    }

    /// Sending failed. Aborts unless the result was already decided.
    pub fn on_send_failed(&mut self, reason: String) {
        if let Phase::Finished(outcome) = &self.phase {
            tracing::warn!(%reason, %outcome, "announcement not delivered; result stands");
            return;
        }
        self.finish(MatchOutcome::Aborted(AbortReason::SendFailed(reason)));
    }

    /// Handle one message from the peer.
    pub fn on_message_received(&mut self, msg: Message) {
        let phase_name = match &self.phase {
            Phase::Finished(_) => {
                tracing::debug!(?msg, "ignoring message after match end");
                return;
            }
            Phase::RemoteTurn | Phase::AwaitingVerdict => None,
            Phase::AwaitingConnection => Some("awaiting connection"),
            Phase::LocalTurn => Some("local turn"),
            Phase::MoveInFlight => Some("sending local move"),
        };
        if let Some(phase) = phase_name {
            self.protocol_violation(ProtocolError::OutOfSequence {
                phase,
                message: crate::wire::encode(&msg),
            });
            return;
        }
        match msg {
            Message::Move { row, col } => self.apply_remote_move(row, col),
            Message::GameOver(symbol) => {
                let outcome = if symbol == self.local_mark.symbol() {
                    MatchOutcome::LocalWin
                } else {
                    MatchOutcome::RemoteWin
                };
                self.finish(outcome);
            }
            Message::Draw => self.finish(MatchOutcome::Draw),
            Message::Malformed(raw) => self.protocol_violation(ProtocolError::Malformed(raw)),
        }
    }

    /// End the match for a reason outside the protocol (transport failure, local quit).
    pub fn abort(&mut self, reason: AbortReason) {
        if self.is_finished() {
            return;
        }
        self.finish(MatchOutcome::Aborted(reason));
    }

    fn apply_remote_move(&mut self, row: u8, col: u8) {
        if self.phase == Phase::AwaitingVerdict {
            self.protocol_violation(ProtocolError::OutOfSequence {
                phase: "awaiting verdict",
                message: crate::wire::encode(&Message::Move { row, col }),
            });
            return;
        }
        let remote = self.remote_mark();
        if let Err(e) = self.board.place(row as usize, col as usize, remote) {
            self.protocol_violation(ProtocolError::IllegalMove(e));
            return;
        }
        // The peer announces its own win or draw; wait for it instead of asking for input.
        self.phase = if self.board.has_won(remote) || self.board.is_full() {
            Phase::AwaitingVerdict
        } else {
            Phase::LocalTurn
        };
    }

    fn protocol_violation(&mut self, err: ProtocolError) {
        tracing::warn!(error = %err, "protocol violation");
        self.finish(MatchOutcome::Aborted(AbortReason::Protocol(err)));
    }

    fn finish(&mut self, outcome: MatchOutcome) {
        tracing::debug!(%outcome, "match finished");
        self.phase = Phase::Finished(outcome);
    }
}
