//! Match driver: runs one session over an endpoint.
//!
//! The driver task is the only owner of the session (board and turn). Blocking
//! receives run on a worker task that is asked for exactly one message at a time
//! and hands the result back over a channel, so the UDP receive timeout only runs
//! while the peer is actually expected to speak.

use tictac_core::{AbortReason, Board, LocalMoveError, Mark, MatchOutcome, MatchSession, Message, Phase};
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::Config;
use crate::connect::establish_connection;
use crate::error::{ConnectError, TransportError};
use crate::transport::{Endpoint, Transport};

/// Where local moves come from (terminal, GUI, script).
#[async_trait::async_trait]
pub trait MoveSource: Send {
    /// Next local move as zero-based (row, col), or `None` to leave the match.
    async fn next_move(&mut self, board: &Board, mark: Mark) -> Option<(usize, usize)>;

    /// The last move from `next_move` was refused; it will be asked again.
    fn rejected(&mut self, _row: usize, _col: usize, _err: &LocalMoveError) {}

    fn remote_moved(&mut self, _board: &Board, _row: usize, _col: usize) {}

    fn finished(&mut self, _board: &Board, _outcome: &MatchOutcome) {}
}

type Inbound = Result<Message, TransportError>;

/// Play one match to completion. The endpoint is closed exactly once before returning.
pub async fn run_match<S>(
    endpoint: Endpoint,
    local_mark: Mark,
    local_moves_first: bool,
    moves: &mut S,
) -> MatchOutcome
where
    S: MoveSource + ?Sized,
{
    let span = tracing::info_span!(
        "match",
        id = %uuid::Uuid::new_v4(),
        mark = %local_mark,
        transport = %endpoint.kind(),
        peer = ?endpoint.peer_addr(),
    );
    drive(endpoint, local_mark, local_moves_first, moves)
        .instrument(span)
        .await
}

/// Connect per `cfg`, then play. Marks and move order follow the role.
pub async fn connect_and_play<S>(cfg: &Config, moves: &mut S) -> Result<MatchOutcome, ConnectError>
where
    S: MoveSource + ?Sized,
{
    let endpoint = establish_connection(
        cfg.transport,
        cfg.role,
        &cfg.address,
        cfg.port,
        &cfg.timeouts(),
    )
    .await?;
    Ok(run_match(endpoint, cfg.role.mark(), cfg.role.moves_first(), moves).await)
}

async fn drive<S>(
    endpoint: Endpoint,
    local_mark: Mark,
    local_moves_first: bool,
    moves: &mut S,
) -> MatchOutcome
where
    S: MoveSource + ?Sized,
{
    let mut session = MatchSession::new(local_mark, local_moves_first);
    let (request_tx, request_rx) = mpsc::channel::<()>(1);
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<Inbound>(1);
    let worker = tokio::spawn(receive_worker(endpoint.clone(), request_rx, inbound_tx));

    session.on_connected();
    tracing::info!(first = local_moves_first, "match started");

    let outcome = loop {
        match session.phase().clone() {
            Phase::Finished(outcome) => break outcome,
            Phase::LocalTurn => local_turn(&mut session, endpoint.as_ref(), moves).await,
            Phase::RemoteTurn | Phase::AwaitingVerdict => {
                if request_tx.send(()).await.is_err() {
                    session.abort(AbortReason::Transport("receive worker stopped".into()));
                    continue;
                }
                match inbound_rx.recv().await {
                    Some(Ok(msg)) => {
                        let remote_move = match msg {
                            Message::Move { row, col } => Some((row as usize, col as usize)),
                            _ => None,
                        };
                        session.on_message_received(msg);
                        if let Some((row, col)) = remote_move {
                            if matches!(session.phase(), Phase::LocalTurn | Phase::AwaitingVerdict) {
                                moves.remote_moved(session.board(), row, col);
                            }
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "receive failed");
                        session.abort(e.into());
                    }
                    None => session.abort(AbortReason::Transport("receive worker stopped".into())),
                }
            }
            phase @ (Phase::AwaitingConnection | Phase::MoveInFlight) => {
                session.abort(AbortReason::Transport(format!("driver stalled in {phase:?}")));
            }
        }
    };

    endpoint.close().await;
    drop(request_tx);
    if let Err(e) = worker.await {
        tracing::debug!(error = %e, "receive worker did not finish cleanly");
    }
    let board = session.board();
    tracing::info!(
        %outcome,
        x = board.marks_placed(Mark::X),
        o = board.marks_placed(Mark::O),
        "match over"
    );
    moves.finished(session.board(), &outcome);
    outcome
}

async fn local_turn<S>(session: &mut MatchSession, endpoint: &dyn Transport, moves: &mut S)
where
    S: MoveSource + ?Sized,
{
    let Some((row, col)) = moves.next_move(session.board(), session.local_mark()).await else {
        session.abort(AbortReason::LocalQuit);
        return;
    };
    let mv = match session.on_local_move(row, col) {
        Ok(mv) => mv,
        Err(e) => {
            tracing::debug!(row, col, error = %e, "local move rejected");
            moves.rejected(row, col, &e);
            return;
        }
    };
    if let Err(e) = endpoint.send(&mv).await {
        session.on_send_failed(send_failure(e));
        return;
    }
    if let Some(announcement) = session.on_move_sent() {
        if let Err(e) = endpoint.send(&announcement).await {
            session.on_send_failed(send_failure(e));
        }
    }
}

fn send_failure(e: TransportError) -> String {
    match e {
        TransportError::SendFailed(io) => io.to_string(),
        other => other.to_string(),
    }
}

async fn receive_worker(
    endpoint: Endpoint,
    mut requests: mpsc::Receiver<()>,
    inbound: mpsc::Sender<Inbound>,
) {
    while requests.recv().await.is_some() {
        let received = endpoint.receive().await;
        if inbound.send(received).await.is_err() {
            break;
        }
    }
}
