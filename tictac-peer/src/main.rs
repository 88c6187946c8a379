// tictac-peer: play one networked tic-tac-toe match from the terminal.

use clap::Parser;
use tictac_core::{Board, LocalMoveError, Mark, MatchOutcome};
use tictac_peer::config::{self, Config};
use tictac_peer::{connect_and_play, MoveSource, Role, TransportKind};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tictac-peer")]
#[command(about = "Peer-to-peer tic-tac-toe over TCP or UDP", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,
    /// acceptor waits and plays X; initiator connects and plays O.
    #[arg(long, value_enum)]
    role: Option<Role>,
    /// Bind address (acceptor) or peer address (initiator).
    #[arg(short, long)]
    address: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    #[arg(long)]
    handshake_timeout_secs: Option<u64>,
    #[arg(long)]
    receive_timeout_secs: Option<u64>,
}

impl Cli {
    fn apply(self, cfg: &mut Config) {
        if let Some(t) = self.transport {
            cfg.transport = t;
        }
        if let Some(r) = self.role {
            cfg.role = r;
        }
        if let Some(a) = self.address {
            cfg.address = a;
        }
        if let Some(p) = self.port {
            cfg.port = p;
        }
        if let Some(s) = self.handshake_timeout_secs {
            cfg.handshake_timeout_secs = s;
        }
        if let Some(s) = self.receive_timeout_secs {
            cfg.receive_timeout_secs = s;
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut cfg = config::load();
    cli.apply(&mut cfg);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = tokio::runtime::Runtime::new()?;
    let outcome = rt.block_on(async {
        let mut moves = TerminalMoves::new();
        tokio::select! {
            r = connect_and_play(&cfg, &mut moves) => r.map(Some).map_err(anyhow::Error::from),
            s = shutdown_signal() => s.map(|_| None).map_err(anyhow::Error::from),
        }
    });
    match outcome {
        Ok(Some(MatchOutcome::Aborted(reason))) => anyhow::bail!("match aborted: {reason}"),
        Ok(_) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Wait for Ctrl+C or SIGTERM (Unix). Dropping the match future releases the socket.
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}

/// Reads `row col` (1-based) from stdin and prints the board.
struct TerminalMoves {
    lines: Lines<BufReader<Stdin>>,
}

impl TerminalMoves {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

fn parse_coords(line: &str) -> Option<(usize, usize)> {
    let mut it = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty());
    let row: usize = it.next()?.parse().ok()?;
    let col: usize = it.next()?.parse().ok()?;
    if it.next().is_some() {
        return None;
    }
    Some((row.checked_sub(1)?, col.checked_sub(1)?))
}

#[async_trait::async_trait]
impl MoveSource for TerminalMoves {
    async fn next_move(&mut self, board: &Board, mark: Mark) -> Option<(usize, usize)> {
        loop {
            println!("{board}");
            println!("Your move ({mark}): row col (1-3), or q to quit");
            let line = self.lines.next_line().await.ok()??;
            let line = line.trim();
            if line.eq_ignore_ascii_case("q") {
                return None;
            }
            match parse_coords(line) {
                Some(rc) => return Some(rc),
                None => println!("Invalid input."),
            }
        }
    }

    fn rejected(&mut self, _row: usize, _col: usize, err: &LocalMoveError) {
        println!("{err}, try again.");
    }

    fn remote_moved(&mut self, _board: &Board, row: usize, col: usize) {
        println!("Opponent played {} {}", row + 1, col + 1);
    }

    fn finished(&mut self, board: &Board, outcome: &MatchOutcome) {
        println!("{board}");
        match outcome {
            MatchOutcome::LocalWin => println!("You won!"),
            MatchOutcome::RemoteWin => println!("You lost!"),
            MatchOutcome::Draw => println!("Draw!"),
            MatchOutcome::Aborted(reason) => println!("Match aborted: {reason}"),
        }
    }
}
