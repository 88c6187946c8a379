//! Send/receive over an established endpoint. One trait, two implementations:
//! TCP (implicit peer, byte stream) and UDP (explicit peer, one datagram per message).

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tictac_core::{wire, Message};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;

use crate::error::TransportError;
use crate::TransportKind;

/// Read buffer size for both transports.
pub const RECV_BUFFER: usize = 1024;

/// Terminator appended to each message on the stream transport.
const FRAME_END: u8 = b'\n';

/// Shared handle to an open endpoint.
pub type Endpoint = Arc<dyn Transport>;

/// Capability interface the match driver depends on.
///
/// All methods take `&self` so a receive can block on one task while the owning
/// task sends or closes.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Explicit peer address (UDP only; TCP's peer is implied by the connection).
    fn peer_addr(&self) -> Option<SocketAddr>;

    async fn send(&self, msg: &Message) -> Result<(), TransportError>;

    /// Block until one message arrives. Undecodable input comes back as
    /// `Message::Malformed`, not as an error.
    async fn receive(&self) -> Result<Message, TransportError>;

    /// Idempotent, never fails. Wakes a blocked `receive` with `TransportError::Closed`.
    async fn close(&self);
}

struct StreamReader {
    half: Option<OwnedReadHalf>,
    pending: VecDeque<Vec<u8>>,
}

impl StreamReader {
    /// Split one read into messages. `\n` separates coalesced frames; an unterminated
    /// tail is a whole message, so a read never leaves bytes waiting for more input.
    fn feed(&mut self, bytes: &[u8]) {
        for frame in bytes.split(|&b| b == FRAME_END) {
            if !frame.iter().all(u8::is_ascii_whitespace) {
                self.pending.push_back(frame.to_vec());
            }
        }
    }
}

/// TCP endpoint.
pub struct StreamEndpoint {
    reader: Mutex<StreamReader>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
}

impl StreamEndpoint {
    pub fn new(stream: TcpStream) -> Self {
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "cannot set TCP_NODELAY");
        }
        let (r, w) = stream.into_split();
        Self {
            reader: Mutex::new(StreamReader {
                half: Some(r),
                pending: VecDeque::new(),
            }),
            writer: Mutex::new(Some(w)),
            closed: watch::channel(false).0,
        }
    }
}

#[async_trait::async_trait]
impl Transport for StreamEndpoint {
    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn send(&self, msg: &Message) -> Result<(), TransportError> {
        let mut frame = wire::encode(msg).into_bytes();
        frame.push(FRAME_END);
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::Closed)?;
        writer
            .write_all(&frame)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)?;
        tracing::debug!(?msg, "sent");
        Ok(())
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        let mut closed = self.closed.subscribe();
        let mut reader = self.reader.lock().await;
        loop {
            if *closed.borrow() {
                return Err(TransportError::Closed);
            }
            if let Some(frame) = reader.pending.pop_front() {
                let msg = wire::decode_bytes(&frame);
                tracing::debug!(?msg, "received");
                return Ok(msg);
            }
            let half = reader.half.as_mut().ok_or(TransportError::Closed)?;
            let mut buf = [0u8; RECV_BUFFER];
            let n = tokio::select! {
                r = half.read(&mut buf) => r.map_err(TransportError::Io)?,
                _ = closed.wait_for(|c| *c) => return Err(TransportError::Closed),
            };
            if n == 0 {
                return Err(TransportError::ConnectionClosed);
            }
            reader.feed(&buf[..n]);
        }
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        if let Some(mut w) = self.writer.lock().await.take() {
            let _ = w.shutdown().await;
        }
        // A receive in progress holds the reader; it drops its half when the endpoint goes.
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.half = None;
        }
    }
}

/// UDP endpoint bound to one peer address learned during the handshake.
pub struct DatagramEndpoint {
    /// Taken on close; an in-flight receive holds its own handle until it wakes.
    socket: std::sync::Mutex<Option<Arc<UdpSocket>>>,
    peer: SocketAddr,
    receive_timeout: Duration,
    closed: watch::Sender<bool>,
}

impl DatagramEndpoint {
    pub fn new(socket: UdpSocket, peer: SocketAddr, receive_timeout: Duration) -> Self {
        Self {
            socket: std::sync::Mutex::new(Some(Arc::new(socket))),
            peer,
            receive_timeout,
            closed: watch::channel(false).0,
        }
    }

    fn socket(&self) -> Result<Arc<UdpSocket>, TransportError> {
        self.socket
            .lock()
            .ok()
            .and_then(|s| s.clone())
            .ok_or(TransportError::Closed)
    }
}

#[async_trait::async_trait]
impl Transport for DatagramEndpoint {
    fn kind(&self) -> TransportKind {
        TransportKind::Udp
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer)
    }

    async fn send(&self, msg: &Message) -> Result<(), TransportError> {
        let socket = self.socket()?;
        socket
            .send_to(wire::encode(msg).as_bytes(), self.peer)
            .await
            .map_err(TransportError::SendFailed)?;
        tracing::debug!(?msg, peer = %self.peer, "sent");
        Ok(())
    }

    async fn receive(&self) -> Result<Message, TransportError> {
        let mut closed = self.closed.subscribe();
        let socket = self.socket()?;
        let deadline = Instant::now() + self.receive_timeout;
        let mut buf = [0u8; RECV_BUFFER];
        loop {
            let received = tokio::select! {
                r = tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)) => r,
                _ = closed.wait_for(|c| *c) => return Err(TransportError::Closed),
            };
            let (n, from) = match received {
                Err(_) => return Err(TransportError::ReceiveTimeout),
                Ok(Err(e)) => return Err(datagram_error(e)),
                Ok(Ok(v)) => v,
            };
            if from != self.peer {
                tracing::warn!(%from, peer = %self.peer, "dropping datagram from stranger");
                continue;
            }
            let msg = wire::decode_bytes(&buf[..n]);
            tracing::debug!(?msg, "received");
            return Ok(msg);
        }
    }

    async fn close(&self) {
        self.closed.send_replace(true);
        if let Ok(mut socket) = self.socket.lock() {
            socket.take();
        }
    }
}

// Port-unreachable surfaces as a reset/refused error on some platforms: the peer is gone.
fn datagram_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionRefused => {
            TransportError::ConnectionClosed
        }
        _ => TransportError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn reader() -> StreamReader {
        StreamReader {
            half: None,
            pending: VecDeque::new(),
        }
    }

    fn drain(r: &mut StreamReader) -> Vec<Message> {
        r.pending.drain(..).map(|f| wire::decode_bytes(&f)).collect()
    }

    #[test]
    fn splits_coalesced_frames() {
        let mut r = reader();
        r.feed(b"MOVE|0|2\nGAMEOVER|X\n");
        assert_eq!(
            drain(&mut r),
            vec![Message::Move { row: 0, col: 2 }, Message::GameOver('X')]
        );
    }

    #[test]
    fn unterminated_malformed_tail_is_delivered() {
        let mut r = reader();
        r.feed(b"MOVE|1");
        assert_eq!(drain(&mut r), vec![Message::Malformed("MOVE|1".into())]);
        r.feed(b"DRAW\nMOVE|1");
        assert_eq!(
            drain(&mut r),
            vec![Message::Draw, Message::Malformed("MOVE|1".into())]
        );
    }

    #[test]
    fn unterminated_message_is_accepted() {
        let mut r = reader();
        r.feed(b"DRAW");
        assert_eq!(drain(&mut r), vec![Message::Draw]);
    }

    #[test]
    fn garbage_read_is_one_malformed_message() {
        let mut r = reader();
        r.feed(&[b'z'; RECV_BUFFER]);
        assert!(matches!(drain(&mut r).as_slice(), [Message::Malformed(_)]));
    }

    async fn tcp_pair() -> (StreamEndpoint, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (StreamEndpoint::new(server), client)
    }

    #[tokio::test]
    async fn stream_peer_close_is_connection_closed() {
        let (ep, client) = tcp_pair().await;
        drop(client);
        assert!(matches!(
            ep.receive().await,
            Err(TransportError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn stream_close_wakes_blocked_receive() {
        let (ep, _client) = tcp_pair().await;
        let ep: Endpoint = Arc::new(ep);
        let rx = ep.clone();
        let pending = tokio::spawn(async move { rx.receive().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        ep.close().await;
        ep.close().await;
        let r = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(r, Err(TransportError::Closed)));
        assert!(matches!(
            ep.send(&Message::Draw).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn stream_sends_terminated_text() {
        let (ep, mut client) = tcp_pair().await;
        ep.send(&Message::Move { row: 2, col: 0 }).await.unwrap();
        let mut buf = [0u8; 32];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"MOVE|2|0\n");
    }

    #[tokio::test]
    async fn datagram_times_out() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ep = DatagramEndpoint::new(
            socket,
            peer.local_addr().unwrap(),
            Duration::from_millis(100),
        );
        assert!(matches!(
            ep.receive().await,
            Err(TransportError::ReceiveTimeout)
        ));
    }

    #[tokio::test]
    async fn datagram_close_wakes_blocked_receive() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ep: Endpoint = Arc::new(DatagramEndpoint::new(
            socket,
            peer.local_addr().unwrap(),
            Duration::from_secs(30),
        ));
        let rx = ep.clone();
        let pending = tokio::spawn(async move { rx.receive().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        ep.close().await;
        ep.close().await;
        let r = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(r, Err(TransportError::Closed)));
        assert!(matches!(
            ep.send(&Message::Draw).await,
            Err(TransportError::Closed)
        ));
        assert!(matches!(ep.receive().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn datagram_ignores_strangers() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local = socket.local_addr().unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ep = DatagramEndpoint::new(socket, peer.local_addr().unwrap(), Duration::from_secs(5));
        assert_eq!(ep.peer_addr(), Some(peer.local_addr().unwrap()));
        stranger.send_to(b"DRAW", local).await.unwrap();
        peer.send_to(b"MOVE|1|1", local).await.unwrap();
        assert_eq!(ep.receive().await.unwrap(), Message::Move { row: 1, col: 1 });
    }

    #[tokio::test]
    async fn datagram_malformed_bytes() {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let local = socket.local_addr().unwrap();
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let ep = DatagramEndpoint::new(socket, peer.local_addr().unwrap(), Duration::from_secs(5));
        peer.send_to(&[0xff, 0xfe], local).await.unwrap();
        assert!(matches!(ep.receive().await, Ok(Message::Malformed(_))));
    }
}
