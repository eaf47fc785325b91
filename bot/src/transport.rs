//! Transport peer: the datagram link to the game server
//!
//! A peer can be sent to from any task while a single task blocks in
//! `recv`. Closing the peer (from any task) wakes that receiver with
//! `TransportError::Closed`, and the first recorded `CloseReason` tells the
//! receiver why.

use crate::error::TransportError;
use bincode::{deserialize, serialize};
use log::{debug, error, warn};
use shared::{ToClient, ToServer};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Largest UDP payload we accept.
const MAX_DATAGRAM: usize = 65_507;

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Nothing was received within the idle timeout
    TimedOut,
    /// The establishment watchdog gave up on the handshake
    EstablishTimeout,
    /// A termination signal was received
    Shutdown,
    /// The session closed the link after a protocol or handshake failure
    Aborted(String),
    /// The server refused access
    Denied(String),
    /// The remote side went away
    RemoteClosed,
}

/// Narrow interface the session layer needs from a transport.
pub trait Peer: Send + Sync + 'static {
    /// Queues a command for delivery. Never blocks.
    fn send(&self, cmd: ToServer) -> Result<(), TransportError>;

    /// Waits for the next inbound command.
    fn recv(&self) -> impl Future<Output = Result<ToClient, TransportError>> + Send;

    /// Closes the connection. Only the first reason is kept.
    fn close(&self, reason: CloseReason);

    fn closed_reason(&self) -> Option<CloseReason>;
}

#[derive(Debug, Default)]
struct CloseState {
    token: CancellationToken,
    reason: Mutex<Option<CloseReason>>,
}

impl CloseState {
    fn close(&self, reason: CloseReason) {
        {
            let mut current = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
            if current.is_none() {
                debug!("Closing connection: {:?}", reason);
                *current = Some(reason);
            }
        }
        self.token.cancel();
    }

    fn reason(&self) -> Option<CloseReason> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// UDP peer with a bincode codec and receive idle timeout
pub struct UdpPeer {
    socket: Arc<UdpSocket>,
    buffer: tokio::sync::Mutex<Vec<u8>>,
    outbound: mpsc::UnboundedSender<ToServer>,
    state: Arc<CloseState>,
    idle_timeout: Duration,
}

impl UdpPeer {
    /// Resolves `server` (`host:port`) and opens a connected socket to it.
    pub async fn connect(server: &str, idle_timeout: Duration) -> Result<Arc<Self>, TransportError> {
        let server_addr = lookup_host(server)
            .await
            .map_err(|_| TransportError::Resolve(server.to_string()))?
            .next()
            .ok_or_else(|| TransportError::Resolve(server.to_string()))?;

        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            ([0u8; 4], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };

        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        socket.connect(server_addr).await?;
        debug!("Socket {} connected to {}", socket.local_addr()?, server_addr);

        let state = Arc::new(CloseState::default());
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        Self::spawn_sender(Arc::clone(&socket), Arc::clone(&state), outbound_rx);

        Ok(Arc::new(Self {
            socket,
            buffer: tokio::sync::Mutex::new(vec![0u8; MAX_DATAGRAM]),
            outbound,
            state,
            idle_timeout,
        }))
    }

    /// Spawns the task that drains the outgoing command queue
    fn spawn_sender(
        socket: Arc<UdpSocket>,
        state: Arc<CloseState>,
        mut outbound_rx: mpsc::UnboundedReceiver<ToServer>,
    ) {
        tokio::spawn(async move {
            loop {
                let cmd = tokio::select! {
                    biased;
                    _ = state.token.cancelled() => break,
                    cmd = outbound_rx.recv() => match cmd {
                        Some(cmd) => cmd,
                        None => break,
                    },
                };

                let data = match serialize(&cmd) {
                    Ok(data) => data,
                    Err(e) => {
                        error!("Failed to encode {}: {}", cmd.kind(), e);
                        continue;
                    }
                };

                if let Err(e) = socket.send(&data).await {
                    warn!("Failed to send {}: {}", cmd.kind(), e);
                }
            }
            debug!("Sender task stopped");
        });
    }
}

impl Peer for UdpPeer {
    fn send(&self, cmd: ToServer) -> Result<(), TransportError> {
        if self.state.is_closed() {
            return Err(TransportError::Closed);
        }
        self.outbound.send(cmd).map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Result<ToClient, TransportError> {
        let mut buffer = self.buffer.lock().await;

        tokio::select! {
            biased;
            _ = self.state.token.cancelled() => Err(TransportError::Closed),
            result = timeout(self.idle_timeout, self.socket.recv(&mut buffer)) => match result {
                Err(_) => {
                    self.state.close(CloseReason::TimedOut);
                    Err(TransportError::Closed)
                }
                Ok(Ok(len)) => Ok(deserialize::<ToClient>(&buffer[..len])?),
                Ok(Err(e)) => Err(TransportError::Io(e)),
            },
        }
    }

    fn close(&self, reason: CloseReason) {
        self.state.close(reason);
    }

    fn closed_reason(&self) -> Option<CloseReason> {
        self.state.reason()
    }
}

/// In-process peer backed by channels. The `RemoteEnd` plays the server.
pub struct MemoryPeer {
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<ToClient, TransportError>>>,
    outbound: mpsc::UnboundedSender<ToServer>,
    state: Arc<CloseState>,
}

pub struct RemoteEnd {
    inbound: mpsc::UnboundedSender<Result<ToClient, TransportError>>,
    outbound: mpsc::UnboundedReceiver<ToServer>,
    state: Arc<CloseState>,
}

impl MemoryPeer {
    pub fn pair() -> (Arc<MemoryPeer>, RemoteEnd) {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = Arc::new(CloseState::default());

        let peer = MemoryPeer {
            inbound: tokio::sync::Mutex::new(inbound_rx),
            outbound: outbound_tx,
            state: Arc::clone(&state),
        };
        let remote = RemoteEnd {
            inbound: inbound_tx,
            outbound: outbound_rx,
            state,
        };

        (Arc::new(peer), remote)
    }
}

impl Peer for MemoryPeer {
    fn send(&self, cmd: ToServer) -> Result<(), TransportError> {
        if self.state.is_closed() {
            return Err(TransportError::Closed);
        }
        self.outbound.send(cmd).map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Result<ToClient, TransportError> {
        let mut inbound = self.inbound.lock().await;

        tokio::select! {
            biased;
            _ = self.state.token.cancelled() => Err(TransportError::Closed),
            item = inbound.recv() => match item {
                Some(item) => item,
                None => {
                    self.state.close(CloseReason::RemoteClosed);
                    Err(TransportError::Closed)
                }
            },
        }
    }

    fn close(&self, reason: CloseReason) {
        self.state.close(reason);
    }

    fn closed_reason(&self) -> Option<CloseReason> {
        self.state.reason()
    }
}

impl RemoteEnd {
    /// Delivers a command to the client. Returns false once the client is gone.
    pub fn deliver(&self, cmd: ToClient) -> bool {
        self.inbound.send(Ok(cmd)).is_ok()
    }

    /// Delivers a datagram the client cannot decode.
    pub fn deliver_garbage(&self) -> bool {
        let err = Box::new(bincode::ErrorKind::Custom("malformed datagram".to_string()));
        self.inbound.send(Err(TransportError::Decode(err))).is_ok()
    }

    /// Simulates the transport's own idle timeout firing.
    pub fn time_out(&self) {
        self.state.close(CloseReason::TimedOut);
    }

    pub fn try_sent(&mut self) -> Option<ToServer> {
        self.outbound.try_recv().ok()
    }

    pub fn drain_sent(&mut self) -> Vec<ToServer> {
        let mut sent = Vec::new();
        while let Ok(cmd) = self.outbound.try_recv() {
            sent.push(cmd);
        }
        sent
    }

    /// Waits for the next command the client sends.
    pub async fn next_sent(&mut self) -> Option<ToServer> {
        self.outbound.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    pub fn closed_reason(&self) -> Option<CloseReason> {
        self.state.reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_memory_peer_round_trip() {
        let (peer, mut remote) = MemoryPeer::pair();

        assert_ok!(peer.send(ToServer::Respawn));
        assert_eq!(remote.try_sent(), Some(ToServer::Respawn));

        assert!(remote.deliver(ToClient::Breath { breath: 10 }));
        let cmd = peer.recv().await.unwrap();
        assert_eq!(cmd, ToClient::Breath { breath: 10 });
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_recv() {
        let (peer, _remote) = MemoryPeer::pair();

        let receiver = {
            let peer = Arc::clone(&peer);
            tokio::spawn(async move { peer.recv().await })
        };

        tokio::task::yield_now().await;
        peer.close(CloseReason::Shutdown);

        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(TransportError::Closed)));
        assert_eq!(peer.closed_reason(), Some(CloseReason::Shutdown));
    }

    #[tokio::test]
    async fn test_first_close_reason_wins() {
        let (peer, remote) = MemoryPeer::pair();

        remote.time_out();
        peer.close(CloseReason::Shutdown);

        assert_eq!(peer.closed_reason(), Some(CloseReason::TimedOut));
        assert!(matches!(peer.recv().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (peer, mut remote) = MemoryPeer::pair();
        peer.close(CloseReason::Aborted("test".to_string()));

        assert!(matches!(
            peer.send(ToServer::Respawn),
            Err(TransportError::Closed)
        ));
        assert_eq!(remote.try_sent(), None);
    }

    #[tokio::test]
    async fn test_dropped_remote_reports_remote_closed() {
        let (peer, remote) = MemoryPeer::pair();
        drop(remote);

        assert!(matches!(peer.recv().await, Err(TransportError::Closed)));
        assert_eq!(peer.closed_reason(), Some(CloseReason::RemoteClosed));
    }

    #[tokio::test]
    async fn test_garbage_surfaces_as_decode_error() {
        let (peer, remote) = MemoryPeer::pair();
        remote.deliver_garbage();

        assert!(matches!(peer.recv().await, Err(TransportError::Decode(_))));
        assert_eq!(peer.closed_reason(), None);
    }

    #[tokio::test]
    async fn test_udp_peer_exchanges_commands() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let peer = UdpPeer::connect(&server_addr.to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        peer.send(ToServer::init("bot")).unwrap();

        let mut buf = [0u8; 1024];
        let (len, client_addr) = server.recv_from(&mut buf).await.unwrap();
        let received: ToServer = deserialize(&buf[..len]).unwrap();
        assert_eq!(received, ToServer::init("bot"));

        let reply = serialize(&ToClient::TimeOfDay {
            time: 6000,
            speed: 72.0,
        })
        .unwrap();
        server.send_to(&reply, client_addr).await.unwrap();

        let cmd = peer.recv().await.unwrap();
        assert!(matches!(cmd, ToClient::TimeOfDay { time: 6000, .. }));
    }

    #[tokio::test]
    async fn test_udp_peer_reuses_receive_buffer() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let peer = UdpPeer::connect(&server_addr.to_string(), Duration::from_secs(5))
            .await
            .unwrap();
        peer.send(ToServer::Respawn).unwrap();

        let mut buf = [0u8; 1024];
        let (_, client_addr) = server.recv_from(&mut buf).await.unwrap();

        let long = ToClient::ChatMsg {
            sender: "alice".to_string(),
            text: "x".repeat(4000),
            timestamp: 1,
        };
        let short = ToClient::Breath { breath: 3 };
        for cmd in [&long, &short] {
            server
                .send_to(&serialize(cmd).unwrap(), client_addr)
                .await
                .unwrap();
        }

        assert_eq!(peer.recv().await.unwrap(), long);
        assert_eq!(peer.recv().await.unwrap(), short);
    }

    #[tokio::test]
    async fn test_udp_peer_idle_timeout() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let peer = UdpPeer::connect(&server_addr.to_string(), Duration::from_millis(50))
            .await
            .unwrap();

        assert!(matches!(peer.recv().await, Err(TransportError::Closed)));
        assert_eq!(peer.closed_reason(), Some(CloseReason::TimedOut));
    }

    #[tokio::test]
    async fn test_unresolvable_address() {
        let result = UdpPeer::connect("not an address", Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TransportError::Resolve(_))));
    }
}
