use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::{JoinHandle, JoinSet};

use super::frame::{read_frame, write_frame};
use crate::discovery::resolver::{TCP_SCHEME, parse_endpoint};
use crate::error::TransportError;

/// Capacity of the fan-in queue of a receiving endpoint.
const INBOX_CAPACITY: usize = 1024;

/// Which way messages flow through an endpoint, from the local role's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Send => "send",
            Direction::Receive => "receive",
        }
    }
}

/// Connected peers of a sending endpoint.
struct PushPeers {
    streams: Mutex<Vec<(SocketAddr, TcpStream)>>,
    ready: Notify,
}

enum AcceptSink {
    Push(Arc<PushPeers>),
    Pull(mpsc::Sender<Vec<u8>>),
}

/// A listening endpoint on an ephemeral port.
///
/// A `Send` endpoint hands each message to one connected peer, round-robin,
/// and waits for a first peer if none is connected. A `Receive` endpoint merges
/// the frames of every connected peer into one queue.
///
/// Dropping the endpoint stops accepting and closes every accepted connection.
pub struct BoundEndpoint {
    local_addr: SocketAddr,
    direction: Direction,
    peers: Option<Arc<PushPeers>>,
    inbox: Option<mpsc::Receiver<Vec<u8>>>,
    next_peer: usize,
    accept_task: JoinHandle<()>,
}

impl BoundEndpoint {
    /// Listens on `ip` with a port chosen by the operating system.
    pub async fn bind(ip: IpAddr, direction: Direction) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(SocketAddr::new(ip, 0))
            .await
            .map_err(TransportError::Bind)?;
        let local_addr = listener.local_addr().map_err(TransportError::Bind)?;

        let (peers, inbox, sink) = match direction {
            Direction::Send => {
                let peers = Arc::new(PushPeers {
                    streams: Mutex::new(Vec::new()),
                    ready: Notify::new(),
                });
                (Some(peers.clone()), None, AcceptSink::Push(peers))
            }
            Direction::Receive => {
                let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
                (None, Some(rx), AcceptSink::Pull(tx))
            }
        };

        let accept_task = tokio::spawn(accept_loop(listener, sink));
        tracing::debug!("Bound {} endpoint on {}", direction.as_str(), local_addr);

        Ok(Self {
            local_addr,
            direction,
            peers,
            inbox,
            next_peer: 0,
            accept_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let Some(peers) = self.peers.clone() else {
            return Err(TransportError::WrongDirection(self.direction.as_str()));
        };

        loop {
            let mut streams = peers.streams.lock().await;
            if streams.is_empty() {
                drop(streams);
                peers.ready.notified().await;
                continue;
            }

            let idx = self.next_peer % streams.len();
            self.next_peer = self.next_peer.wrapping_add(1);

            let (addr, stream) = &mut streams[idx];
            match write_frame(stream, payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Dropping peer {} after failed send: {}", addr, e);
                    streams.remove(idx);
                }
            }
        }
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        let direction = self.direction;
        let Some(inbox) = self.inbox.as_mut() else {
            return Err(TransportError::WrongDirection(direction.as_str()));
        };
        inbox.recv().await.ok_or(TransportError::Closed)
    }

    /// Number of peers a `Send` endpoint can currently deliver to.
    pub async fn peer_count(&self) -> usize {
        match &self.peers {
            Some(peers) => peers.streams.lock().await.len(),
            None => 0,
        }
    }
}

impl Drop for BoundEndpoint {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(listener: TcpListener, sink: AcceptSink) {
    let mut readers = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::debug!("Accepted connection from {}", addr);
                    stream.set_nodelay(true).ok();

                    match &sink {
                        AcceptSink::Push(peers) => {
                            peers.streams.lock().await.push((addr, stream));
                            peers.ready.notify_one();
                        }
                        AcceptSink::Pull(tx) => {
                            readers.spawn(pull_from(stream, addr, tx.clone()));
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(_) = readers.join_next(), if !readers.is_empty() => {}
        }
    }
}

async fn pull_from(mut stream: TcpStream, addr: SocketAddr, tx: mpsc::Sender<Vec<u8>>) {
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(frame)) => {
                if tx.send(frame).await.is_err() {
                    return;
                }
            }
            Ok(None) => {
                tracing::debug!("Peer {} disconnected", addr);
                return;
            }
            Err(e) => {
                tracing::warn!("Dropping connection from {}: {}", addr, e);
                return;
            }
        }
    }
}

/// An outgoing connection to a peer's bound endpoint.
pub struct ConnectedEndpoint {
    endpoint: String,
    direction: Direction,
    stream: TcpStream,
}

impl ConnectedEndpoint {
    /// Connects to `tcp://host:port`, giving up after `timeout`.
    pub async fn connect(
        endpoint: &str,
        direction: Direction,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let (scheme, host, port) = parse_endpoint(endpoint)
            .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;
        if scheme != TCP_SCHEME {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
        }

        let connect_err = |reason: String| TransportError::Connect {
            endpoint: endpoint.to_string(),
            reason,
        };

        let stream = tokio::time::timeout(timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| connect_err(format!("timed out after {:?}", timeout)))?
            .map_err(|e| connect_err(e.to_string()))?;
        stream.set_nodelay(true).ok();

        tracing::debug!("Connected to {} ({})", endpoint, direction.as_str());

        Ok(Self {
            endpoint: endpoint.to_string(),
            direction,
            stream,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if self.direction != Direction::Send {
            return Err(TransportError::WrongDirection(self.direction.as_str()));
        }
        write_frame(&mut self.stream, payload).await
    }

    pub async fn receive(&mut self) -> Result<Vec<u8>, TransportError> {
        if self.direction != Direction::Receive {
            return Err(TransportError::WrongDirection(self.direction.as_str()));
        }
        read_frame(&mut self.stream)
            .await?
            .ok_or(TransportError::Closed)
    }
}
