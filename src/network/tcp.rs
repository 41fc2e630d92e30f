use std::net::SocketAddr;

use futures::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;

use super::{Direction, NodeEvent, PeerId, Transport};
use crate::error::Result;
use crate::protocol::Message;

/// Longest frame accepted from a peer, in bytes. Whole-chain replies must fit.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Newline-delimited JSON frames over plain TCP.
pub struct TcpTransport {
    local_addr: SocketAddr,
    events: mpsc::UnboundedSender<NodeEvent>,
    shutdown: CancellationToken,
    max_frame_length: usize,
}

impl TcpTransport {
    /// Bind the gossip listener and start accepting peers.
    pub async fn bind(addr: &str, events: mpsc::UnboundedSender<NodeEvent>) -> Result<Self> {
        Self::bind_with_limit(addr, events, DEFAULT_MAX_FRAME_LENGTH).await
    }

    /// Like [`TcpTransport::bind`]; peers sending a longer line are disconnected.
    pub async fn bind_with_limit(
        addr: &str,
        events: mpsc::UnboundedSender<NodeEvent>,
        max_frame_length: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        info!("Listening P2P on {local_addr}");

        tokio::spawn(accept_loop(
            listener,
            events.clone(),
            shutdown.clone(),
            max_frame_length,
        ));

        Ok(Self {
            local_addr,
            events,
            shutdown,
            max_frame_length,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl Transport for TcpTransport {
    fn connect(&self, address: &str) {
        let events = self.events.clone();
        let address = address.to_string();
        let max_frame_length = self.max_frame_length;
        tokio::spawn(async move {
            match TcpStream::connect(&address).await {
                Ok(stream) => {
                    spawn_connection(stream, address, Direction::Outbound, events, max_frame_length)
                }
                Err(e) => warn!("Connection failed {address}: {e}"),
            }
        });
    }

    fn close_listener(&self) {
        self.shutdown.cancel();
    }

    fn is_listening(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}

async fn accept_loop(
    listener: TcpListener,
    events: mpsc::UnboundedSender<NodeEvent>,
    shutdown: CancellationToken,
    max_frame_length: usize,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("P2P listener on {:?} closed", listener.local_addr().ok());
                return;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    spawn_connection(
                        stream,
                        remote.to_string(),
                        Direction::Inbound,
                        events.clone(),
                        max_frame_length,
                    );
                }
                Err(e) => warn!("accept failed: {e}"),
            }
        }
    }
}

fn spawn_connection(
    stream: TcpStream,
    address: String,
    direction: Direction,
    events: mpsc::UnboundedSender<NodeEvent>,
    max_frame_length: usize,
) {
    let peer = PeerId::new();
    let (reader, writer) = stream.into_split();
    let (outbox, inbox) = mpsc::unbounded_channel();

    let connected = NodeEvent::PeerConnected {
        peer,
        address,
        outbox,
        direction,
    };
    if events.send(connected).is_err() {
        debug!("{peer}: node is gone, dropping connection");
        return;
    }

    tokio::spawn(write_loop(peer, writer, inbox));
    let frames = FramedRead::new(reader, LinesCodec::new_with_max_length(max_frame_length));
    tokio::spawn(read_loop(peer, frames, events));
}

async fn read_loop(
    peer: PeerId,
    mut frames: FramedRead<OwnedReadHalf, LinesCodec>,
    events: mpsc::UnboundedSender<NodeEvent>,
) {
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(line) if line.trim().is_empty() => continue,
            Ok(line) => match Message::decode(&line) {
                Ok(message) => {
                    if events.send(NodeEvent::PeerMessage { peer, message }).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("{peer}: dropping malformed frame: {e}"),
            },
            Err(e) => {
                warn!("{peer}: read failed: {e}");
                break;
            }
        }
    }
    let _ = events.send(NodeEvent::PeerDisconnected { peer });
}

/// Drains the peer's outbox until the node drops it or the socket fails.
async fn write_loop(
    peer: PeerId,
    mut writer: OwnedWriteHalf,
    mut inbox: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = inbox.recv().await {
        let mut frame = match message.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{peer}: cannot encode {}: {e}", message.kind());
                continue;
            }
        };
        frame.push('\n');
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            warn!("{peer}: write failed: {e}");
            break;
        }
    }
    let _ = writer.shutdown().await;
}
