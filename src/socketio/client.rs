//! Socket.IO client over a websocket transport.
//!
//! The client runs as its own tokio task. Inbound traffic is surfaced as
//! [`ChannelEvent`]s; outbound traffic goes through a cloneable [`Emitter`].
//! Transport failures are retried with exponential backoff until the session
//! closes the channel or the server disconnects the namespace.

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::packet::{EnginePacket, Packet, PacketError, PacketKind};

const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid handshake: {0}")]
    Handshake(String),

    #[error("namespace {namespace} refused: {message}")]
    Refused { namespace: String, message: String },

    #[error("no engine.io handshake within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("no packet from server within {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("connection closed by server")]
    ConnectionClosed,

    #[error("channel is closed")]
    ChannelClosed,
}

/// What the session sees of the connection.
#[derive(Debug)]
pub enum ChannelEvent {
    Connect,
    ConnectError(String),
    Event {
        name: String,
        args: Vec<Value>,
        ack: Option<Ack>,
    },
    Closed {
        reason: String,
    },
}

/// Requests queued for the transport task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Packet(Packet),
    Close,
}

/// Cloneable handle for emitting events on the namespace.
#[derive(Debug, Clone)]
pub struct Emitter {
    namespace: String,
    sender: mpsc::UnboundedSender<Outbound>,
}

impl Emitter {
    /// Create an emitter whose queue is drained by the returned receiver.
    pub fn new(namespace: &str) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                namespace: namespace.to_string(),
                sender,
            },
            receiver,
        )
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn emit(&self, event: &str, args: Vec<Value>) -> Result<(), ChannelError> {
        self.sender
            .send(Outbound::Packet(Packet::event(&self.namespace, event, args)))
            .map_err(|_| ChannelError::ChannelClosed)
    }

    /// Ask the transport to disconnect the namespace and stop reconnecting.
    pub fn close(&self) -> Result<(), ChannelError> {
        self.sender
            .send(Outbound::Close)
            .map_err(|_| ChannelError::ChannelClosed)
    }

    pub(crate) fn ack(&self, id: u64) -> Ack {
        Ack {
            id,
            emitter: self.clone(),
        }
    }
}

/// One-shot acknowledgement for a server event that requested one.
///
/// `send` consumes the handle, so an ack can be delivered at most once.
#[derive(Debug)]
pub struct Ack {
    id: u64,
    emitter: Emitter,
}

impl Ack {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn send(self, args: Vec<Value>) -> Result<(), ChannelError> {
        self.emitter
            .sender
            .send(Outbound::Packet(Packet::ack(
                &self.emitter.namespace,
                self.id,
                args,
            )))
            .map_err(|_| ChannelError::ChannelClosed)
    }
}

#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Websocket endpoint, e.g. `ws://host:9204/socket.io/?EIO=4&transport=websocket`.
    pub url: Url,
    pub namespace: String,
    pub max_reconnect_delay: Duration,
    /// Bound on the websocket upgrade and on waiting for the open packet.
    pub connect_timeout: Duration,
}

/// Why a single connection ended without an error.
enum ConnectionEnd {
    ClosedByClient,
    ServerDisconnect,
    SessionGone,
}

pub struct SocketClient;

impl SocketClient {
    /// Spawn the transport task.
    pub fn spawn(
        options: ClientOptions,
    ) -> (
        Emitter,
        mpsc::UnboundedReceiver<ChannelEvent>,
        JoinHandle<()>,
    ) {
        let (emitter, outbound) = Emitter::new(&options.namespace);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let task_emitter = emitter.clone();
        let handle = tokio::spawn(async move {
            run_transport(options, task_emitter, outbound, events_tx).await;
        });
        (emitter, events_rx, handle)
    }
}

async fn run_transport(
    options: ClientOptions,
    emitter: Emitter,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ChannelEvent>,
) {
    let mut backoff = INITIAL_RECONNECT_DELAY;
    loop {
        let result = run_connection(&options, &emitter, &mut outbound, &events, &mut backoff).await;
        let reason = match result {
            Ok(ConnectionEnd::ClosedByClient) => "client closed the connection".to_string(),
            Ok(ConnectionEnd::ServerDisconnect) => "server disconnected".to_string(),
            Ok(ConnectionEnd::SessionGone) => return,
            Err(err) => {
                warn!("socket.io transport: {err}");
                if events.send(ChannelEvent::ConnectError(err.to_string())).is_err() {
                    return;
                }
                match wait_before_reconnect(backoff, &mut outbound).await {
                    Some(()) => {
                        backoff = next_backoff(backoff, options.max_reconnect_delay);
                        continue;
                    }
                    None => "client closed the connection".to_string(),
                }
            }
        };
        info!("socket.io channel closed: {reason}");
        let _ = events.send(ChannelEvent::Closed { reason });
        return;
    }
}

/// Sleep for `delay`, dropping emits queued while offline. `None` means the
/// client asked to close in the meantime.
async fn wait_before_reconnect(
    delay: Duration,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
) -> Option<()> {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return Some(()),
            out = outbound.recv() => match out {
                Some(Outbound::Packet(packet)) => {
                    debug!("dropping packet while offline: {}", packet.encode());
                }
                Some(Outbound::Close) | None => return None,
            },
        }
    }
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max.max(INITIAL_RECONNECT_DELAY))
}

async fn run_connection(
    options: &ClientOptions,
    emitter: &Emitter,
    outbound: &mut mpsc::UnboundedReceiver<Outbound>,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    backoff: &mut Duration,
) -> Result<ConnectionEnd, ChannelError> {
    debug!("connecting to {}", options.url);
    let timeout = options.connect_timeout;
    let (ws, _) = tokio::time::timeout(timeout, connect_async(options.url.as_str()))
        .await
        .map_err(|_| ChannelError::HandshakeTimeout(timeout))??;
    let (mut sink, mut stream) = ws.split();

    let first = tokio::time::timeout(timeout, stream.next())
        .await
        .map_err(|_| ChannelError::HandshakeTimeout(timeout))?;
    let handshake = match first {
        Some(Ok(Message::Text(text))) => match EnginePacket::decode(&text) {
            Ok(EnginePacket::Open(handshake)) => handshake,
            Ok(other) => {
                return Err(ChannelError::Handshake(format!(
                    "expected open packet, got {:?}",
                    other
                )))
            }
            Err(err) => return Err(ChannelError::Handshake(err.to_string())),
        },
        Some(Ok(other)) => {
            return Err(ChannelError::Handshake(format!(
                "expected text frame, got {:?}",
                other
            )))
        }
        Some(Err(err)) => return Err(err.into()),
        None => return Err(ChannelError::ConnectionClosed),
    };
    debug!(
        "engine.io session {} (ping interval {}ms, timeout {}ms)",
        handshake.sid, handshake.ping_interval, handshake.ping_timeout
    );

    sink.send(Message::Text(Packet::connect(&options.namespace).to_frame()))
        .await?;

    let heartbeat = Duration::from_millis(handshake.ping_interval + handshake.ping_timeout);
    let mut deadline = Instant::now() + heartbeat;

    loop {
        tokio::select! {
            frame = stream.next() => {
                deadline = Instant::now() + heartbeat;
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return Err(ChannelError::ConnectionClosed),
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(err.into()),
                };
                let packet = match EnginePacket::decode(&text) {
                    Ok(packet) => packet,
                    Err(err) => {
                        warn!("skipping undecodable frame: {err}");
                        continue;
                    }
                };
                match packet {
                    EnginePacket::Ping(data) => {
                        sink.send(Message::Text(EnginePacket::Pong(data).encode())).await?;
                    }
                    EnginePacket::Close => return Err(ChannelError::ConnectionClosed),
                    EnginePacket::Message(payload) => {
                        match handle_message(&payload, options, emitter, events, backoff) {
                            Ok(None) => {}
                            Ok(Some(end)) => return Ok(end),
                            Err(MessageError::Packet(err)) => {
                                warn!("skipping undecodable socket.io packet: {err}");
                            }
                            Err(MessageError::Channel(err)) => return Err(err),
                        }
                    }
                    _ => {}
                }
            }
            out = outbound.recv() => match out {
                Some(Outbound::Packet(packet)) => {
                    sink.send(Message::Text(packet.to_frame())).await?;
                }
                Some(Outbound::Close) | None => {
                    let _ = sink
                        .send(Message::Text(Packet::disconnect(&options.namespace).to_frame()))
                        .await;
                    let _ = sink.close().await;
                    return Ok(ConnectionEnd::ClosedByClient);
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                return Err(ChannelError::HeartbeatTimeout(heartbeat));
            }
        }
    }
}

enum MessageError {
    Packet(PacketError),
    Channel(ChannelError),
}

fn handle_message(
    payload: &str,
    options: &ClientOptions,
    emitter: &Emitter,
    events: &mpsc::UnboundedSender<ChannelEvent>,
    backoff: &mut Duration,
) -> Result<Option<ConnectionEnd>, MessageError> {
    let packet = Packet::decode(payload).map_err(MessageError::Packet)?;
    if packet.namespace != options.namespace {
        debug!("ignoring packet for namespace {}", packet.namespace);
        return Ok(None);
    }

    let event = match packet.kind {
        PacketKind::Connect => {
            *backoff = INITIAL_RECONNECT_DELAY;
            ChannelEvent::Connect
        }
        PacketKind::ConnectError => {
            return Err(MessageError::Channel(ChannelError::Refused {
                namespace: packet.namespace.clone(),
                message: packet.error_message(),
            }))
        }
        PacketKind::Disconnect => return Ok(Some(ConnectionEnd::ServerDisconnect)),
        PacketKind::Event => match packet.event_parts() {
            Some((name, args)) => ChannelEvent::Event {
                name,
                args,
                ack: packet.id.map(|id| emitter.ack(id)),
            },
            None => {
                warn!("skipping event without a name: {}", payload);
                return Ok(None);
            }
        },
        PacketKind::Ack => {
            debug!("unexpected ack {:?} from server", packet.id);
            return Ok(None);
        }
    };

    if events.send(event).is_err() {
        return Ok(Some(ConnectionEnd::SessionGone));
    }
    Ok(None)
}
