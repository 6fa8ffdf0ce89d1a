use crate::packet::{endpoint_url, EnginePacket, SocketPacket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tovplay_core::SessionContext;
use tracing;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("cannot emit {0}: socket not connected")]
    NotConnected(String),
    #[error("no user id in session; cannot register realtime channel")]
    MissingUser,
    #[error("realtime channel task has stopped")]
    Closed,
    #[error(transparent)]
    Storage(#[from] tovplay_core::StorageError),
}

#[derive(Debug, Clone)]
pub struct ChannelOptions {
    pub url: String,
    pub user_id: String,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    /// `None` disables the `ping` keepalive.
    pub ping_interval: Option<Duration>,
}

impl ChannelOptions {
    pub fn from_session(session: &SessionContext) -> Result<Self, ChannelError> {
        let user_id = session.user_id()?.ok_or(ChannelError::MissingUser)?;
        let realtime = &session.config.realtime;

        Ok(Self {
            url: realtime.ws_url.clone(),
            user_id,
            reconnect_attempts: realtime.reconnect_attempts,
            reconnect_delay: realtime.reconnect_delay(),
            ping_interval: realtime.ping_interval(),
        })
    }
}

#[derive(Default)]
struct Handlers {
    next_id: u64,
    by_event: HashMap<String, Vec<(HandlerId, Handler)>>,
}

impl Handlers {
    fn matching(&self, event: &str) -> Vec<Handler> {
        self.by_event
            .get(event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

enum Command {
    Emit { event: String, payload: Option<Value> },
    Shutdown,
}

/// One live Socket.IO connection for the session's user. Registration,
/// heartbeat and reconnection happen on a background task; the handle only
/// exposes state, subscriptions and emits.
pub struct RealtimeChannel {
    state: watch::Receiver<ConnectionState>,
    commands: mpsc::UnboundedSender<Command>,
    handlers: Arc<Mutex<Handlers>>,
    task: JoinHandle<()>,
}

impl RealtimeChannel {
    pub fn connect(options: ChannelOptions) -> Self {
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let handlers = Arc::new(Mutex::new(Handlers::default()));

        let task = tokio::spawn(run(options, state_tx, command_rx, handlers.clone()));

        Self {
            state,
            commands,
            handlers,
            task,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut handlers = match self.handlers.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.next_id += 1;
        let id = HandlerId(handlers.next_id);
        handlers
            .by_event
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn off(&self, event: &str, id: HandlerId) -> bool {
        let mut handlers = match self.handlers.lock() {
            Ok(h) => h,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(list) = handlers.by_event.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    /// Refuses instead of queueing while disconnected.
    pub fn emit(&self, event: &str, payload: Option<Value>) -> Result<(), ChannelError> {
        if self.connection_state() != ConnectionState::Connected {
            tracing::warn!("Cannot emit {}: socket not connected", event);
            return Err(ChannelError::NotConnected(event.to_string()));
        }

        self.commands
            .send(Command::Emit {
                event: event.to_string(),
                payload,
            })
            .map_err(|_| ChannelError::Closed)
    }

    /// Announces `user_offline` when connected, then closes the socket and
    /// waits for the background task.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Err(e) = self.task.await {
            tracing::error!("Realtime channel task failed: {}", e);
        }
    }
}

enum SessionEnd {
    Shutdown,
    Dropped { was_connected: bool },
}

async fn run(
    options: ChannelOptions,
    state_tx: watch::Sender<ConnectionState>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    handlers: Arc<Mutex<Handlers>>,
) {
    let url = endpoint_url(&options.url);
    let mut failures = 0u32;

    loop {
        match session(&url, &options, &state_tx, &mut commands, &handlers).await {
            SessionEnd::Shutdown => break,
            SessionEnd::Dropped { was_connected } => {
                state_tx.send_replace(ConnectionState::Disconnected);
                if was_connected {
                    tracing::warn!("Realtime connection lost, reconnecting");
                    failures = 0;
                } else {
                    failures += 1;
                }

                if failures > options.reconnect_attempts {
                    tracing::error!(
                        "Realtime reconnection failed after {} attempts",
                        options.reconnect_attempts
                    );
                    break;
                }
                tracing::info!("Realtime reconnection attempt {}", failures.max(1));

                if wait_or_shutdown(options.reconnect_delay, &mut commands).await {
                    break;
                }
            }
        }
    }

    state_tx.send_replace(ConnectionState::Disconnected);
    tracing::info!("Realtime channel closed for user: {}", options.user_id);
}

/// Sleeps through the reconnect delay. Returns true if shutdown was
/// requested meanwhile.
async fn wait_or_shutdown(
    delay: Duration,
    commands: &mut mpsc::UnboundedReceiver<Command>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            cmd = commands.recv() => match cmd {
                Some(Command::Emit { event, .. }) => {
                    tracing::warn!("Dropping {} emitted while disconnected", event);
                }
                Some(Command::Shutdown) | None => return true,
            },
        }
    }
}

async fn session(
    url: &str,
    options: &ChannelOptions,
    state_tx: &watch::Sender<ConnectionState>,
    commands: &mut mpsc::UnboundedReceiver<Command>,
    handlers: &Arc<Mutex<Handlers>>,
) -> SessionEnd {
    let (ws, _) = match tokio_tungstenite::connect_async(url).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!("Socket connection error: {}", e);
            return SessionEnd::Dropped {
                was_connected: false,
            };
        }
    };

    let (mut sink, mut stream) = ws.split();
    let mut connected = false;
    let dropped = |connected: bool| SessionEnd::Dropped {
        was_connected: connected,
    };

    let mut keepalive = options
        .ping_interval
        .map(|period| interval_at(Instant::now() + period, period));

    // Armed by the open packet: the server must be heard from within
    // pingInterval + pingTimeout
    let mut silence_window: Option<Duration> = None;
    let silence = tokio::time::sleep(Duration::ZERO);
    tokio::pin!(silence);

    loop {
        tokio::select! {
            frame = stream.next() => {
                if let (Some(Ok(_)), Some(window)) = (&frame, silence_window) {
                    silence.as_mut().reset(Instant::now() + window);
                }
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            return dropped(connected);
                        }
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!("Socket disconnected by server");
                        return dropped(connected);
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        tracing::warn!("Socket read error: {}", e);
                        return dropped(connected);
                    }
                };

                let packet = match EnginePacket::decode(&text) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!("Ignoring malformed frame: {}", e);
                        continue;
                    }
                };

                let result = match packet {
                    EnginePacket::Open(open) => {
                        tracing::debug!("Engine.IO session {} opened", open.sid);
                        silence_window = open.silence_window();
                        if let Some(window) = silence_window {
                            silence.as_mut().reset(Instant::now() + window);
                        }
                        send_packet(&mut sink, SocketPacket::Connect(None)).await
                    }
                    EnginePacket::Ping(data) => {
                        send_raw(&mut sink, EnginePacket::Pong(data).encode()).await
                    }
                    EnginePacket::Close => return dropped(connected),
                    EnginePacket::Message(body) => {
                        match SocketPacket::decode(&body) {
                            Ok(addressed) if addressed.namespace != "/" => Ok(()),
                            Ok(addressed) => match addressed.packet {
                                SocketPacket::Connect(_) => {
                                    connected = true;
                                    state_tx.send_replace(ConnectionState::Connected);
                                    tracing::info!("Socket connected successfully");
                                    announce(&mut sink, &options.user_id).await
                                }
                                SocketPacket::Event { name, args } => {
                                    dispatch(handlers, &name, args.first());
                                    Ok(())
                                }
                                SocketPacket::Disconnect => return dropped(connected),
                                SocketPacket::ConnectError(reason) => {
                                    tracing::warn!("Socket connection refused: {}", reason);
                                    return dropped(connected);
                                }
                                SocketPacket::Ack { .. } => Ok(()),
                            },
                            Err(e) => {
                                tracing::warn!("Ignoring malformed socket packet: {}", e);
                                Ok(())
                            }
                        }
                    }
                    EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => Ok(()),
                };

                if let Err(e) = result {
                    tracing::warn!("Socket write failed: {}", e);
                    return dropped(connected);
                }
            }
            cmd = commands.recv() => match cmd {
                Some(Command::Emit { event, payload }) => {
                    if !connected {
                        tracing::warn!("Dropping {} emitted while disconnected", event);
                        continue;
                    }
                    if let Err(e) = send_packet(&mut sink, SocketPacket::event(&event, payload)).await {
                        tracing::warn!("Failed to emit {}: {}", event, e);
                        return dropped(connected);
                    }
                }
                Some(Command::Shutdown) | None => {
                    if connected {
                        let _ = send_packet(&mut sink, SocketPacket::event("user_offline", None)).await;
                        let _ = send_packet(&mut sink, SocketPacket::Disconnect).await;
                    }
                    let _ = sink.close().await;
                    return SessionEnd::Shutdown;
                }
            },
            _ = &mut silence, if silence_window.is_some() => {
                tracing::warn!("No traffic from server within heartbeat window, dropping connection");
                return dropped(connected);
            }
            _ = next_tick(&mut keepalive), if connected => {
                let payload = json!({ "timestamp": chrono::Utc::now().timestamp_millis() });
                if let Err(e) = send_packet(&mut sink, SocketPacket::event("ping", Some(payload))).await {
                    tracing::warn!("Keepalive ping failed: {}", e);
                    return dropped(connected);
                }
            }
        }
    }
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Register handshake, then presence.
async fn announce(sink: &mut WsSink, user_id: &str) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    send_packet(sink, SocketPacket::event("register", Some(json!({ "userId": user_id })))).await?;
    send_packet(sink, SocketPacket::event("user_online", None)).await
}

async fn send_packet(
    sink: &mut WsSink,
    packet: SocketPacket,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    send_raw(sink, packet.encode()).await
}

async fn send_raw(sink: &mut WsSink, frame: String) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    sink.send(Message::Text(frame)).await
}

fn dispatch(handlers: &Arc<Mutex<Handlers>>, event: &str, payload: Option<&Value>) {
    // Snapshot so handlers may call on/off
    let matching = match handlers.lock() {
        Ok(h) => h.matching(event),
        Err(poisoned) => poisoned.into_inner().matching(event),
    };

    if matching.is_empty() {
        tracing::debug!("No handlers for event {}", event);
        return;
    }

    let null = Value::Null;
    let payload = payload.unwrap_or(&null);
    for handler in matching {
        handler(payload);
    }
}
