use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::messages::{EventSubMessage, Payload, TwitchEvent};
use crate::backend::error::Result;

const EVENTSUB_WS_URL: &str = "wss://eventsub.wss.twitch.tv/ws";

pub const CHAT_MESSAGE_TYPE: &str = "channel.chat.message";
pub const REDEMPTION_ADD_TYPE: &str = "channel.channel_points_custom_reward_redemption.add";
pub const CHEER_TYPE: &str = "channel.cheer";

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Messages from the WebSocket handler
#[derive(Debug, Clone)]
pub enum WebSocketMessage {
    Connected,
    Disconnected,
    /// New session id. `resumed` sessions keep their subscriptions.
    SessionId { id: String, resumed: bool },
    Event(TwitchEvent),
    Error(String),
}

/// Why a connected session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// Twitch asked us to move to `reconnect_url`
    Reconnect,
    /// Socket closed or failed
    Closed,
}

/// Shared state for WebSocket connection
#[derive(Clone)]
struct SharedState {
    last_message_time: Arc<RwLock<Instant>>,
    keepalive_timeout: Arc<RwLock<Duration>>,
    state: Arc<RwLock<ConnectionState>>,
}

/// WebSocket connection handler for Twitch EventSub
#[derive(Clone)]
pub struct WebSocketHandler {
    url: String,
    /// Set while following a `session_reconnect` URL
    resuming: bool,
    shared: SharedState,
}

impl Default for WebSocketHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl WebSocketHandler {
    pub fn new() -> Self {
        Self {
            url: EVENTSUB_WS_URL.to_string(),
            resuming: false,
            shared: SharedState {
                last_message_time: Arc::new(RwLock::new(Instant::now())),
                keepalive_timeout: Arc::new(RwLock::new(Duration::from_secs(10))),
                state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            },
        }
    }

    /// Connect and pump messages until the session ends
    pub async fn connect(&mut self, tx: &mpsc::Sender<WebSocketMessage>) -> Result<SessionEnd> {
        self.set_state(ConnectionState::Connecting).await;

        let (ws_stream, _) = match connect_async(self.url.as_str()).await {
            Ok(connection) => connection,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected).await;
                return Err(e.into());
            }
        };

        self.set_state(ConnectionState::Connected).await;
        *self.shared.last_message_time.write().await = Instant::now();
        let _ = tx.send(WebSocketMessage::Connected).await;

        let (mut write, mut read) = ws_stream.split();
        let mut end = SessionEnd::Closed;

        while let Some(message) = read.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    *self.shared.last_message_time.write().await = Instant::now();

                    match self.handle_message(&text, tx).await {
                        Ok(Some(session_end)) => {
                            end = session_end;
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            log::error!("Error handling message: {}", e);
                            let _ = tx.send(WebSocketMessage::Error(e.to_string())).await;
                        }
                    }
                }
                Ok(Message::Close(frame)) => {
                    let code: u16 = frame.as_ref().map(|f| f.code.into()).unwrap_or(1000);
                    let reason = frame
                        .as_ref()
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "Unknown".to_string());

                    if (4000..=4007).contains(&code) {
                        log::error!("Twitch close code {}: {}", code, reason);
                    } else {
                        log::warn!("WebSocket closed: code={}, reason={}", code, reason);
                    }
                    break;
                }
                Ok(Message::Ping(payload)) => {
                    if let Err(e) = write.send(Message::Pong(payload)).await {
                        log::error!("Failed to send pong: {}", e);
                        break;
                    }
                }
                Err(e) => {
                    log::error!("WebSocket error: {}", e);
                    let _ = tx.send(WebSocketMessage::Error(e.to_string())).await;
                    break;
                }
                _ => {}
            }
        }

        self.set_state(ConnectionState::Disconnected).await;
        let _ = tx.send(WebSocketMessage::Disconnected).await;
        Ok(end)
    }

    /// Keep a session alive, reconnecting with exponential backoff.
    /// Gives up after `max_retries` consecutive failed connects.
    pub async fn run(mut self, tx: mpsc::Sender<WebSocketMessage>, max_retries: u32) {
        let base_delay = Duration::from_secs(1);
        let mut failures: u32 = 0;

        loop {
            match self.connect(&tx).await {
                Ok(SessionEnd::Reconnect) => {
                    failures = 0;
                    continue;
                }
                Ok(SessionEnd::Closed) => {
                    failures = 0;
                    self.reset();
                }
                Err(e) => {
                    failures += 1;
                    log::error!("Connection attempt {} failed: {}", failures, e);
                    if failures >= max_retries {
                        let _ = tx
                            .send(WebSocketMessage::Error(
                                "Max reconnection attempts reached".to_string(),
                            ))
                            .await;
                        return;
                    }
                    self.reset();
                }
            }

            if tx.is_closed() {
                return;
            }
            let delay = base_delay * 2_u32.pow(failures.min(6));
            log::info!("Reconnecting in {:?}", delay);
            sleep(delay).await;
        }
    }

    /// Returns how the session should end, if this message ends it
    async fn handle_message(
        &mut self,
        text: &str,
        tx: &mpsc::Sender<WebSocketMessage>,
    ) -> Result<Option<SessionEnd>> {
        let message: EventSubMessage = serde_json::from_str(text)?;
        let message_type = message.metadata.message_type.as_str();

        log::debug!("Received message type: {}", message_type);

        match message.payload {
            Payload::Welcome(welcome) if message_type == "session_reconnect" => {
                if let Some(reconnect_url) = welcome.session.reconnect_url {
                    log::warn!("Server requested reconnect to: {}", reconnect_url);
                    self.set_state(ConnectionState::Reconnecting).await;
                    self.resume_at(reconnect_url);
                    return Ok(Some(SessionEnd::Reconnect));
                }
            }

            Payload::Welcome(welcome) => {
                if let Some(seconds) = welcome.session.keepalive_timeout_seconds {
                    *self.shared.keepalive_timeout.write().await = Duration::from_secs(seconds);
                }
                let _ = tx
                    .send(WebSocketMessage::SessionId {
                        id: welcome.session.id,
                        resumed: self.resuming,
                    })
                    .await;
                self.resuming = false;
            }

            Payload::Notification(notification) => {
                match parse_event(&notification.subscription.subscription_type, notification.event)? {
                    Some(event) => {
                        let _ = tx.send(WebSocketMessage::Event(event)).await;
                    }
                    None => log::warn!(
                        "Unhandled subscription type: {}",
                        notification.subscription.subscription_type
                    ),
                }
            }

            Payload::Revocation(revocation) => {
                log::error!(
                    "Subscription {} revoked: {}",
                    revocation.subscription.subscription_type,
                    revocation.subscription.status
                );
            }

            Payload::Keepalive(_) => {}
        }

        Ok(None)
    }

    pub async fn state(&self) -> ConnectionState {
        *self.shared.state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.shared.state.write().await = state;
    }

    /// Check if keepalive timeout has been exceeded
    pub async fn is_keepalive_timeout(&self) -> bool {
        let last_message_time = *self.shared.last_message_time.read().await;
        let keepalive_timeout = *self.shared.keepalive_timeout.read().await;
        last_message_time.elapsed() > keepalive_timeout + Duration::from_secs(5)
    }

    /// Follow a `session_reconnect` URL; the next welcome keeps subscriptions
    fn resume_at(&mut self, url: String) {
        self.url = url;
        self.resuming = true;
    }

    /// Start over with a fresh session on the default endpoint
    fn reset(&mut self) {
        self.url = EVENTSUB_WS_URL.to_string();
        self.resuming = false;
    }
}

/// Decode a notification event; `None` for types the bot does not handle
pub fn parse_event(subscription_type: &str, event: serde_json::Value) -> Result<Option<TwitchEvent>> {
    let event = match subscription_type {
        CHAT_MESSAGE_TYPE => TwitchEvent::ChatMessage(serde_json::from_value(event)?),
        REDEMPTION_ADD_TYPE => TwitchEvent::RedemptionAdd(serde_json::from_value(event)?),
        CHEER_TYPE => TwitchEvent::Cheer(serde_json::from_value(event)?),
        _ => return Ok(None),
    };
    Ok(Some(event))
}
