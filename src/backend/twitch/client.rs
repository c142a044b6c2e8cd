use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::api::TwitchApi;
use super::channel::TwitchChannel;
use super::eventsub::EventSubManager;
use super::messages::TwitchEvent;
use super::websocket::{WebSocketHandler, WebSocketMessage};
use crate::backend::error::{BotError, Result};

const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Public events from the Twitch client
#[derive(Debug, Clone)]
pub enum TwitchClientEvent {
    /// Subscriptions are live
    Connected,

    /// Disconnected from Twitch, a reconnect is in progress
    Disconnected,

    /// Notification received
    ChatEvent(TwitchEvent),

    /// Warning occurred (non-fatal)
    Warning(String),

    /// Error occurred
    Error(String),
}

/// Owns the EventSub connection of one channel
pub struct TwitchClient {
    channel_login: String,
    api: Arc<TwitchApi>,
    eventsub: Arc<EventSubManager>,
    ws_task: Option<JoinHandle<()>>,
}

impl TwitchClient {
    pub fn new(api: Arc<TwitchApi>, channel_login: String) -> Self {
        let eventsub = Arc::new(EventSubManager::new(api.clone()));
        Self {
            channel_login,
            api,
            eventsub,
            ws_task: None,
        }
    }

    /// Connect to Twitch and start receiving events.
    ///
    /// Returns the channel handle used to talk back once the first
    /// session is subscribed.
    pub async fn connect(&mut self, event_tx: mpsc::Sender<TwitchClientEvent>) -> Result<TwitchChannel> {
        let broadcaster = self.api.get_user_by_login(&self.channel_login).await?;
        let bot_user = self.api.get_current_user().await?;
        log::info!(
            "Joining #{} ({}) as {}",
            broadcaster.login,
            broadcaster.id,
            bot_user.login
        );

        let handler = WebSocketHandler::new();
        let keepalive_handler = handler.clone();
        let (ws_tx, mut ws_rx) = mpsc::channel::<WebSocketMessage>(100);
        self.ws_task = Some(tokio::spawn(handler.run(ws_tx, MAX_RECONNECT_ATTEMPTS)));

        // Wait for the first session
        let session_id = loop {
            match ws_rx.recv().await {
                Some(WebSocketMessage::SessionId { id, .. }) => break id,
                Some(WebSocketMessage::Error(e)) => return Err(BotError::WebSocketError(e)),
                None => {
                    return Err(BotError::WebSocketError(
                        "WebSocket channel closed".to_string(),
                    ))
                }
                _ => {}
            }
        };

        log::info!("Setting up EventSub subscriptions...");
        subscribe(
            &self.eventsub,
            &session_id,
            &broadcaster.id,
            &bot_user.id,
            &event_tx,
        )
        .await?;

        log::info!("EventSub setup complete - bot is ready");
        let _ = event_tx.send(TwitchClientEvent::Connected).await;

        let eventsub = self.eventsub.clone();
        let broadcaster_id = broadcaster.id.clone();
        let bot_user_id = bot_user.id.clone();
        let forward_tx = event_tx.clone();
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                match msg {
                    WebSocketMessage::Event(event) => {
                        let _ = forward_tx.send(TwitchClientEvent::ChatEvent(event)).await;
                    }
                    WebSocketMessage::SessionId { resumed: true, .. } => {
                        log::info!("EventSub session resumed, subscriptions carried over");
                    }
                    WebSocketMessage::SessionId { id, resumed: false } => {
                        // A fresh session starts without subscriptions
                        match subscribe(&eventsub, &id, &broadcaster_id, &bot_user_id, &forward_tx)
                            .await
                        {
                            Ok(()) => {
                                let _ = forward_tx.send(TwitchClientEvent::Connected).await;
                            }
                            Err(e) => {
                                let _ = forward_tx
                                    .send(TwitchClientEvent::Error(format!(
                                        "Failed to resubscribe: {}",
                                        e
                                    )))
                                    .await;
                            }
                        }
                    }
                    WebSocketMessage::Disconnected => {
                        let _ = forward_tx.send(TwitchClientEvent::Disconnected).await;
                    }
                    WebSocketMessage::Error(e) => {
                        let _ = forward_tx.send(TwitchClientEvent::Error(e)).await;
                    }
                    WebSocketMessage::Connected => {}
                }
            }
            log::warn!("EventSub connection task ended");
        });

        let keepalive_tx = event_tx;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;

                if keepalive_handler.is_keepalive_timeout().await {
                    let _ = keepalive_tx
                        .send(TwitchClientEvent::Warning(
                            "Keepalive timeout - connection stale".to_string(),
                        ))
                        .await;
                }
                if keepalive_tx.is_closed() {
                    break;
                }
            }
        });

        Ok(TwitchChannel::new(
            self.api.clone(),
            broadcaster.id,
            bot_user.id,
        ))
    }

    pub fn disconnect(&mut self) {
        if let Some(task) = self.ws_task.take() {
            task.abort();
        }
    }
}

impl Drop for TwitchClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn subscribe(
    eventsub: &EventSubManager,
    session_id: &str,
    broadcaster_id: &str,
    bot_user_id: &str,
    event_tx: &mpsc::Sender<TwitchClientEvent>,
) -> Result<()> {
    let (success_count, failed_count, warnings) = eventsub
        .subscribe_to_all_events(session_id, broadcaster_id, bot_user_id)
        .await?;

    for warning in warnings {
        let _ = event_tx.send(TwitchClientEvent::Warning(warning)).await;
    }
    if failed_count > 0 {
        let _ = event_tx
            .send(TwitchClientEvent::Warning(format!(
                "EventSub: {} active, {} skipped",
                success_count, failed_count
            )))
            .await;
    }
    Ok(())
}
