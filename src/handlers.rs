use crate::backend::commands::CommandDispatcher;
use crate::backend::twitch::{TwitchClientEvent, TwitchEvent};
use log::{error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Drain client events until the connection task goes away.
///
/// Each notification runs on its own task so a slow remote call never
/// holds up the next chat message.
pub async fn handle_twitch_messages(
    mut rx: mpsc::Receiver<TwitchClientEvent>,
    dispatcher: Arc<CommandDispatcher>,
) {
    while let Some(event) = rx.recv().await {
        handle_twitch_event(event, &dispatcher);
    }
    warn!("Twitch event stream closed");
}

fn handle_twitch_event(event: TwitchClientEvent, dispatcher: &Arc<CommandDispatcher>) {
    match event {
        TwitchClientEvent::Connected => {
            info!("EventSub ready - listening for chat events");
        }

        TwitchClientEvent::Disconnected => {
            warn!("Disconnected from Twitch, reconnecting...");
        }

        TwitchClientEvent::ChatEvent(event) => {
            if let TwitchEvent::ChatMessage(msg) = &event {
                log::debug!("{}: {}", msg.chatter_user_login, msg.message.text);
            }
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.handle_event(event).await;
            });
        }

        TwitchClientEvent::Warning(message) => {
            warn!("{}", message);
        }

        TwitchClientEvent::Error(message) => {
            error!("Twitch error: {}", message);
        }
    }
}
