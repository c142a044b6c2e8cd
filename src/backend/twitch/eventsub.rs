use serde_json::json;
use std::sync::Arc;

use super::api::{SubscriptionRequest, Transport, TwitchApi};
use super::websocket::{CHAT_MESSAGE_TYPE, CHEER_TYPE, REDEMPTION_ADD_TYPE};
use crate::backend::error::{BotError, Result};

/// Creates the EventSub subscriptions the bot listens to
pub struct EventSubManager {
    api: Arc<TwitchApi>,
}

impl EventSubManager {
    pub fn new(api: Arc<TwitchApi>) -> Self {
        Self { api }
    }

    async fn subscribe(
        &self,
        subscription_type: &str,
        version: &str,
        condition: serde_json::Value,
        session_id: &str,
    ) -> Result<()> {
        let request = SubscriptionRequest {
            subscription_type: subscription_type.to_string(),
            version: version.to_string(),
            condition,
            transport: Transport {
                method: "websocket".to_string(),
                session_id: session_id.to_string(),
            },
        };

        let created = self.api.create_subscription(&request).await?;
        log::debug!(
            "Subscription {} ({}) is {}",
            created.subscription_type,
            created.id,
            created.status
        );
        Ok(())
    }

    /// Subscribe to channel chat messages
    pub async fn subscribe_to_chat_messages(
        &self,
        session_id: &str,
        broadcaster_user_id: &str,
        user_id: &str,
    ) -> Result<()> {
        self.subscribe(
            CHAT_MESSAGE_TYPE,
            "1",
            json!({
                "broadcaster_user_id": broadcaster_user_id,
                "user_id": user_id
            }),
            session_id,
        )
        .await
    }

    /// Subscribe to channel-point redemptions of any reward
    pub async fn subscribe_to_redemptions(
        &self,
        session_id: &str,
        broadcaster_user_id: &str,
    ) -> Result<()> {
        self.subscribe(
            REDEMPTION_ADD_TYPE,
            "1",
            json!({ "broadcaster_user_id": broadcaster_user_id }),
            session_id,
        )
        .await
    }

    pub async fn subscribe_to_cheers(&self, session_id: &str, broadcaster_user_id: &str) -> Result<()> {
        self.subscribe(
            CHEER_TYPE,
            "1",
            json!({ "broadcaster_user_id": broadcaster_user_id }),
            session_id,
        )
        .await
    }

    fn get_required_scope(subscription_type: &str) -> &'static str {
        match subscription_type {
            CHAT_MESSAGE_TYPE => "user:read:chat",
            REDEMPTION_ADD_TYPE => "channel:read:redemptions",
            CHEER_TYPE => "bits:read",
            _ => "unknown",
        }
    }

    fn record(
        name: &str,
        subscription_type: &str,
        result: Result<()>,
        warnings: &mut Vec<String>,
    ) -> bool {
        match result {
            Ok(()) => {
                log::info!("Subscribed to {}", name);
                true
            }
            Err(BotError::Forbidden(_)) | Err(BotError::AuthExpired(_)) => {
                let scope = Self::get_required_scope(subscription_type);
                log::warn!("Skipping {} - missing scope: {}", name, scope);
                warnings.push(format!("Missing OAuth scope '{}' for {}", scope, name));
                false
            }
            Err(e) => {
                log::error!("Failed to subscribe to {}: {}", name, e);
                warnings.push(format!("Failed to subscribe to {}: {}", name, e));
                false
            }
        }
    }

    /// Subscribe to everything; returns (succeeded, failed, warnings).
    ///
    /// Only a failed chat subscription is an error, the others degrade.
    pub async fn subscribe_to_all_events(
        &self,
        session_id: &str,
        broadcaster_user_id: &str,
        user_id: &str,
    ) -> Result<(usize, usize, Vec<String>)> {
        let mut warnings = Vec::new();

        let chat = self
            .subscribe_to_chat_messages(session_id, broadcaster_user_id, user_id)
            .await;
        if !Self::record("chat messages", CHAT_MESSAGE_TYPE, chat, &mut warnings) {
            return Err(BotError::AuthError(format!(
                "Cannot receive chat: {}",
                warnings.join("; ")
            )));
        }

        let mut success_count = 1;
        let mut failed_count = 0;

        let redemptions = self
            .subscribe_to_redemptions(session_id, broadcaster_user_id)
            .await;
        if Self::record("redemptions", REDEMPTION_ADD_TYPE, redemptions, &mut warnings) {
            success_count += 1;
        } else {
            failed_count += 1;
        }

        let cheers = self.subscribe_to_cheers(session_id, broadcaster_user_id).await;
        if Self::record("cheers", CHEER_TYPE, cheers, &mut warnings) {
            success_count += 1;
        } else {
            failed_count += 1;
        }

        log::info!(
            "Subscriptions complete: {} succeeded, {} failed/skipped",
            success_count,
            failed_count
        );
        Ok((success_count, failed_count, warnings))
    }
}
