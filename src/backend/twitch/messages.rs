use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// WebSocket message received from Twitch EventSub
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EventSubMessage {
    pub metadata: Metadata,
    pub payload: Payload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Metadata {
    pub message_id: String,
    pub message_type: String,
    pub message_timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Welcome(WelcomePayload),
    Notification(NotificationPayload),
    Revocation(RevocationPayload),
    Keepalive(KeepalivePayload),
}

/// Session welcome and reconnect payload
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WelcomePayload {
    pub session: Session,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Session {
    pub id: String,
    pub status: String,
    pub keepalive_timeout_seconds: Option<u64>,
    pub reconnect_url: Option<String>,
    pub connected_at: String,
}

/// Notification payload containing events
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationPayload {
    pub subscription: Subscription,
    pub event: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subscription {
    pub id: String,
    #[serde(rename = "type")]
    pub subscription_type: String,
    pub version: String,
    pub status: String,
    pub condition: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RevocationPayload {
    pub subscription: Subscription,
}

/// Keepalive payload (empty)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KeepalivePayload {}

/// channel.chat.message
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChatMessageEvent {
    pub broadcaster_user_id: String,
    pub broadcaster_user_login: String,
    pub chatter_user_id: String,
    pub chatter_user_login: String,
    pub chatter_user_name: String,
    pub message_id: String,
    pub message: Message,
    #[serde(default)]
    pub badges: Vec<Badge>,
    #[serde(default)]
    pub channel_points_custom_reward_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Badge {
    pub set_id: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub info: String,
}

impl Badge {
    pub fn new(set_id: &str) -> Self {
        Self {
            set_id: set_id.to_string(),
            id: "1".to_string(),
            info: String::new(),
        }
    }
}

/// channel.channel_points_custom_reward_redemption.add
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedemptionAddEvent {
    pub id: String,
    pub broadcaster_user_id: String,
    pub user_id: String,
    pub user_login: String,
    pub user_name: String,
    #[serde(default)]
    pub user_input: String,
    pub status: String,
    pub reward: RewardInfo,
    pub redeemed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RewardInfo {
    pub id: String,
    pub title: String,
    pub cost: u64,
}

/// channel.cheer
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheerEvent {
    #[serde(default)]
    pub is_anonymous: bool,
    pub user_login: Option<String>,
    pub user_name: Option<String>,
    #[serde(default)]
    pub message: String,
    pub bits: u64,
}

/// Events the bot reacts to
#[derive(Debug, Clone)]
pub enum TwitchEvent {
    ChatMessage(ChatMessageEvent),
    RedemptionAdd(RedemptionAddEvent),
    Cheer(CheerEvent),
}
