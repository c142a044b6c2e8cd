//! Twitch EventSub WebSocket and Helix integration
//!
//! Receives chat messages, channel-point redemptions and cheers over an
//! EventSub WebSocket session and talks back through Helix. Every Helix call
//! goes through the Twitch [`CredentialManager`](crate::backend::auth::CredentialManager).

mod api;
mod auth;
mod channel;
mod client;
mod eventsub;
mod messages;
mod websocket;

pub use api::{CustomReward, Redemption, RedemptionStatus, TwitchApi};
pub use auth::{TwitchOAuth, REDEMPTION_SCOPE};
pub use channel::{ChatSink, ClipService, RedemptionApi, TwitchChannel};
pub use client::{TwitchClient, TwitchClientEvent};
pub use messages::{
    Badge, ChatMessageEvent, CheerEvent, Message, RedemptionAddEvent, RewardInfo, TwitchEvent,
};
