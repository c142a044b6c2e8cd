use async_trait::async_trait;
use std::sync::Arc;

use super::api::{CustomReward, Redemption, RedemptionStatus, TwitchApi};
use crate::backend::error::Result;

/// Outbound chat
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn say(&self, message: &str) -> Result<()>;
}

/// Redemption list and patch endpoints of one channel
#[async_trait]
pub trait RedemptionApi: Send + Sync {
    async fn newest_unfulfilled(&self, reward_id: &str) -> Result<Option<Redemption>>;

    async fn update_status(
        &self,
        redemption_id: &str,
        reward_id: &str,
        status: RedemptionStatus,
    ) -> Result<()>;
}

#[async_trait]
pub trait ClipService: Send + Sync {
    /// Clip the live stream, returning the clip id
    async fn create_clip(&self) -> Result<String>;
}

/// Helix calls bound to the joined channel and the bot account
pub struct TwitchChannel {
    api: Arc<TwitchApi>,
    broadcaster_id: String,
    sender_id: String,
}

impl TwitchChannel {
    pub fn new(api: Arc<TwitchApi>, broadcaster_id: String, sender_id: String) -> Self {
        Self {
            api,
            broadcaster_id,
            sender_id,
        }
    }

    /// Reuse a manageable reward, preferring one titled `name`, or create one.
    ///
    /// Only rewards created by this client id can have their redemptions
    /// updated, so a same-named reward made elsewhere is not reused.
    pub async fn ensure_reward(&self, name: &str, cost: u64) -> Result<CustomReward> {
        let mut rewards = self.api.get_manageable_rewards(&self.broadcaster_id).await?;
        let position = rewards
            .iter()
            .position(|r| r.title.eq_ignore_ascii_case(name))
            .unwrap_or(0);
        if position < rewards.len() {
            let reward = rewards.swap_remove(position);
            log::info!("Using existing reward '{}' ({})", reward.title, reward.id);
            return Ok(reward);
        }

        let reward = self.api.create_reward(&self.broadcaster_id, name, cost).await?;
        log::info!("Created reward '{}' ({}) costing {}", reward.title, reward.id, reward.cost);
        Ok(reward)
    }
}

#[async_trait]
impl ChatSink for TwitchChannel {
    async fn say(&self, message: &str) -> Result<()> {
        self.api
            .send_message(&self.broadcaster_id, &self.sender_id, message)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl RedemptionApi for TwitchChannel {
    async fn newest_unfulfilled(&self, reward_id: &str) -> Result<Option<Redemption>> {
        self.api
            .get_newest_unfulfilled_redemption(&self.broadcaster_id, reward_id)
            .await
    }

    async fn update_status(
        &self,
        redemption_id: &str,
        reward_id: &str,
        status: RedemptionStatus,
    ) -> Result<()> {
        self.api
            .update_redemption_status(&self.broadcaster_id, reward_id, redemption_id, status)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ClipService for TwitchChannel {
    async fn create_clip(&self) -> Result<String> {
        let clip = self.api.create_clip(&self.broadcaster_id).await?;
        log::info!("Clip created, edit at {}", clip.edit_url);
        Ok(clip.id)
    }
}
