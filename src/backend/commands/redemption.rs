use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::backend::auth::CredentialManager;
use crate::backend::twitch::{RedemptionApi, RedemptionStatus};

/// Older pending redemptions belong to an event that was already processed
const STALE_AFTER_SECS: i64 = 60;

/// Fulfills or refunds the newest pending redemption of the song reward
pub struct RedemptionSettler {
    api: Arc<dyn RedemptionApi>,
    credential: CredentialManager,
    reward_id: String,
}

impl RedemptionSettler {
    pub fn new(api: Arc<dyn RedemptionApi>, credential: CredentialManager, reward_id: String) -> Self {
        Self {
            api,
            credential,
            reward_id,
        }
    }

    pub fn reward_id(&self) -> &str {
        &self.reward_id
    }

    pub async fn fulfill(&self) -> bool {
        self.settle(RedemptionStatus::Fulfilled).await
    }

    pub async fn refund(&self) -> bool {
        self.settle(RedemptionStatus::Canceled).await
    }

    async fn settle(&self, status: RedemptionStatus) -> bool {
        if !self.credential.is_fully_authenticated().await {
            log::warn!(
                "Cannot mark redemption {}: {} credential lacks redemption management",
                status.as_str(),
                self.credential.name()
            );
            return false;
        }

        let redemption = match self.api.newest_unfulfilled(&self.reward_id).await {
            Ok(Some(redemption)) => redemption,
            Ok(None) => {
                log::warn!("No pending redemption found for reward {}", self.reward_id);
                return false;
            }
            Err(e) => {
                log::error!("Failed to list redemptions: {}", e);
                return false;
            }
        };

        let age = Utc::now() - redemption.redeemed_at;
        if age > Duration::seconds(STALE_AFTER_SECS) {
            log::warn!(
                "Newest pending redemption {} is {}s old, leaving it alone",
                redemption.id,
                age.num_seconds()
            );
            return false;
        }

        match self
            .api
            .update_status(&redemption.id, &self.reward_id, status)
            .await
        {
            Ok(()) => {
                log::info!("Redemption {} marked {}", redemption.id, status.as_str());
                true
            }
            Err(e) => {
                log::error!(
                    "Failed to mark redemption {} as {}: {}",
                    redemption.id,
                    status.as_str(),
                    e
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{authenticated_credential, degraded_credential, FakeRedemptions};

    #[tokio::test]
    async fn test_fresh_redemption_is_fulfilled() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRedemptions::with_pending("r1", Utc::now() - Duration::seconds(5)));
        let settler = RedemptionSettler::new(api.clone(), authenticated_credential(&dir).await, "reward".into());

        assert!(settler.fulfill().await);
        assert_eq!(
            api.patches(),
            vec![("r1".to_string(), "reward".to_string(), RedemptionStatus::Fulfilled)]
        );
    }

    #[tokio::test]
    async fn test_refund_cancels() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRedemptions::with_pending("r2", Utc::now()));
        let settler = RedemptionSettler::new(api.clone(), authenticated_credential(&dir).await, "reward".into());

        assert!(settler.refund().await);
        assert_eq!(api.patches()[0].2, RedemptionStatus::Canceled);
    }

    #[tokio::test]
    async fn test_stale_redemption_is_not_settled() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRedemptions::with_pending("old", Utc::now() - Duration::seconds(90)));
        let settler = RedemptionSettler::new(api.clone(), authenticated_credential(&dir).await, "reward".into());

        assert!(!settler.fulfill().await);
        assert!(api.patches().is_empty());
    }

    #[tokio::test]
    async fn test_missing_redemption_is_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRedemptions::empty());
        let settler = RedemptionSettler::new(api.clone(), authenticated_credential(&dir).await, "reward".into());

        assert!(!settler.refund().await);
        assert!(api.patches().is_empty());
    }

    #[tokio::test]
    async fn test_degraded_credential_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRedemptions::with_pending("r1", Utc::now()));
        let settler = RedemptionSettler::new(api.clone(), degraded_credential(&dir).await, "reward".into());

        assert!(!settler.fulfill().await);
        assert!(!settler.refund().await);
        assert_eq!(api.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_patch_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(FakeRedemptions::with_pending("r1", Utc::now()).failing_patch());
        let settler = RedemptionSettler::new(api.clone(), authenticated_credential(&dir).await, "reward".into());

        assert!(!settler.fulfill().await);
        assert_eq!(api.patches().len(), 1);
    }
}
