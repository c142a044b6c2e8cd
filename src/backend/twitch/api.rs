use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::auth::CredentialManager;
use crate::backend::error::{BotError, Result};

const HELIX_BASE: &str = "https://api.twitch.tv/helix";

const CHAT_MESSAGES_PATH: &str = "/chat/messages";
const USERS_PATH: &str = "/users";
const CUSTOM_REWARDS_PATH: &str = "/channel_points/custom_rewards";
const REDEMPTIONS_PATH: &str = "/channel_points/custom_rewards/redemptions";
const CLIPS_PATH: &str = "/clips";
const EVENTSUB_PATH: &str = "/eventsub/subscriptions";

/// Helix wraps every payload in a `data` array
#[derive(Debug, Clone, Deserialize)]
pub struct DataResponse<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageData {
    pub message_id: String,
    pub is_sent: bool,
    pub drop_reason: Option<DropReason>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DropReason {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserData {
    pub id: String,
    pub login: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedemptionStatus {
    Unfulfilled,
    Fulfilled,
    Canceled,
}

impl RedemptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedemptionStatus::Unfulfilled => "UNFULFILLED",
            RedemptionStatus::Fulfilled => "FULFILLED",
            RedemptionStatus::Canceled => "CANCELED",
        }
    }
}

/// Channel-point redemption as listed by Helix
#[derive(Debug, Clone, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub status: RedemptionStatus,
    pub redeemed_at: DateTime<Utc>,
    #[serde(default)]
    pub user_login: String,
    #[serde(default)]
    pub user_input: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomReward {
    pub id: String,
    pub title: String,
    pub cost: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClipData {
    pub id: String,
    pub edit_url: String,
}

/// EventSub subscription request
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "type")]
    pub subscription_type: String,
    pub version: String,
    pub condition: serde_json::Value,
    pub transport: Transport,
}

#[derive(Debug, Clone, Serialize)]
pub struct Transport {
    pub method: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionData {
    pub id: String,
    #[serde(rename = "type")]
    pub subscription_type: String,
    pub status: String,
}

/// Helix client. Every request runs through the Twitch credential's
/// refresh-once wrapper.
pub struct TwitchApi {
    client: reqwest::Client,
    client_id: String,
    credential: CredentialManager,
    base_url: String,
}

impl TwitchApi {
    pub fn new(client_id: String, credential: CredentialManager) -> Self {
        Self::with_base_url(client_id, credential, HELIX_BASE)
    }

    /// Client against another Helix root, e.g. a local mock server
    pub fn with_base_url(client_id: String, credential: CredentialManager, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id,
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<T> {
        self.credential
            .with_token(|token| {
                let method = method.clone();
                async move {
                    let mut request = self
                        .client
                        .request(method, url)
                        .header("Authorization", format!("Bearer {}", token))
                        .header("Client-Id", self.client_id.as_str());
                    if let Some(body) = body {
                        request = request.json(body);
                    }

                    let response = BotError::check(request.send().await?).await?;
                    Ok(response.json::<T>().await?)
                }
            })
            .await
    }

    /// First element of a Helix `data` array
    async fn request_one<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        what: &str,
    ) -> Result<T> {
        self.request::<DataResponse<T>>(method, url, body)
            .await?
            .data
            .into_iter()
            .next()
            .ok_or_else(|| BotError::Validation(format!("{} not found", what)))
    }

    pub async fn get_user_by_login(&self, login: &str) -> Result<UserData> {
        let url = format!("{}?login={}", self.url(USERS_PATH), urlencoding::encode(login));
        self.request_one(Method::GET, &url, None, &format!("User '{}'", login))
            .await
    }

    /// Owner of the access token
    pub async fn get_current_user(&self) -> Result<UserData> {
        self.request_one(Method::GET, &self.url(USERS_PATH), None, "Authenticated user")
            .await
    }

    pub async fn send_message(
        &self,
        broadcaster_id: &str,
        sender_id: &str,
        message: &str,
    ) -> Result<SendMessageData> {
        let body = json!({
            "broadcaster_id": broadcaster_id,
            "sender_id": sender_id,
            "message": message
        });
        let sent: SendMessageData = self
            .request_one(Method::POST, &self.url(CHAT_MESSAGES_PATH), Some(&body), "Send result")
            .await?;

        if !sent.is_sent {
            if let Some(reason) = &sent.drop_reason {
                log::warn!("Chat message dropped ({}): {}", reason.code, reason.message);
            }
        }
        Ok(sent)
    }

    /// Newest unfulfilled redemption of a reward, if any
    pub async fn get_newest_unfulfilled_redemption(
        &self,
        broadcaster_id: &str,
        reward_id: &str,
    ) -> Result<Option<Redemption>> {
        let url = format!(
            "{}?broadcaster_id={}&reward_id={}&status=UNFULFILLED&sort=NEWEST&first=1",
            self.url(REDEMPTIONS_PATH),
            broadcaster_id,
            reward_id
        );
        let response: DataResponse<Redemption> = self.request(Method::GET, &url, None).await?;
        Ok(response.data.into_iter().next())
    }

    pub async fn update_redemption_status(
        &self,
        broadcaster_id: &str,
        reward_id: &str,
        redemption_id: &str,
        status: RedemptionStatus,
    ) -> Result<Redemption> {
        let url = format!(
            "{}?id={}&broadcaster_id={}&reward_id={}",
            self.url(REDEMPTIONS_PATH),
            redemption_id,
            broadcaster_id,
            reward_id
        );
        let body = json!({ "status": status });
        self.request_one(Method::PATCH, &url, Some(&body), "Updated redemption")
            .await
    }

    /// Rewards this client id created and may therefore manage
    pub async fn get_manageable_rewards(&self, broadcaster_id: &str) -> Result<Vec<CustomReward>> {
        let url = format!(
            "{}?broadcaster_id={}&only_manageable_rewards=true",
            self.url(CUSTOM_REWARDS_PATH),
            broadcaster_id
        );
        let response: DataResponse<CustomReward> = self.request(Method::GET, &url, None).await?;
        Ok(response.data)
    }

    pub async fn create_reward(
        &self,
        broadcaster_id: &str,
        title: &str,
        cost: u64,
    ) -> Result<CustomReward> {
        let url = format!("{}?broadcaster_id={}", self.url(CUSTOM_REWARDS_PATH), broadcaster_id);
        let body = json!({
            "title": title,
            "cost": cost,
            "is_user_input_required": true
        });
        self.request_one(Method::POST, &url, Some(&body), "Created reward")
            .await
    }

    pub async fn create_clip(&self, broadcaster_id: &str) -> Result<ClipData> {
        let url = format!(
            "{}?broadcaster_id={}&has_delay=false",
            self.url(CLIPS_PATH),
            broadcaster_id
        );
        self.request_one(Method::POST, &url, None, "Created clip").await
    }

    pub async fn create_subscription(&self, request: &SubscriptionRequest) -> Result<SubscriptionData> {
        let body = serde_json::to_value(request)?;
        self.request_one(Method::POST, &self.url(EVENTSUB_PATH), Some(&body), "Subscription")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::credential_with_access;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn api(server: &MockServer, dir: &tempfile::TempDir, access: &str) -> TwitchApi {
        TwitchApi::with_base_url(
            "client".to_string(),
            credential_with_access(dir, access).await,
            &server.uri(),
        )
    }

    #[test]
    fn test_parse_redemption_list() {
        let response: DataResponse<Redemption> = serde_json::from_str(
            r#"{"data": [{
                "broadcaster_id": "1",
                "id": "17fa2df1-ad76-4804-bfa5-a40ef63efe63",
                "user_login": "viewer",
                "user_input": "some song",
                "status": "UNFULFILLED",
                "redeemed_at": "2024-05-01T12:00:00Z",
                "reward": {"id": "r", "title": "Song Request", "prompt": "", "cost": 50}
            }], "pagination": {}}"#,
        )
        .unwrap();

        let redemption = &response.data[0];
        assert_eq!(redemption.status, RedemptionStatus::Unfulfilled);
        assert_eq!(redemption.user_input, "some song");
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(
            json!({ "status": RedemptionStatus::Canceled }).to_string(),
            r#"{"status":"CANCELED"}"#
        );
        assert_eq!(RedemptionStatus::Fulfilled.as_str(), "FULFILLED");
    }

    #[tokio::test]
    async fn test_newest_unfulfilled_redemption_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channel_points/custom_rewards/redemptions"))
            .and(query_param("broadcaster_id", "42"))
            .and(query_param("reward_id", "reward"))
            .and(query_param("status", "UNFULFILLED"))
            .and(query_param("sort", "NEWEST"))
            .and(query_param("first", "1"))
            .and(header("Client-Id", "client"))
            .and(header("Authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "r1",
                    "user_login": "viewer",
                    "user_input": "some song",
                    "status": "UNFULFILLED",
                    "redeemed_at": "2024-05-01T12:00:00Z"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/channel_points/custom_rewards/redemptions"))
            .and(query_param("reward_id", "other"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = api(&server, &dir, "new").await;

        let newest = api
            .get_newest_unfulfilled_redemption("42", "reward")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(newest.id, "r1");
        assert_eq!(newest.user_input, "some song");

        let none = api.get_newest_unfulfilled_redemption("42", "other").await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_update_redemption_status_sends_patch() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/channel_points/custom_rewards/redemptions"))
            .and(query_param("id", "r1"))
            .and(query_param("broadcaster_id", "42"))
            .and(query_param("reward_id", "reward"))
            .and(body_json(json!({ "status": "FULFILLED" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{
                    "id": "r1",
                    "status": "FULFILLED",
                    "redeemed_at": "2024-05-01T12:00:00Z"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = api(&server, &dir, "new").await;

        let updated = api
            .update_redemption_status("42", "reward", "r1", RedemptionStatus::Fulfilled)
            .await
            .unwrap();
        assert_eq!(updated.status, RedemptionStatus::Fulfilled);
    }

    #[tokio::test]
    async fn test_send_message_retries_after_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/messages"))
            .and(header("Authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/messages"))
            .and(header("Authorization", "Bearer new"))
            .and(body_json(json!({
                "broadcaster_id": "42",
                "sender_id": "7",
                "message": "hello chat"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "message_id": "m1", "is_sent": true, "drop_reason": null }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = api(&server, &dir, "stale").await;

        let sent = api.send_message("42", "7", "hello chat").await.unwrap();
        assert!(sent.is_sent);
        assert_eq!(sent.message_id, "m1");
    }

    #[tokio::test]
    async fn test_unknown_user_and_refused_clip() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .and(query_param("login", "nobody"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/clips"))
            .respond_with(ResponseTemplate::new(403).set_body_string("missing clips:edit"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let api = api(&server, &dir, "new").await;

        assert!(matches!(
            api.get_user_by_login("nobody").await,
            Err(BotError::Validation(_))
        ));
        assert!(matches!(api.create_clip("42").await, Err(BotError::Forbidden(_))));
    }
}
