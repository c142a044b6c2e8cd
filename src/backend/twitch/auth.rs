use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::auth::{OAuthProvider, TokenDocument, TokenValidation};
use crate::backend::config::ClientCredentials;
use crate::backend::error::{BotError, Result};

const AUTHORIZE_URL: &str = "https://id.twitch.tv/oauth2/authorize";
const TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
const VALIDATE_URL: &str = "https://id.twitch.tv/oauth2/validate";

/// Scopes requested at consent time
pub const SCOPES: &[&str] = &[
    "user:read:chat",
    "user:write:chat",
    "user:bot",
    "channel:read:redemptions",
    "channel:manage:redemptions",
    "clips:edit",
    "bits:read",
];

/// Without it the bot still chats, but cannot settle redemptions
pub const REDEMPTION_SCOPE: &str = "channel:manage:redemptions";

/// Response from the token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Vec<String>,
    pub token_type: Option<String>,
}

impl From<TokenResponse> for TokenDocument {
    fn from(response: TokenResponse) -> Self {
        TokenDocument {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            scopes: response.scope,
            expires_in: response.expires_in,
            token_type: response.token_type,
        }
    }
}

/// Response from the validation endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateResponse {
    pub login: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    pub expires_in: u64,
}

/// Twitch identity service
pub struct TwitchOAuth {
    client: reqwest::Client,
    credentials: ClientCredentials,
}

impl TwitchOAuth {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenDocument> {
        let mut form = vec![
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
        ];
        form.extend_from_slice(params);

        let response = self.client.post(TOKEN_URL).form(&form).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::AuthError(format!(
                "Twitch token request failed: HTTP {} - {}",
                status, error_text
            )));
        }

        let token_response = response.json::<TokenResponse>().await?;
        Ok(token_response.into())
    }
}

#[async_trait]
impl OAuthProvider for TwitchOAuth {
    fn name(&self) -> &'static str {
        "Twitch"
    }

    fn authorize_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&SCOPES.join(" "))
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenDocument> {
        self.request_token(&[
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenDocument> {
        self.request_token(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn validate(&self, document: &TokenDocument) -> Result<TokenValidation> {
        let response = self
            .client
            .get(VALIDATE_URL)
            .header("Authorization", format!("OAuth {}", document.access_token))
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 {
            return Ok(TokenValidation {
                valid: false,
                scopes: Vec::new(),
            });
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::from_status(status, error_text));
        }

        let validated = response.json::<ValidateResponse>().await?;
        log::debug!(
            "Twitch token for {} valid for another {}s",
            validated.login.as_deref().unwrap_or("app"),
            validated.expires_in
        );
        Ok(TokenValidation {
            valid: true,
            scopes: validated.scopes,
        })
    }
}
