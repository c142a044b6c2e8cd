use async_trait::async_trait;
use serde::Deserialize;

use crate::backend::auth::{OAuthProvider, TokenDocument, TokenValidation};
use crate::backend::config::ClientCredentials;
use crate::backend::error::{BotError, Result};

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const ME_URL: &str = "https://api.spotify.com/v1/me";

/// Scopes needed to read and drive the streamer's player
pub const SCOPES: &str =
    "user-modify-playback-state user-read-playback-state user-read-currently-playing";

/// Response from the token endpoint. `scope` is space separated and a
/// refresh may omit `refresh_token`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
}

impl From<TokenResponse> for TokenDocument {
    fn from(response: TokenResponse) -> Self {
        TokenDocument {
            access_token: response.access_token,
            refresh_token: response.refresh_token.unwrap_or_default(),
            scopes: response
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            expires_in: response.expires_in,
            token_type: response.token_type,
        }
    }
}

/// Spotify accounts service
pub struct SpotifyOAuth {
    client: reqwest::Client,
    credentials: ClientCredentials,
}

impl SpotifyOAuth {
    pub fn new(credentials: ClientCredentials) -> Self {
        Self {
            client: reqwest::Client::new(),
            credentials,
        }
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenDocument> {
        let response = self
            .client
            .post(TOKEN_URL)
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .form(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(BotError::AuthError(format!(
                "Spotify token request failed: HTTP {} - {}",
                status, error_text
            )));
        }

        let token_response = response.json::<TokenResponse>().await?;
        Ok(token_response.into())
    }
}

#[async_trait]
impl OAuthProvider for SpotifyOAuth {
    fn name(&self) -> &'static str {
        "Spotify"
    }

    fn authorize_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&scope={}&redirect_uri={}",
            AUTHORIZE_URL,
            urlencoding::encode(&self.credentials.client_id),
            urlencoding::encode(SCOPES),
            urlencoding::encode(redirect_uri)
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenDocument> {
        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code),
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

    /// Spotify has no introspection endpoint, so call the profile endpoint and keep
    /// the scopes granted at exchange time.
    async fn validate(&self, document: &TokenDocument) -> Result<TokenValidation> {
        let response = self
            .client
            .get(ME_URL)
            .header("Authorization", format!("Bearer {}", document.access_token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(TokenValidation {
                valid: true,
                scopes: document.scopes.clone(),
            });
        }
        if status.as_u16() == 401 {
            return Ok(TokenValidation {
                valid: false,
                scopes: Vec::new(),
            });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(BotError::from_status(status, error_text))
    }
}
