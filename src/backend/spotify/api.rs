use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use super::models::{CurrentlyPlaying, PlaybackState, PlayerQueue, SearchResponse, Track};
use crate::backend::auth::CredentialManager;
use crate::backend::error::{BotError, Result};

const API_BASE: &str = "https://api.spotify.com/v1";

/// Player and catalog operations the command handlers need
#[async_trait]
pub trait MusicService: Send + Sync {
    /// First track id matching an already URL-encoded search query
    async fn search_first_track(&self, encoded_query: &str) -> Result<Option<String>>;

    async fn track(&self, track_id: &str) -> Result<Track>;

    async fn add_to_queue(&self, track_uri: &str) -> Result<()>;

    async fn skip_to_next(&self) -> Result<()>;

    /// `None` when nothing is playing
    async fn currently_playing(&self) -> Result<Option<Track>>;

    async fn queue(&self) -> Result<PlayerQueue>;

    /// `None` when there is no active device
    async fn volume(&self) -> Result<Option<u8>>;

    async fn set_volume(&self, percent: u8) -> Result<()>;
}

/// Spotify Web API client. Every call goes through the credential's
/// refresh-once wrapper.
pub struct SpotifyApi {
    client: reqwest::Client,
    credential: CredentialManager,
    base_url: String,
}

impl SpotifyApi {
    pub fn new(credential: CredentialManager) -> Self {
        Self::with_base_url(credential, API_BASE)
    }

    /// Client against another Web API root, e.g. a local mock server
    pub fn with_base_url(credential: CredentialManager, base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            credential,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// GET a JSON resource; 204 No Content maps to `None`
    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        self.credential
            .with_token(|token| async move {
                let response = self
                    .client
                    .get(url)
                    .header("Authorization", format!("Bearer {}", token))
                    .send()
                    .await?;

                if response.status() == StatusCode::NO_CONTENT {
                    return Ok(None);
                }
                let response = BotError::check(response).await?;
                Ok(Some(response.json::<T>().await?))
            })
            .await
    }

    /// Body-less player command
    async fn send_command(&self, method: Method, url: &str) -> Result<()> {
        self.credential
            .with_token(|token| {
                let method = method.clone();
                async move {
                    let response = self
                        .client
                        .request(method, url)
                        .header("Authorization", format!("Bearer {}", token))
                        .header("Content-Length", "0")
                        .send()
                        .await?;
                    BotError::check(response).await?;
                    Ok(())
                }
            })
            .await
    }
}

#[async_trait]
impl MusicService for SpotifyApi {
    async fn search_first_track(&self, encoded_query: &str) -> Result<Option<String>> {
        let url = format!("{}/search?q={}&type=track", self.base_url, encoded_query);
        let result = self.get_json::<SearchResponse>(&url).await?;
        Ok(result.and_then(|r| r.tracks.items.into_iter().next().map(|t| t.id)))
    }

    async fn track(&self, track_id: &str) -> Result<Track> {
        let url = format!("{}/tracks/{}", self.base_url, track_id);
        self.get_json::<Track>(&url)
            .await?
            .ok_or_else(|| BotError::Validation(format!("Track '{}' not found", track_id)))
    }

    async fn add_to_queue(&self, track_uri: &str) -> Result<()> {
        let url = format!(
            "{}/me/player/queue?uri={}",
            self.base_url,
            urlencoding::encode(track_uri)
        );
        self.send_command(Method::POST, &url).await
    }

    async fn skip_to_next(&self) -> Result<()> {
        let url = format!("{}/me/player/next", self.base_url);
        self.send_command(Method::POST, &url).await
    }

    async fn currently_playing(&self) -> Result<Option<Track>> {
        let url = format!("{}/me/player/currently-playing", self.base_url);
        let playing = self.get_json::<CurrentlyPlaying>(&url).await?;
        Ok(playing.and_then(|p| p.item))
    }

    async fn queue(&self) -> Result<PlayerQueue> {
        let url = format!("{}/me/player/queue", self.base_url);
        Ok(self.get_json::<PlayerQueue>(&url).await?.unwrap_or_default())
    }

    async fn volume(&self) -> Result<Option<u8>> {
        let url = format!("{}/me/player", self.base_url);
        let state = self.get_json::<PlaybackState>(&url).await?;
        Ok(state.and_then(|s| s.device.volume_percent))
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        let url = format!(
            "{}/me/player/volume?volume_percent={}",
            self.base_url, percent
        );
        self.send_command(Method::PUT, &url).await
    }
}
