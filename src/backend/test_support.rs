//! In-memory doubles for the remote services, shared by unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Duration;

use crate::backend::auth::{
    CredentialManager, OAuthProvider, TokenDocument, TokenStore, TokenValidation,
};
use crate::backend::error::{BotError, Result};
use crate::backend::spotify::{Artist, ExternalUrls, MusicService, PlayerQueue, Track};
use crate::backend::twitch::{
    Badge, ChatMessageEvent, ChatSink, ClipService, Message, Redemption, RedemptionAddEvent,
    RedemptionApi, RedemptionStatus, RewardInfo,
};

const REDEMPTION_SCOPE: &str = "channel:manage:redemptions";

pub fn token(access: &str) -> TokenDocument {
    TokenDocument {
        access_token: access.to_string(),
        refresh_token: format!("refresh-{}", access),
        scopes: vec![REDEMPTION_SCOPE.to_string(), "chat:read".to_string()],
        expires_in: Some(3600),
        token_type: Some("bearer".to_string()),
    }
}

/// Accepts every token except `"old"` and refreshes to `"new"`
pub struct FakeProvider {
    refreshes: AtomicUsize,
    refresh_delay: Duration,
    fail_refresh: bool,
    scopes: Vec<String>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            refreshes: AtomicUsize::new(0),
            refresh_delay: Duration::ZERO,
            fail_refresh: false,
            scopes: vec![REDEMPTION_SCOPE.to_string(), "chat:read".to_string()],
        }
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    pub fn failing_refresh(mut self) -> Self {
        self.fail_refresh = true;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<&str>) -> Self {
        self.scopes = scopes.into_iter().map(String::from).collect();
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "Fake"
    }

    fn authorize_url(&self, redirect_uri: &str) -> String {
        format!("https://auth.invalid/authorize?redirect_uri={}", redirect_uri)
    }

    async fn exchange_code(&self, _code: &str, _redirect_uri: &str) -> Result<TokenDocument> {
        Ok(token("new"))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenDocument> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        if !self.refresh_delay.is_zero() {
            tokio::time::sleep(self.refresh_delay).await;
        }
        if self.fail_refresh {
            return Err(BotError::AuthError("invalid refresh token".to_string()));
        }
        // Providers may omit the refresh token and scopes on refresh
        Ok(TokenDocument {
            access_token: "new".to_string(),
            refresh_token: String::new(),
            scopes: Vec::new(),
            expires_in: Some(3600),
            token_type: Some("bearer".to_string()),
        })
    }

    async fn validate(&self, document: &TokenDocument) -> Result<TokenValidation> {
        Ok(TokenValidation {
            valid: document.access_token != "old",
            scopes: self.scopes.clone(),
        })
    }
}

fn required_redemption_scope(provider: FakeProvider, dir: &tempfile::TempDir) -> CredentialManager {
    CredentialManager::with_required_scopes(
        Arc::new(provider),
        TokenStore::new(dir.path().join("token.json")),
        0,
        vec![REDEMPTION_SCOPE.to_string()],
    )
}

pub async fn authenticated_credential(dir: &tempfile::TempDir) -> CredentialManager {
    let credential = required_redemption_scope(FakeProvider::new(), dir);
    credential.restore(token("new")).await;
    credential.ensure_valid().await.unwrap();
    credential
}

/// Signed in with `access`; a refresh always yields `"new"`
pub async fn credential_with_access(dir: &tempfile::TempDir, access: &str) -> CredentialManager {
    let credential = CredentialManager::new(
        Arc::new(FakeProvider::new()),
        TokenStore::new(dir.path().join("token.json")),
        0,
    );
    credential.restore(token(access)).await;
    credential
}

/// Valid token lacking the redemption scope
pub async fn degraded_credential(dir: &tempfile::TempDir) -> CredentialManager {
    let credential =
        required_redemption_scope(FakeProvider::new().with_scopes(vec!["chat:read"]), dir);
    credential.restore(token("new")).await;
    credential.ensure_valid().await.unwrap();
    credential
}

pub fn track(id: &str, name: &str, secs: u64) -> Track {
    Track {
        id: id.to_string(),
        name: name.to_string(),
        uri: format!("spotify:track:{}", id),
        duration_ms: secs * 1000,
        artists: vec![
            Artist {
                name: "Artist A".to_string(),
            },
            Artist {
                name: "Artist B".to_string(),
            },
        ],
        external_urls: ExternalUrls {
            spotify: Some(format!("https://open.spotify.com/track/{}", id)),
        },
    }
}

#[derive(Default)]
struct MusicState {
    tracks: HashMap<String, Track>,
    search_results: HashMap<String, String>,
    searches: Vec<String>,
    queued: Vec<String>,
    enqueue_error: Option<BotError>,
    playing: Option<Track>,
    upcoming: Vec<Track>,
    volume: Option<u8>,
    skips: usize,
}

/// Scripted music service recording every mutating call
#[derive(Default)]
pub struct FakeMusic {
    state: Mutex<MusicState>,
}

impl FakeMusic {
    pub fn new() -> Self {
        Self::default()
    }

    fn with(self, f: impl FnOnce(&mut MusicState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn with_track(self, track: Track) -> Self {
        self.with(|s| {
            s.tracks.insert(track.id.clone(), track);
        })
    }

    /// Answer `encoded_query` with `track_id`; unknown queries find nothing
    pub fn with_search(self, encoded_query: &str, track_id: &str) -> Self {
        self.with(|s| {
            s.search_results
                .insert(encoded_query.to_string(), track_id.to_string());
        })
    }

    pub fn failing_enqueue(self, error: BotError) -> Self {
        self.with(|s| s.enqueue_error = Some(error))
    }

    pub fn playing(self, track: Track) -> Self {
        self.with(|s| s.playing = Some(track))
    }

    pub fn with_upcoming(self, tracks: Vec<Track>) -> Self {
        self.with(|s| s.upcoming = tracks)
    }

    pub fn with_volume(self, percent: u8) -> Self {
        self.with(|s| s.volume = Some(percent))
    }

    pub fn queued(&self) -> Vec<String> {
        self.state.lock().unwrap().queued.clone()
    }

    pub fn searches(&self) -> Vec<String> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn skip_count(&self) -> usize {
        self.state.lock().unwrap().skips
    }

    pub fn current_volume(&self) -> Option<u8> {
        self.state.lock().unwrap().volume
    }
}

#[async_trait]
impl MusicService for FakeMusic {
    async fn search_first_track(&self, encoded_query: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.searches.push(encoded_query.to_string());
        Ok(state.search_results.get(encoded_query).cloned())
    }

    async fn track(&self, track_id: &str) -> Result<Track> {
        self.state
            .lock()
            .unwrap()
            .tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| BotError::Validation(format!("HTTP 404: no track {}", track_id)))
    }

    async fn add_to_queue(&self, track_uri: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = &state.enqueue_error {
            return Err(error.clone());
        }
        state.queued.push(track_uri.to_string());
        Ok(())
    }

    async fn skip_to_next(&self) -> Result<()> {
        self.state.lock().unwrap().skips += 1;
        Ok(())
    }

    async fn currently_playing(&self) -> Result<Option<Track>> {
        Ok(self.state.lock().unwrap().playing.clone())
    }

    async fn queue(&self) -> Result<PlayerQueue> {
        let state = self.state.lock().unwrap();
        Ok(PlayerQueue {
            currently_playing: state.playing.clone(),
            queue: state.upcoming.clone(),
        })
    }

    async fn volume(&self) -> Result<Option<u8>> {
        Ok(self.state.lock().unwrap().volume)
    }

    async fn set_volume(&self, percent: u8) -> Result<()> {
        self.state.lock().unwrap().volume = Some(percent);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeChat {
    sent: Mutex<Vec<String>>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatSink for FakeChat {
    async fn say(&self, message: &str) -> Result<()> {
        self.sent.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

pub struct FakeClips;

#[async_trait]
impl ClipService for FakeClips {
    async fn create_clip(&self) -> Result<String> {
        Ok("clip-1".to_string())
    }
}

/// One pending redemption; every patch attempt is recorded
pub struct FakeRedemptions {
    pending: Option<Redemption>,
    fail_patch: bool,
    list_calls: AtomicUsize,
    patches: Mutex<Vec<(String, String, RedemptionStatus)>>,
}

impl FakeRedemptions {
    pub fn with_pending(id: &str, redeemed_at: DateTime<Utc>) -> Self {
        Self {
            pending: Some(Redemption {
                id: id.to_string(),
                status: RedemptionStatus::Unfulfilled,
                redeemed_at,
                user_login: "viewer".to_string(),
                user_input: String::new(),
            }),
            ..Self::empty()
        }
    }

    pub fn empty() -> Self {
        Self {
            pending: None,
            fail_patch: false,
            list_calls: AtomicUsize::new(0),
            patches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_patch(mut self) -> Self {
        self.fail_patch = true;
        self
    }

    pub fn patches(&self) -> Vec<(String, String, RedemptionStatus)> {
        self.patches.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RedemptionApi for FakeRedemptions {
    async fn newest_unfulfilled(&self, _reward_id: &str) -> Result<Option<Redemption>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.pending.clone())
    }

    async fn update_status(
        &self,
        redemption_id: &str,
        reward_id: &str,
        status: RedemptionStatus,
    ) -> Result<()> {
        self.patches.lock().unwrap().push((
            redemption_id.to_string(),
            reward_id.to_string(),
            status,
        ));
        if self.fail_patch {
            return Err(BotError::HttpError("HTTP 500: patch failed".to_string()));
        }
        Ok(())
    }
}

fn capitalize(login: &str) -> String {
    let mut chars = login.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub fn chat_message(login: &str, text: &str, badges: &[&str]) -> ChatMessageEvent {
    ChatMessageEvent {
        broadcaster_user_id: "1".to_string(),
        broadcaster_user_login: "streamer".to_string(),
        chatter_user_id: "2".to_string(),
        chatter_user_login: login.to_string(),
        chatter_user_name: capitalize(login),
        message_id: "m1".to_string(),
        message: Message {
            text: text.to_string(),
        },
        badges: badges.iter().map(|b| Badge::new(b)).collect(),
        channel_points_custom_reward_id: None,
    }
}

pub fn redemption_event(reward_id: &str, input: &str) -> RedemptionAddEvent {
    RedemptionAddEvent {
        id: "redemption-1".to_string(),
        broadcaster_user_id: "1".to_string(),
        user_id: "2".to_string(),
        user_login: "viewer".to_string(),
        user_name: "Viewer".to_string(),
        user_input: input.to_string(),
        status: "unfulfilled".to_string(),
        reward: RewardInfo {
            id: reward_id.to_string(),
            title: "Song Request".to_string(),
            cost: 500,
        },
        redeemed_at: Utc::now(),
    }
}
