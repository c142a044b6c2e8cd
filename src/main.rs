use crate::backend::auth::{CredentialManager, TokenStore};
use crate::backend::commands::{CommandDispatcher, DispatchServices, RedemptionSettler};
use crate::backend::config::{AppConfig, ClientCredentials, UsageType};
use crate::backend::error::Result;
use crate::backend::spotify::{SpotifyApi, SpotifyOAuth};
use crate::backend::twitch::{
    TwitchApi, TwitchChannel, TwitchClient, TwitchOAuth, REDEMPTION_SCOPE,
};
use log::{error, info};
use std::sync::Arc;
use tokio::time::Duration;

pub mod backend;
mod handlers;

const VALIDATION_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    if let Err(e) = run().await {
        error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = backend::config::load_config()?;
    info!("Starting song requests for #{}", config.channel_login());

    let twitch_credentials = ClientCredentials::from_env("TWITCH_CLIENT_ID", "TWITCH_CLIENT_SECRET")?;
    let client_id = twitch_credentials.client_id.clone();
    let required_scopes = if config.uses(UsageType::ChannelPoints) {
        vec![REDEMPTION_SCOPE.to_string()]
    } else {
        Vec::new()
    };
    let twitch_credential = CredentialManager::with_required_scopes(
        Arc::new(TwitchOAuth::new(twitch_credentials)),
        TokenStore::new(config.twitch_token_file.clone()),
        config.twitch_callback_port,
        required_scopes,
    );
    twitch_credential.acquire().await?;
    twitch_credential.spawn_periodic_validation(VALIDATION_INTERVAL);

    let spotify_credential = spotify_credential(&config);

    let twitch_api = Arc::new(TwitchApi::new(client_id, twitch_credential.clone()));
    let mut client = TwitchClient::new(twitch_api, config.channel_login());
    let (tx, rx) = tokio::sync::mpsc::channel(100);
    let channel = Arc::new(client.connect(tx).await?);

    let settler = redemption_reward_id(&config, &channel)
        .await
        .map(|reward_id| RedemptionSettler::new(channel.clone(), twitch_credential.clone(), reward_id));

    let dispatcher = CommandDispatcher::new(
        &config,
        DispatchServices {
            music: Arc::new(SpotifyApi::new(spotify_credential)),
            chat: channel.clone(),
            clips: channel.clone(),
            settler,
        },
    )?;

    info!("Chatbot ready");
    handlers::handle_twitch_messages(rx, Arc::new(dispatcher)).await;
    client.disconnect();
    Ok(())
}

/// Playback stays disabled until this credential authenticates, which
/// happens in the background so chat commands work meanwhile.
fn spotify_credential(config: &AppConfig) -> CredentialManager {
    let credentials = match ClientCredentials::from_env("SPOTIFY_CLIENT_ID", "SPOTIFY_CLIENT_SECRET") {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            error!("Spotify playback disabled: {}", e);
            None
        }
    };

    let credential = CredentialManager::new(
        Arc::new(SpotifyOAuth::new(credentials.clone().unwrap_or(ClientCredentials {
            client_id: String::new(),
            client_secret: String::new(),
        }))),
        TokenStore::new(config.spotify_token_file.clone()),
        config.spotify_callback_port,
    );

    if credentials.is_some() {
        let acquiring = credential.clone();
        tokio::spawn(async move {
            if let Err(e) = acquiring.acquire().await {
                error!("Spotify authorization failed, playback disabled: {}", e);
            }
        });
    }
    credential
}

/// Reward whose redemptions are song requests, if channel points are in use
async fn redemption_reward_id(config: &AppConfig, channel: &TwitchChannel) -> Option<String> {
    if !config.uses(UsageType::ChannelPoints) {
        return None;
    }
    if let Some(id) = &config.custom_reward_id {
        return Some(id.clone());
    }

    match channel
        .ensure_reward(&config.custom_reward_name, config.custom_reward_cost)
        .await
    {
        Ok(reward) => Some(reward.id),
        Err(e) => {
            error!("Channel point requests disabled, no usable reward: {}", e);
            None
        }
    }
}
