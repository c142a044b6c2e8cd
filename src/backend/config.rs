use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::commands::Role;
use crate::backend::error::{BotError, Result};

const CONFIG_FILE_NAME: &str = "spotipack_config.toml";
const CONFIG_PATH_VAR: &str = "SPOTIPACK_CONFIG";

/// Ways a viewer can trigger a song request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    ChannelPoints,
    Command,
    Bits,
}

/// Channel configuration, read once at startup and never written back
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub channel_name: String,
    pub user_name: String,

    #[serde(default = "default_usage_types")]
    pub usage_types: Vec<UsageType>,
    #[serde(default = "default_command_alias")]
    pub command_alias: Vec<String>,
    #[serde(default = "default_skip_alias")]
    pub skip_alias: String,

    #[serde(default = "everyone")]
    pub command_user_level: Vec<Role>,
    #[serde(default = "moderators")]
    pub volume_set_level: Vec<Role>,
    #[serde(default = "moderators")]
    pub skip_user_level: Vec<Role>,
    #[serde(default = "everyone")]
    pub clip_user_level: Vec<Role>,
    #[serde(default = "moderators")]
    pub ignore_max_length: Vec<Role>,

    #[serde(default = "enabled")]
    pub use_song_command: bool,
    #[serde(default = "enabled")]
    pub use_queue_command: bool,
    #[serde(default = "enabled")]
    pub allow_vote_skip: bool,

    #[serde(default)]
    pub use_cooldown: bool,
    /// Seconds between two requests of the same viewer
    #[serde(default = "default_cooldown_duration")]
    pub cooldown_duration: u64,
    /// Longest accepted track, in seconds
    #[serde(default = "default_max_duration")]
    pub max_duration: u64,
    #[serde(default)]
    pub blocked_tracks: Vec<String>,

    #[serde(default = "default_required_vote_skip")]
    pub required_vote_skip: usize,
    /// Seconds a vote-skip round stays open after the latest vote
    #[serde(default = "default_voteskip_timeout")]
    pub voteskip_timeout: u64,

    #[serde(default = "default_reward_name")]
    pub custom_reward_name: String,
    #[serde(default = "default_reward_cost")]
    pub custom_reward_cost: u64,
    #[serde(default)]
    pub custom_reward_id: Option<String>,

    #[serde(default = "default_added_to_queue_messages")]
    pub added_to_queue_messages: Vec<String>,
    #[serde(default = "default_song_not_found")]
    pub song_not_found: String,
    #[serde(default = "default_queue_display_depth")]
    pub queue_display_depth: usize,

    #[serde(default = "default_twitch_callback_port")]
    pub twitch_callback_port: u16,
    #[serde(default = "default_spotify_callback_port")]
    pub spotify_callback_port: u16,
    #[serde(default = "default_twitch_token_file")]
    pub twitch_token_file: PathBuf,
    #[serde(default = "default_spotify_token_file")]
    pub spotify_token_file: PathBuf,
}

fn default_usage_types() -> Vec<UsageType> {
    vec![UsageType::Command, UsageType::ChannelPoints]
}

fn default_command_alias() -> Vec<String> {
    vec!["!songrequest".to_string(), "!sr".to_string()]
}

fn default_skip_alias() -> String {
    "!skip".to_string()
}

fn everyone() -> Vec<Role> {
    vec![Role::Everyone]
}

fn moderators() -> Vec<Role> {
    vec![Role::Streamer, Role::Mod]
}

fn enabled() -> bool {
    true
}

fn default_cooldown_duration() -> u64 {
    300
}

fn default_max_duration() -> u64 {
    600
}

fn default_required_vote_skip() -> usize {
    3
}

fn default_voteskip_timeout() -> u64 {
    60
}

fn default_reward_name() -> String {
    "Song Request".to_string()
}

fn default_reward_cost() -> u64 {
    1000
}

fn default_added_to_queue_messages() -> Vec<String> {
    vec!["$(username), $(trackName) by $(artists) was added to the queue!".to_string()]
}

fn default_song_not_found() -> String {
    "Sorry, that song could not be found.".to_string()
}

fn default_queue_display_depth() -> usize {
    5
}

fn default_twitch_callback_port() -> u16 {
    3000
}

fn default_spotify_callback_port() -> u16 {
    8888
}

fn default_twitch_token_file() -> PathBuf {
    PathBuf::from("twitch_token.json")
}

fn default_spotify_token_file() -> PathBuf {
    PathBuf::from("spotify_token.json")
}

impl AppConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            BotError::ConfigError(format!("Cannot read {:?}: {}", path.as_ref(), e))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| BotError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the bot cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.channel_name.trim().is_empty() {
            return Err(BotError::ConfigError("channel_name is empty".to_string()));
        }
        if self.user_name.trim().is_empty() {
            return Err(BotError::ConfigError("user_name is empty".to_string()));
        }
        if self.required_vote_skip == 0 {
            return Err(BotError::ConfigError(
                "required_vote_skip must be at least 1".to_string(),
            ));
        }
        if self.added_to_queue_messages.is_empty() {
            return Err(BotError::ConfigError(
                "added_to_queue_messages needs at least one template".to_string(),
            ));
        }
        Ok(())
    }

    pub fn uses(&self, usage: UsageType) -> bool {
        self.usage_types.contains(&usage)
    }

    /// Channel name without the IRC-style `#` prefix, lowercased
    pub fn channel_login(&self) -> String {
        self.channel_name.trim_start_matches('#').to_lowercase()
    }
}

/// Locate and parse the configuration file
pub fn load_config() -> Result<AppConfig> {
    AppConfig::from_file(config_path())
}

fn config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_VAR) {
        return PathBuf::from(path);
    }
    match project_root::get_project_root() {
        Ok(root) => root.join(CONFIG_FILE_NAME),
        Err(_) => PathBuf::from(CONFIG_FILE_NAME),
    }
}

/// OAuth application credentials of one remote service
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    /// Read a client id/secret pair from the process environment
    pub fn from_env(id_var: &str, secret_var: &str) -> Result<Self> {
        let client_id = env::var(id_var)
            .map_err(|_| BotError::ConfigError(format!("{} is not set", id_var)))?;
        let client_secret = env::var(secret_var)
            .map_err(|_| BotError::ConfigError(format!("{} is not set", secret_var)))?;
        Ok(Self {
            client_id,
            client_secret,
        })
    }
}
