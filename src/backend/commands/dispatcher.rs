use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Duration;

use super::context::CommandContext;
use super::eligibility::{is_eligible, Role};
use super::parser::CommandParser;
use super::player::PlayerCommands;
use super::queue::{CooldownTracker, QueueRules, QueueSubmitter, Requester, SPOTIFY_DECLINED_MESSAGE};
use super::redemption::RedemptionSettler;
use super::resolver::SongResolver;
use super::voteskip::VoteSkip;
use crate::backend::config::{AppConfig, UsageType};
use crate::backend::error::{BotError, Result};
use crate::backend::spotify::MusicService;
use crate::backend::twitch::{
    ChatMessageEvent, ChatSink, CheerEvent, ClipService, RedemptionAddEvent, TwitchEvent,
};

const CLIP_URL: &str = "https://clips.twitch.tv";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Volume,
    Skip,
    TrackName,
    Queue,
    VoteSkip,
    Clip,
}

#[derive(Debug, Clone)]
struct BuiltinEntry {
    action: Builtin,
    allowed: Vec<Role>,
}

/// Remote collaborators the dispatcher drives
pub struct DispatchServices {
    pub music: Arc<dyn MusicService>,
    pub chat: Arc<dyn ChatSink>,
    pub clips: Arc<dyn ClipService>,
    /// Absent when channel-point requests are disabled or no reward exists
    pub settler: Option<RedemptionSettler>,
}

/// Routes chat messages and redemptions to the command handlers.
///
/// Every handler reports its own failures to chat or the log; nothing
/// here returns an error to the event loop.
pub struct CommandDispatcher {
    channel_login: String,
    bot_login: String,
    requests_by_command: bool,
    requests_by_reward: bool,
    request_aliases: Vec<String>,
    request_roles: Vec<Role>,
    song_not_found: String,
    builtins: HashMap<String, BuiltinEntry>,
    resolver: SongResolver,
    submitter: QueueSubmitter,
    player: PlayerCommands,
    votes: VoteSkip,
    chat: Arc<dyn ChatSink>,
    clips: Arc<dyn ClipService>,
    settler: Option<RedemptionSettler>,
}

impl CommandDispatcher {
    pub fn new(config: &AppConfig, services: DispatchServices) -> Result<Self> {
        let DispatchServices {
            music,
            chat,
            clips,
            settler,
        } = services;

        let request_aliases: Vec<String> = config
            .command_alias
            .iter()
            .map(|alias| alias.to_lowercase())
            .collect();
        let resolver = SongResolver::new(music.clone(), &request_aliases, &config.blocked_tracks)?;

        let cooldown = config
            .use_cooldown
            .then(|| CooldownTracker::new(Duration::from_secs(config.cooldown_duration)));
        let submitter = QueueSubmitter::new(
            music.clone(),
            QueueRules {
                channel_login: config.channel_login(),
                max_duration_secs: config.max_duration,
                exempt_roles: config.ignore_max_length.clone(),
                templates: config.added_to_queue_messages.clone(),
                song_not_found: config.song_not_found.clone(),
            },
            cooldown,
        );

        let votes = VoteSkip::new(
            music.clone(),
            chat.clone(),
            config.required_vote_skip,
            Duration::from_secs(config.voteskip_timeout),
        );

        Ok(Self {
            channel_login: config.channel_login(),
            bot_login: config.user_name.to_lowercase(),
            requests_by_command: config.uses(UsageType::Command),
            requests_by_reward: config.uses(UsageType::ChannelPoints),
            request_aliases,
            request_roles: config.command_user_level.clone(),
            song_not_found: config.song_not_found.clone(),
            builtins: builtin_table(config),
            resolver,
            submitter,
            player: PlayerCommands::new(music, config.queue_display_depth),
            votes,
            chat,
            clips,
            settler,
        })
    }

    pub async fn handle_event(&self, event: TwitchEvent) {
        match event {
            TwitchEvent::ChatMessage(message) => self.dispatch(message).await,
            TwitchEvent::RedemptionAdd(redemption) => self.handle_redemption(redemption).await,
            TwitchEvent::Cheer(cheer) => self.handle_cheer(&cheer),
        }
    }

    /// Run at most one handler for a chat message; unknown commands are ignored.
    pub async fn dispatch(&self, message: ChatMessageEvent) {
        if message.chatter_user_login.eq_ignore_ascii_case(&self.bot_login) {
            return;
        }
        let Some(context) = CommandParser::parse(message) else {
            return;
        };

        if self.requests_by_command
            && self.request_aliases.contains(&context.command_name)
            && self.eligible(&context, &self.request_roles)
        {
            self.command_song_request(&context).await;
            return;
        }

        let Some(entry) = self.builtins.get(&context.command_name) else {
            return;
        };
        if !self.eligible(&context, &entry.allowed) {
            log::debug!(
                "{} is not allowed to use {}",
                context.username(),
                context.command_name
            );
            return;
        }

        log::info!("{} used {}", context.username(), context.command_name);
        let name = context.display_name();
        let reply = match entry.action {
            Builtin::Volume => match context.first_arg() {
                Some(argument) => self.player.set_volume(name, argument).await,
                None => self.player.current_volume(name).await,
            },
            Builtin::Skip => {
                let reply = self.player.skip(name).await;
                // Open votes targeted the track that was just skipped
                self.votes.clear().await;
                reply
            }
            Builtin::TrackName => self.player.track_name().await,
            Builtin::Queue => self.player.upcoming().await,
            Builtin::VoteSkip => {
                // Tally and outcome are announced by the aggregator
                self.votes.add_vote(context.username(), name).await;
                return;
            }
            Builtin::Clip => self.clip(name).await,
        };
        self.say(&reply).await;
    }

    /// Song request through the configured channel-point reward
    pub async fn handle_redemption(&self, redemption: RedemptionAddEvent) {
        if !self.requests_by_reward {
            return;
        }
        let Some(settler) = &self.settler else {
            return;
        };
        if redemption.reward.id != settler.reward_id() {
            return;
        }

        log::info!(
            "{} redeemed '{}': {}",
            redemption.user_login,
            redemption.reward.title,
            redemption.user_input
        );
        let requester = Requester {
            login: redemption.user_login.clone(),
            display_name: redemption.user_name.clone(),
            badges: Vec::new(),
        };

        let ok = self.request_song(&requester, &redemption.user_input).await;
        let settled = if ok {
            settler.fulfill().await
        } else {
            settler.refund().await
        };
        if settled {
            log::info!(
                "Redemption by {} {}",
                redemption.user_login,
                if ok { "fulfilled" } else { "refunded" }
            );
        } else {
            log::warn!("Redemption by {} was left unsettled", redemption.user_login);
        }
    }

    fn handle_cheer(&self, cheer: &CheerEvent) {
        let who = if cheer.is_anonymous {
            "An anonymous viewer"
        } else {
            cheer.user_login.as_deref().unwrap_or("Someone")
        };
        log::info!("{} cheered {} bits: {}", who, cheer.bits, cheer.message);
    }

    async fn command_song_request(&self, context: &CommandContext) {
        if context.args.is_empty() {
            self.say(&format!(
                "{}, usage: {} song-link (Spotify -> Share -> Copy Song Link)",
                context.display_name(),
                context.command_name
            ))
            .await;
            return;
        }
        self.request_song(&context.requester(), context.message_text())
            .await;
    }

    /// Resolve, submit and announce. Returns whether the track was queued.
    async fn request_song(&self, requester: &Requester, text: &str) -> bool {
        let outcome = match self.resolver.resolve(text).await {
            Ok(Some(track_id)) => self.submitter.submit(&track_id, requester).await,
            Ok(None) => {
                self.say(&self.song_not_found).await;
                return false;
            }
            Err(e) => {
                log::error!("Could not resolve '{}' for {}: {}", text, requester.login, e);
                let message = match e {
                    BotError::Forbidden(_) => SPOTIFY_DECLINED_MESSAGE.to_string(),
                    BotError::Validation(_) => self.song_not_found.clone(),
                    BotError::Unavailable(_) => format!(
                        "{}, song requests are unavailable right now.",
                        requester.display_name
                    ),
                    _ => format!(
                        "{}, something went wrong while looking up your song.",
                        requester.display_name
                    ),
                };
                self.say(&message).await;
                return false;
            }
        };

        self.say(&outcome.message).await;
        outcome.ok
    }

    async fn clip(&self, name: &str) -> String {
        match self.clips.create_clip().await {
            Ok(clip_id) => format!("{}/{}", CLIP_URL, clip_id),
            Err(e) => {
                log::error!("Failed to create clip for {}: {}", name, e);
                "There was a problem creating the clip".to_string()
            }
        }
    }

    fn eligible(&self, context: &CommandContext, allowed: &[Role]) -> bool {
        is_eligible(
            &self.channel_login,
            context.username(),
            context.badges(),
            allowed,
        )
    }

    async fn say(&self, message: &str) {
        if let Err(e) = self.chat.say(message).await {
            log::error!("Failed to send chat message: {}", e);
        }
    }
}

fn builtin_table(config: &AppConfig) -> HashMap<String, BuiltinEntry> {
    let everyone = vec![Role::Everyone];
    let mut entries = vec![
        ("!volume", Builtin::Volume, config.volume_set_level.clone()),
        (config.skip_alias.as_str(), Builtin::Skip, config.skip_user_level.clone()),
        ("!clip", Builtin::Clip, config.clip_user_level.clone()),
    ];
    if config.use_song_command {
        entries.push(("!song", Builtin::TrackName, everyone.clone()));
    }
    if config.use_queue_command {
        entries.push(("!queue", Builtin::Queue, everyone.clone()));
    }
    if config.allow_vote_skip {
        entries.push(("!voteskip", Builtin::VoteSkip, everyone));
    }

    entries
        .into_iter()
        .map(|(token, action, allowed)| (token.to_lowercase(), BuiltinEntry { action, allowed }))
        .collect()
}
