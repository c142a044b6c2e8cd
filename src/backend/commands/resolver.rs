use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

use crate::backend::error::{BotError, Result};
use crate::backend::spotify::MusicService;

const TRACK_URL_PATTERN: &str = r"https://open\.spotify\.com/(?:\S*/)?track/\S+";
const TRACK_URI_PATTERN: &str = r"spotify:track:\S+";
const TRACK_URL_PREFIX: &str = "https://open.spotify.com/track/";

/// Turns chat text into a playable track id.
///
/// Strategies run in order: share link, `spotify:track:` URI, then a
/// catalog search on the remaining text. Blocked ids resolve to `None`
/// whichever strategy produced them.
pub struct SongResolver {
    music: Arc<dyn MusicService>,
    aliases: Vec<String>,
    blocked: HashSet<String>,
    url_pattern: Regex,
    uri_pattern: Regex,
}

impl SongResolver {
    pub fn new(
        music: Arc<dyn MusicService>,
        aliases: &[String],
        blocked_tracks: &[String],
    ) -> Result<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| BotError::ConfigError(e.to_string()))
        };
        Ok(Self {
            music,
            aliases: aliases.iter().map(|a| a.to_lowercase()).collect(),
            blocked: blocked_tracks.iter().cloned().collect(),
            url_pattern: compile(TRACK_URL_PATTERN)?,
            uri_pattern: compile(TRACK_URI_PATTERN)?,
        })
    }

    /// Resolve `raw` to a track id, `None` when nothing usable was found.
    ///
    /// Search failures propagate; an expired Spotify token has already been
    /// refreshed and the search retried once by then.
    pub async fn resolve(&self, raw: &str) -> Result<Option<String>> {
        let candidate = match self.match_link(raw) {
            Some(id) => Some(id),
            None => self.search(raw).await?,
        };

        Ok(candidate.filter(|id| {
            let blocked = self.blocked.contains(id);
            if blocked {
                log::info!("Track {} is blocked", id);
            }
            !blocked
        }))
    }

    /// Share URL or URI, no network involved
    fn match_link(&self, raw: &str) -> Option<String> {
        if let Some(found) = self.url_pattern.find(raw) {
            return track_id_from_url(found.as_str());
        }
        let found = self.uri_pattern.find(raw)?;
        let id = found.as_str().split(':').nth(2)?;
        track_id_from_url(&format!("{}{}", TRACK_URL_PREFIX, id))
    }

    async fn search(&self, raw: &str) -> Result<Option<String>> {
        let query = self.normalize_query(raw);
        if query.is_empty() {
            return Ok(None);
        }
        log::debug!("Searching Spotify for '{}'", query);
        self.music
            .search_first_track(&urlencoding::encode(&query))
            .await
    }

    /// Drop command aliases, hyphens and the word "by"
    fn normalize_query(&self, raw: &str) -> String {
        raw.replace('-', " ")
            .split_whitespace()
            .filter(|word| {
                let word = word.to_lowercase();
                word != "by" && !self.aliases.contains(&word)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Last path segment of a track URL, without its query string
fn track_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let id = path.trim_end_matches('/').rsplit('/').next()?;
    if id.is_empty() {
        None
    } else {
        Some(id.to_string())
    }
}
