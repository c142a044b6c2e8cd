use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use super::eligibility::{resolve_roles, Role};
use crate::backend::error::BotError;
use crate::backend::spotify::{MusicService, Track};
use crate::backend::twitch::Badge;

pub const SPOTIFY_DECLINED_MESSAGE: &str =
    "It looks like Spotify doesn't want you to use it for some reason. Check the console for details.";

/// Viewer asking for a song
#[derive(Debug, Clone)]
pub struct Requester {
    pub login: String,
    pub display_name: String,
    pub badges: Vec<Badge>,
}

/// Result of one submission, `message` is always shown in chat
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub ok: bool,
    pub message: String,
}

impl SubmitOutcome {
    fn rejected(message: String) -> Self {
        Self { ok: false, message }
    }
}

/// Per-viewer request cooldown
pub struct CooldownTracker {
    window: Duration,
    expiries: Mutex<HashMap<String, Instant>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            expiries: Mutex::new(HashMap::new()),
        }
    }

    /// Check and start in one step. Returns false when `user` is still cooling down.
    pub async fn try_start(&self, user: &str) -> bool {
        let mut expiries = self.expiries.lock().await;
        let now = Instant::now();
        expiries.retain(|_, expiry| *expiry > now);
        if expiries.contains_key(user) {
            return false;
        }
        expiries.insert(user.to_string(), now + self.window);
        true
    }
}

/// Settings the submitter reads from the channel configuration
#[derive(Debug, Clone)]
pub struct QueueRules {
    pub channel_login: String,
    pub max_duration_secs: u64,
    pub exempt_roles: Vec<Role>,
    pub templates: Vec<String>,
    pub song_not_found: String,
}

/// Enforces the duration cap and cooldown, then enqueues a resolved track
pub struct QueueSubmitter {
    music: Arc<dyn MusicService>,
    rules: QueueRules,
    cooldown: Option<CooldownTracker>,
}

impl QueueSubmitter {
    pub fn new(music: Arc<dyn MusicService>, rules: QueueRules, cooldown: Option<CooldownTracker>) -> Self {
        Self {
            music,
            rules,
            cooldown,
        }
    }

    pub async fn submit(&self, track_id: &str, requester: &Requester) -> SubmitOutcome {
        // The window starts now, whatever the lookup or enqueue outcome
        if let Some(cooldown) = &self.cooldown {
            if !cooldown.try_start(&requester.login).await {
                return SubmitOutcome::rejected(format!(
                    "{}, Please wait before requesting another song.",
                    requester.display_name
                ));
            }
        }

        let track = match self.music.track(track_id).await {
            Ok(track) => track,
            Err(e) => return self.failure(e, requester),
        };

        if track.exceeds(self.rules.max_duration_secs) && !self.is_exempt(requester) {
            return SubmitOutcome::rejected(format!(
                "{} is too long. The max duration is {} seconds",
                track.name, self.rules.max_duration_secs
            ));
        }

        match self.music.add_to_queue(&track.uri).await {
            Ok(()) => {
                log::info!(
                    "Queued '{}' by {} for {}",
                    track.name,
                    track.artist_names(),
                    requester.login
                );
                SubmitOutcome {
                    ok: true,
                    message: self.confirmation(&track, requester),
                }
            }
            Err(e) => self.failure(e, requester),
        }
    }

    fn is_exempt(&self, requester: &Requester) -> bool {
        resolve_roles(&self.rules.channel_login, &requester.login, &requester.badges)
            .iter()
            .any(|role| self.rules.exempt_roles.contains(role))
    }

    fn confirmation(&self, track: &Track, requester: &Requester) -> String {
        let templates = &self.rules.templates;
        let template = match templates.len() {
            0 => return format!("{} was added to the queue!", track.name),
            1 => &templates[0],
            n => &templates[rand::rng().random_range(0..n)],
        };
        template
            .replace("$(username)", &requester.display_name)
            .replace("$(trackName)", &track.name)
            .replace("$(artists)", &track.artist_names())
    }

    fn failure(&self, error: BotError, requester: &Requester) -> SubmitOutcome {
        let message = match &error {
            BotError::Forbidden(_) => SPOTIFY_DECLINED_MESSAGE.to_string(),
            BotError::Validation(_) => self.rules.song_not_found.clone(),
            BotError::Unavailable(_) => {
                format!("{}, song requests are unavailable right now.", requester.display_name)
            }
            _ => format!(
                "{}, something went wrong while adding your song.",
                requester.display_name
            ),
        };
        log::error!("Song request from {} failed: {}", requester.login, error);
        SubmitOutcome::rejected(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{track, FakeMusic};

    fn rules() -> QueueRules {
        QueueRules {
            channel_login: "streamer".to_string(),
            max_duration_secs: 300,
            exempt_roles: vec![Role::Streamer, Role::Mod],
            templates: vec!["$(username) queued $(trackName) by $(artists)".to_string()],
            song_not_found: "not found".to_string(),
        }
    }

    fn viewer(badges: &[&str]) -> Requester {
        Requester {
            login: "viewer".to_string(),
            display_name: "Viewer".to_string(),
            badges: badges.iter().map(|b| Badge::new(b)).collect(),
        }
    }

    #[tokio::test]
    async fn test_successful_submission_uses_template() {
        let music = Arc::new(FakeMusic::new().with_track(track("t1", "Song", 200)));
        let submitter = QueueSubmitter::new(music.clone(), rules(), None);

        let outcome = submitter.submit("t1", &viewer(&[])).await;

        assert!(outcome.ok);
        assert_eq!(outcome.message, "Viewer queued Song by Artist A, Artist B");
        assert_eq!(music.queued(), vec!["spotify:track:t1".to_string()]);
    }

    #[tokio::test]
    async fn test_too_long_track_is_rejected_without_enqueue() {
        let music = Arc::new(FakeMusic::new().with_track(track("long", "Epic", 400)));
        let submitter = QueueSubmitter::new(music.clone(), rules(), None);

        let outcome = submitter.submit("long", &viewer(&["subscriber"])).await;

        assert!(!outcome.ok);
        assert_eq!(outcome.message, "Epic is too long. The max duration is 300 seconds");
        assert!(music.queued().is_empty());
    }

    #[tokio::test]
    async fn test_exempt_role_bypasses_duration_cap() {
        let music = Arc::new(FakeMusic::new().with_track(track("long", "Epic", 400)));
        let submitter = QueueSubmitter::new(music.clone(), rules(), None);

        let outcome = submitter.submit("long", &viewer(&["moderator"])).await;

        assert!(outcome.ok);
        assert_eq!(music.queued().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_starts_even_when_submission_fails() {
        let music = Arc::new(
            FakeMusic::new()
                .with_track(track("t1", "Song", 200))
                .failing_enqueue(BotError::HttpError("HTTP 502".to_string())),
        );
        let cooldown = CooldownTracker::new(Duration::from_secs(30));
        let submitter = QueueSubmitter::new(music.clone(), rules(), Some(cooldown));

        let first = submitter.submit("t1", &viewer(&[])).await;
        assert!(!first.ok);
        assert_eq!(first.message, "Viewer, something went wrong while adding your song.");

        let second = submitter.submit("t1", &viewer(&[])).await;
        assert_eq!(second.message, "Viewer, Please wait before requesting another song.");

        tokio::time::advance(Duration::from_secs(31)).await;
        let third = submitter.submit("t1", &viewer(&[])).await;
        assert_ne!(third.message, second.message);
    }

    #[tokio::test]
    async fn test_remote_failures_map_to_messages() {
        let forbidden = Arc::new(
            FakeMusic::new()
                .with_track(track("t1", "Song", 200))
                .failing_enqueue(BotError::Forbidden("HTTP 403".to_string())),
        );
        let outcome = QueueSubmitter::new(forbidden, rules(), None)
            .submit("t1", &viewer(&[]))
            .await;
        assert_eq!(outcome.message, SPOTIFY_DECLINED_MESSAGE);

        // Unknown track id
        let empty = Arc::new(FakeMusic::new());
        let outcome = QueueSubmitter::new(empty, rules(), None)
            .submit("missing", &viewer(&[]))
            .await;
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "not found");
    }

    #[tokio::test]
    async fn test_partial_second_over_cap_is_rejected() {
        let mut almost = track("t", "Almost", 300);
        almost.duration_ms = 300_900;
        let music = Arc::new(FakeMusic::new().with_track(almost));
        let submitter = QueueSubmitter::new(music.clone(), rules(), None);

        let outcome = submitter.submit("t", &viewer(&[])).await;

        assert!(!outcome.ok);
        assert_eq!(outcome.message, "Almost is too long. The max duration is 300 seconds");
        assert!(music.queued().is_empty());
    }

    #[tokio::test]
    async fn test_track_exactly_at_cap_is_queued() {
        let music = Arc::new(FakeMusic::new().with_track(track("t", "Exact", 300)));
        let submitter = QueueSubmitter::new(music.clone(), rules(), None);

        assert!(submitter.submit("t", &viewer(&[])).await.ok);
        assert_eq!(music.queued().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_lookup_still_starts_cooldown() {
        let music = Arc::new(FakeMusic::new().with_track(track("t1", "Song", 200)));
        let cooldown = CooldownTracker::new(Duration::from_secs(30));
        let submitter = QueueSubmitter::new(music.clone(), rules(), Some(cooldown));

        let first = submitter.submit("missing", &viewer(&[])).await;
        assert_eq!(first.message, "not found");

        let second = submitter.submit("t1", &viewer(&[])).await;
        assert_eq!(second.message, "Viewer, Please wait before requesting another song.");
        assert!(music.queued().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_tracker_expires() {
        let tracker = CooldownTracker::new(Duration::from_secs(10));
        assert!(tracker.try_start("a").await);
        assert!(!tracker.try_start("a").await);
        assert!(tracker.try_start("b").await);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(tracker.try_start("a").await);
        assert!(!tracker.try_start("a").await);
    }
}
