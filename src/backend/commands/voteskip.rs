use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};

use crate::backend::spotify::MusicService;
use crate::backend::twitch::ChatSink;

/// What a single vote did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// Voter already counted in this round
    Duplicate,
    /// Vote counted, tally below the threshold
    Counted(usize),
    /// Threshold reached and the skip was issued
    Skipped,
}

#[derive(Default)]
struct VoteState {
    voters: HashSet<String>,
    timer: Option<(JoinHandle<()>, Instant)>,
    /// Bumped whenever the timer is replaced or the round ends
    round: u64,
}

impl VoteState {
    fn cancel_timer(&mut self) {
        if let Some((handle, _)) = self.timer.take() {
            handle.abort();
        }
        self.round += 1;
    }
}

struct Inner {
    music: Arc<dyn MusicService>,
    chat: Arc<dyn ChatSink>,
    threshold: usize,
    window: Duration,
    state: Mutex<VoteState>,
}

/// Collects distinct voters toward skipping the current track.
///
/// Every new vote restarts the timeout; when it fires the round is dropped
/// without skipping. There is never more than one pending timeout.
#[derive(Clone)]
pub struct VoteSkip {
    inner: Arc<Inner>,
}

impl VoteSkip {
    pub fn new(
        music: Arc<dyn MusicService>,
        chat: Arc<dyn ChatSink>,
        threshold: usize,
        window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                music,
                chat,
                threshold: threshold.max(1),
                window,
                state: Mutex::new(VoteState::default()),
            }),
        }
    }

    pub async fn add_vote(&self, user_login: &str, display_name: &str) -> VoteOutcome {
        let inner = &self.inner;
        let tally = {
            let mut state = inner.state.lock().await;
            if !state.voters.insert(user_login.to_string()) {
                return VoteOutcome::Duplicate;
            }

            let tally = state.voters.len();
            state.cancel_timer();
            if tally >= inner.threshold {
                state.voters.clear();
            } else {
                let round = state.round;
                let deadline = Instant::now() + inner.window;
                let handle = tokio::spawn(self.clone().expire(round, deadline));
                state.timer = Some((handle, deadline));
            }
            tally
        };

        self.say(&format!(
            "{} voted to skip the current song ({}/{})!",
            display_name, tally, inner.threshold
        ))
        .await;
        if tally < inner.threshold {
            return VoteOutcome::Counted(tally);
        }
        self.skip().await;
        VoteOutcome::Skipped
    }

    /// Drop every vote and the pending timeout
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        state.voters.clear();
        state.cancel_timer();
    }

    pub async fn size(&self) -> usize {
        self.inner.state.lock().await.voters.len()
    }

    /// When the pending timeout fires, if one is armed
    pub async fn pending_deadline(&self) -> Option<Instant> {
        self.inner.state.lock().await.timer.as_ref().map(|(_, deadline)| *deadline)
    }

    async fn expire(self, round: u64, deadline: Instant) {
        tokio::time::sleep_until(deadline).await;
        {
            let mut state = self.inner.state.lock().await;
            // A newer vote or a completed skip replaced this timer
            if state.round != round {
                return;
            }
            state.voters.clear();
            state.timer = None;
            state.round += 1;
        }
        log::info!("Vote skip timed out");
        self.say("Voteskip has timed out... No song will be skipped at this time!")
            .await;
    }

    async fn skip(&self) {
        let threshold = self.inner.threshold;
        let title = match self.inner.music.currently_playing().await {
            Ok(Some(track)) => track.display_title(),
            Ok(None) => "the current song".to_string(),
            Err(e) => {
                log::warn!("Could not read the current track before skipping: {}", e);
                "the current song".to_string()
            }
        };

        self.say(&format!("Chat has skipped {} ({}/{})!", title, threshold, threshold))
            .await;
        if let Err(e) = self.inner.music.skip_to_next().await {
            log::error!("Vote skip failed: {}", e);
        }
    }

    async fn say(&self, message: &str) {
        if let Err(e) = self.inner.chat.say(message).await {
            log::error!("Failed to send vote skip message: {}", e);
        }
    }
}
