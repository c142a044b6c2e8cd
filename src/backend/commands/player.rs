use std::sync::Arc;

use crate::backend::spotify::MusicService;

const NOTHING_PLAYING: &str = "Seems like no music is playing right now";

/// Chat replies for the built-in playback commands
pub struct PlayerCommands {
    music: Arc<dyn MusicService>,
    queue_depth: usize,
}

impl PlayerCommands {
    pub fn new(music: Arc<dyn MusicService>, queue_depth: usize) -> Self {
        Self { music, queue_depth }
    }

    pub async fn current_volume(&self, name: &str) -> String {
        match self.music.volume().await {
            Ok(Some(volume)) => format!("{}, the current volume is {}!", name, volume),
            Ok(None) => NOTHING_PLAYING.to_string(),
            Err(e) => {
                log::error!("Failed to read volume: {}", e);
                "There was a problem getting the volume".to_string()
            }
        }
    }

    /// Non-numeric input is rejected, numbers are clamped to 0..=100
    pub async fn set_volume(&self, name: &str, argument: &str) -> String {
        let requested: i64 = match argument.trim().parse() {
            Ok(value) => value,
            Err(_) => return format!("{}, a number between 0 and 100 is required.", name),
        };
        let volume = requested.clamp(0, 100) as u8;

        match self.music.set_volume(volume).await {
            Ok(()) => format!("{} has set the current volume to {}!", name, volume),
            Err(e) => {
                log::error!("Failed to set volume to {}: {}", volume, e);
                "There was a problem setting the volume".to_string()
            }
        }
    }

    pub async fn skip(&self, name: &str) -> String {
        let title = match self.music.currently_playing().await {
            Ok(Some(track)) => track.display_title(),
            Ok(None) => return NOTHING_PLAYING.to_string(),
            Err(e) => {
                log::error!("Failed to read the current track: {}", e);
                return NOTHING_PLAYING.to_string();
            }
        };

        match self.music.skip_to_next().await {
            Ok(()) => format!("{} skipped {}!", name, title),
            Err(e) => {
                log::error!("Skip failed: {}", e);
                "There was a problem skipping the song".to_string()
            }
        }
    }

    pub async fn track_name(&self) -> String {
        match self.music.currently_playing().await {
            Ok(Some(track)) => format!(
                "▶️ {} - {} -> {}",
                track.artist_names(),
                track.name,
                track.external_urls.spotify.as_deref().unwrap_or(&track.uri)
            ),
            Ok(None) => NOTHING_PLAYING.to_string(),
            Err(e) => {
                log::error!("Failed to read the current track: {}", e);
                NOTHING_PLAYING.to_string()
            }
        }
    }

    pub async fn upcoming(&self) -> String {
        let queue = match self.music.queue().await {
            Ok(queue) => queue,
            Err(e) => {
                log::error!("Failed to read the queue: {}", e);
                return NOTHING_PLAYING.to_string();
            }
        };

        let upcoming: Vec<String> = queue
            .queue
            .iter()
            .take(self.queue_depth)
            .enumerate()
            .map(|(i, track)| format!("• {}) {} - {}", i + 1, track.artist_names(), track.name))
            .collect();

        if upcoming.is_empty() {
            return "Nothing in the queue.".to_string();
        }
        format!("▶️ Next {} songs: {}", upcoming.len(), upcoming.join(" "))
    }
}
