use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

/// Track object as returned by the catalog and player endpoints
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub uri: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub external_urls: ExternalUrls,
}

impl Track {
    /// Artist names joined for display, e.g. "Daft Punk, Pharrell Williams"
    pub fn artist_names(&self) -> String {
        self.artists
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// True when the track runs past `max_secs`, counting partial seconds
    pub fn exceeds(&self, max_secs: u64) -> bool {
        self.duration_ms > max_secs.saturating_mul(1000)
    }

    /// "Title – Artists", the form used in skip announcements
    pub fn display_title(&self) -> String {
        format!("{} – {}", self.name, self.artist_names())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentlyPlaying {
    pub item: Option<Track>,
}

/// Entries of the playback queue. Podcast episodes are skipped on parse.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayerQueue {
    #[serde(default, deserialize_with = "tracks_only_opt")]
    pub currently_playing: Option<Track>,
    #[serde(default, deserialize_with = "tracks_only")]
    pub queue: Vec<Track>,
}

fn tracks_only<'de, D>(deserializer: D) -> Result<Vec<Track>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let items: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

fn tracks_only_opt<'de, D>(deserializer: D) -> Result<Option<Track>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let item: Option<serde_json::Value> = Option::deserialize(deserializer)?;
    Ok(item.and_then(|item| serde_json::from_value(item).ok()))
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    pub volume_percent: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackState {
    pub device: Device,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub tracks: TrackPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackPage {
    pub items: Vec<Track>,
}
