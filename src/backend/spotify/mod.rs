mod api;
mod auth;
mod models;

pub use api::{MusicService, SpotifyApi};
pub use auth::SpotifyOAuth;
pub use models::{Artist, ExternalUrls, PlayerQueue, Track};
