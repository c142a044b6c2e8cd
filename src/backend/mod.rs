pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod spotify;
pub mod twitch;

#[cfg(test)]
pub mod test_support;
