use serde::Deserialize;

use crate::backend::twitch::Badge;

/// Chat role a command can be restricted to.
///
/// Roles are evaluated independently: a moderator who is also subscribed
/// holds both `Mod` and `Sub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Streamer,
    Mod,
    Vip,
    Sub,
    Everyone,
}

/// Roles held by a chatter, derived from badges and the channel owner
pub fn resolve_roles(channel_login: &str, user_login: &str, badges: &[Badge]) -> Vec<Role> {
    let has = |set_id: &str| badges.iter().any(|b| b.set_id == set_id);

    let mut roles = Vec::new();
    if has("broadcaster") || user_login.eq_ignore_ascii_case(channel_login) {
        roles.push(Role::Streamer);
    }
    if has("moderator") {
        roles.push(Role::Mod);
    }
    if has("vip") {
        roles.push(Role::Vip);
    }
    if has("subscriber") || has("founder") {
        roles.push(Role::Sub);
    }
    roles
}

/// True iff `allowed` contains `Everyone` or shares a role with the chatter
pub fn is_eligible(channel_login: &str, user_login: &str, badges: &[Badge], allowed: &[Role]) -> bool {
    if allowed.contains(&Role::Everyone) {
        return true;
    }
    resolve_roles(channel_login, user_login, badges)
        .iter()
        .any(|role| allowed.contains(role))
}
