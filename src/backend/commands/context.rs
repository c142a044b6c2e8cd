use super::queue::Requester;
use crate::backend::twitch::{Badge, ChatMessageEvent};

/// A chat message split into a command token and its arguments
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// The chat message that triggered the command
    pub message: ChatMessageEvent,
    /// First token, lowercased, prefix included (e.g. "!sr")
    pub command_name: String,
    /// Remaining whitespace-separated tokens, case preserved
    pub args: Vec<String>,
}

impl CommandContext {
    pub fn new(message: ChatMessageEvent, command_name: String, args: Vec<String>) -> Self {
        Self {
            message,
            command_name,
            args,
        }
    }

    pub fn username(&self) -> &str {
        &self.message.chatter_user_login
    }

    pub fn display_name(&self) -> &str {
        &self.message.chatter_user_name
    }

    pub fn badges(&self) -> &[Badge] {
        &self.message.badges
    }

    pub fn message_text(&self) -> &str {
        &self.message.message.text
    }

    pub fn first_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }

    pub fn requester(&self) -> Requester {
        Requester {
            login: self.username().to_string(),
            display_name: self.display_name().to_string(),
            badges: self.badges().to_vec(),
        }
    }
}
