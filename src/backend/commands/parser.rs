use super::context::CommandContext;
use crate::backend::twitch::ChatMessageEvent;

/// Extracts the command token from chat messages
#[derive(Debug, Default)]
pub struct CommandParser;

impl CommandParser {
    /// Split on whitespace; the first token is the command, lowercased
    pub fn parse(message: ChatMessageEvent) -> Option<CommandContext> {
        let mut parts = message.message.text.split_whitespace();
        let command_name = parts.next()?.to_lowercase();
        let args = parts.map(str::to_string).collect();

        Some(CommandContext::new(message, command_name, args))
    }
}
