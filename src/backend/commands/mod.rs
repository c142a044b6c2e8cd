mod context;
mod dispatcher;
mod eligibility;
mod parser;
mod player;
mod queue;
mod redemption;
mod resolver;
mod voteskip;

pub use context::CommandContext;
pub use dispatcher::{CommandDispatcher, DispatchServices};
pub use eligibility::{is_eligible, resolve_roles, Role};
pub use parser::CommandParser;
pub use player::PlayerCommands;
pub use queue::{CooldownTracker, QueueRules, QueueSubmitter, Requester, SubmitOutcome};
pub use redemption::RedemptionSettler;
pub use resolver::SongResolver;
pub use voteskip::{VoteOutcome, VoteSkip};
