//! Game state, transitions and timeout rules.

mod machine;
mod timeout;
mod types;

pub use machine::GameError;
pub use timeout::TimeoutPolicy;
pub use types::{AccountId, Choice, CompletedGame, EndReason, Game, Outcome, Phase, Slot};
