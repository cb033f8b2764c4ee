//! The conversation flow engine — turn handling and state transitions.

mod input;
mod transitioner;

pub use input::TurnInput;
pub use transitioner::{TurnEngine, TurnReply};
