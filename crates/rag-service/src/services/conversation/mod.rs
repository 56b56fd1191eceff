pub mod context_builder;
pub mod manager;

pub use manager::{ChatController, ChatTurnRequest, ChatTurnResponse, ContextUsed};
