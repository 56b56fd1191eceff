pub mod chat;
pub mod document;
pub mod generation;
pub mod retrieval;
