pub mod chat;
pub mod documents;
pub mod generate;
pub mod health;
