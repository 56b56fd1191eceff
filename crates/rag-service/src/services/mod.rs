pub mod conversation;
pub mod embedding;
pub mod generator;
pub mod intent;
pub mod orchestrator;
pub mod prompt;
pub mod retriever;
pub mod validator;

pub use conversation::ChatController;
pub use embedding::{EmbeddingProvider, HttpEmbeddingClient};
pub use generator::{GeneratorProvider, HttpGeneratorClient};
pub use intent::IntentClassifier;
pub use orchestrator::Orchestrator;
pub use prompt::PromptAssembler;
pub use retriever::Retriever;
pub use validator::Validator;
