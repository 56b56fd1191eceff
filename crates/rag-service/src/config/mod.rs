pub mod settings;

pub use settings::{
    ChatConfig, IngestConfig, LlmConfig, ModelsConfig, RetrievalConfig, ServerConfig, Settings,
    StorageConfig,
};
