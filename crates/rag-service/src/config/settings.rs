use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub models: ModelsConfig,
    pub retrieval: RetrievalConfig,
    pub chat: ChatConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub embedding_base_url: String,
    pub generation_base_url: String,
    pub embedding_timeout_seconds: u64,
    pub generation_timeout_seconds: u64,
    pub embedding_dimension: usize,
    pub max_tokens: usize,
}

/// Model routing per intent. Analysis/writing/qa fall back to the general
/// generation model when unset.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelsConfig {
    pub generation_model: String,
    pub embedding_model: String,
    pub analysis_model: Option<String>,
    pub writing_model: Option<String>,
    pub qa_model: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetrievalConfig {
    pub similarity_threshold: f32,
    pub top_k: usize,
    pub default_coverage_pct: f32,
    pub max_coverage_pct: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChatConfig {
    pub history_turns: usize,
    pub max_history_chars: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IngestConfig {
    pub worker_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_batch_size: usize,
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.max_upload_bytes", 50 * 1024 * 1024)?
            .set_default("llm.embedding_base_url", "http://127.0.0.1:8081")?
            .set_default("llm.generation_base_url", "http://127.0.0.1:8082")?
            .set_default("llm.embedding_timeout_seconds", 30)?
            .set_default("llm.generation_timeout_seconds", 120)?
            .set_default("llm.embedding_dimension", 768)?
            .set_default("llm.max_tokens", 2048)?
            .set_default("models.generation_model", "default-generation")?
            .set_default("models.embedding_model", "default-embedding")?
            .set_default("retrieval.similarity_threshold", 0.35)?
            .set_default("retrieval.top_k", 10)?
            .set_default("retrieval.default_coverage_pct", 35.0)?
            .set_default("retrieval.max_coverage_pct", 60.0)?
            .set_default("chat.history_turns", 3)?
            .set_default("chat.max_history_chars", 8000)?
            .set_default("storage.data_dir", "data")?
            .set_default("ingest.worker_count", 2)?
            .set_default("ingest.chunk_size", 1200)?
            .set_default("ingest.chunk_overlap", 200)?
            .set_default("ingest.embedding_batch_size", 16)?
            .add_source(File::with_name("config/settings").required(false))
            .add_source(Environment::with_prefix("APP").separator("__").try_parsing(true))
            .build()?;

        let mut settings: Settings = config.try_deserialize()?;
        settings.apply_env_contract();
        Ok(settings)
    }

    /// Flat environment names are the stable deployment contract and win
    /// over both file and APP__ overrides.
    fn apply_env_contract(&mut self) {
        if let Ok(v) = std::env::var("GENERATION_MODEL") {
            self.models.generation_model = v;
        }
        if let Ok(v) = std::env::var("EMBEDDING_MODEL") {
            self.models.embedding_model = v;
        }
        if let Ok(v) = std::env::var("ANALYSIS_MODEL") {
            self.models.analysis_model = Some(v);
        }
        if let Ok(v) = std::env::var("WRITING_MODEL") {
            self.models.writing_model = Some(v);
        }
        if let Ok(v) = std::env::var("QA_MODEL") {
            self.models.qa_model = Some(v);
        }
        if let Some(v) = parse_env("SIMILARITY_THRESHOLD") {
            self.retrieval.similarity_threshold = v;
        }
        if let Some(v) = parse_env("TOP_K") {
            self.retrieval.top_k = v;
        }
        if let Some(v) = parse_env("DEFAULT_COVERAGE_PCT") {
            self.retrieval.default_coverage_pct = v;
        }
        if let Some(v) = parse_env("MAX_COVERAGE_PCT") {
            self.retrieval.max_coverage_pct = v;
        }
        if let Some(v) = parse_env("HISTORY_TURNS") {
            self.chat.history_turns = v;
        }
        if let Some(v) = parse_env("MAX_HISTORY_CHARS") {
            self.chat.max_history_chars = v;
        }
        if let Ok(v) = std::env::var("DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

impl ModelsConfig {
    pub fn for_intent(&self, intent: crate::models::generation::Intent) -> &str {
        use crate::models::generation::Intent;
        let specific = match intent {
            Intent::Analysis => self.analysis_model.as_deref(),
            Intent::Writing => self.writing_model.as_deref(),
            Intent::Qa => self.qa_model.as_deref(),
        };
        specific.unwrap_or(&self.generation_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generation::Intent;

    #[test]
    fn model_routing_falls_back_to_generation_model() {
        let models = ModelsConfig {
            generation_model: "gen".to_string(),
            embedding_model: "emb".to_string(),
            analysis_model: Some("deep".to_string()),
            writing_model: None,
            qa_model: None,
        };
        assert_eq!(models.for_intent(Intent::Analysis), "deep");
        assert_eq!(models.for_intent(Intent::Writing), "gen");
        assert_eq!(models.for_intent(Intent::Qa), "gen");
    }
}
