use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use rag_service::config::Settings;
use rag_service::router::{build_router, build_state};
use rag_service::services::{HttpEmbeddingClient, HttpGeneratorClient};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rag_service=debug".to_string()),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting RAG service...");

    let settings = Settings::load()?;
    info!("Configuration loaded (data dir: {})", settings.storage.data_dir.display());

    let embedder = Arc::new(HttpEmbeddingClient::new(&settings.llm, &settings.models));
    let generator = Arc::new(HttpGeneratorClient::new(&settings.llm));

    let state = build_state(settings.clone(), embedder, generator)
        .await
        .map_err(|e| anyhow::anyhow!("startup failed: {}", e))?;
    info!("Stores opened and reconciled");

    let app = build_router(state);

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
