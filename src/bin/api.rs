use leadership_insight_agent::{agent::Orchestrator, api::start_server, config::Config};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    info!("Leadership Insight Agent - API Server");
    info!(
        port = config.port,
        model = %config.llm_model,
        qdrant = %config.qdrant_url,
        collection = %config.collection_name,
        "Configuration loaded"
    );

    if config.gemini_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY not set; routing fallback and synthesis will degrade");
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);
    info!("Orchestrator initialized");

    tokio::fs::create_dir_all(&config.static_dir).await?;
    start_server(orchestrator, &config.static_dir, config.port).await?;

    Ok(())
}
