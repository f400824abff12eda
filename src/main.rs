use content_analytics::api;
use content_analytics::config::Config;
use content_analytics::state::AppState;
use content_analytics::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env();

    // Keep the guard alive so the file writer flushes on shutdown
    let _guard = telemetry::init_logging(&config.log_dir());

    tracing::info!("Data directory: {}", config.data_dir.display());
    tracing::info!("LLM provider: {} ({})", config.llm.provider, config.llm.base_url);
    tracing::info!("Max upload size: {} bytes", config.max_file_size);

    let state = AppState::new(config.clone()).await?;
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
