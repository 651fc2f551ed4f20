use anyhow::Context;
use clap::Parser;
use ocr_upload_server::{create_router, AppState, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::parse();

    tracing::info!("Starting OCR upload server...");

    tokio::fs::create_dir_all(&config.uploads_dir)
        .await
        .with_context(|| format!("failed to create {}", config.uploads_dir.display()))?;

    let state = Arc::new(AppState::from_config(&config));
    tracing::info!(
        uploads_dir = %config.uploads_dir.display(),
        static_dir = %config.static_dir.display(),
        worker = %state.worker.program(),
        "Configuration loaded"
    );

    let app = create_router(state);

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
