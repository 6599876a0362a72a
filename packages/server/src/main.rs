use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use server::config::AppConfig;
use server::database::init_db;
use server::services::diffusion::build_backend;
use server::services::llm::GeminiClient;
use server::services::render::Renderer;
use server::services::scene::SceneGenerator;
use server::services::storage::build_store;
use server::services::templates::TemplateCache;
use server::state::AppState;

/// SQLite will not create missing parent directories.
fn ensure_sqlite_dir(url: &str) -> std::io::Result<()> {
    let Some(rest) = url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let file = rest.split('?').next().unwrap_or(rest);
    match Path::new(file).parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;

    ensure_sqlite_dir(&config.database.url).context("Failed to create database directory")?;
    let db = init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;

    let storage = build_store(&config.storage)
        .await
        .context("Failed to initialize object storage")?;

    let model = GeminiClient::new(&config.llm).context("Failed to build LLM client")?;
    let templates = TemplateCache::new(config.llm.templates_dir.clone());
    let scenes = SceneGenerator::new(Arc::new(model), templates);

    let backend = build_backend(&config.render).context("Failed to build render backend")?;
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.render.timeout_secs))
        .build()
        .context("Failed to build HTTP client")?;
    let renderer = Renderer::new(
        Arc::from(backend),
        storage.clone(),
        http,
        config.storage.max_upload_size,
    );
    info!(backend = renderer.backend_name(), "Render backend ready");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        db,
        config,
        scenes: Arc::new(scenes),
        renderer: Arc::new(renderer),
        storage,
    };

    let app = server::build_router(state);

    info!("ArchFlow listening on http://{}", addr);
    info!("API docs at http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
