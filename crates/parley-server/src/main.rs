mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::completion::OpenAiClient;
use parley_api::state::AppStateInner;
use parley_api::token::TokenCodec;
use parley_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "parley_server=debug,parley_api=debug,parley_db=info,tower_http=debug".into()
            }),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_placeholder_secret() {
        warn!("PARLEY_JWT_SECRET is unset or a placeholder; tokens are forgeable");
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let completion = OpenAiClient::new(
        &config.openai_api_key,
        config.openai_model.clone(),
        config.openai_base_url.clone(),
        config.completion_timeout,
    )?;
    info!(
        "Completions via {} ({})",
        config.openai_base_url, config.openai_model
    );

    // Shared state
    let state = AppStateInner::new(
        db,
        TokenCodec::new(&config.jwt_secret, config.token_ttl),
        Arc::new(completion),
        config.completion_timeout,
    );

    let app = parley_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
