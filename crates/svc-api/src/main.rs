//! Read-only query API over the core state: alerts, wallets, token risk,
//! regime, ops health/metrics, and the operator tuning store. The API is a
//! consumer of core state; the settings store is its only write surface.

mod routes;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use titan_core::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub pool: sqlx::PgPool,
    pub redis: titan_storage::RedisConn,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_level.clone())
        .json()
        .init();
    settings.validate_chain_config()?;

    let pool = titan_storage::connect_pg(&settings.database_url)
        .await
        .map_err(|e| eyre::eyre!("{e:#}"))?;
    titan_storage::run_migrations(&pool)
        .await
        .map_err(|e| eyre::eyre!("migration failed: {e:#}"))?;
    let redis = titan_storage::connect_redis(&settings.redis_url)
        .await
        .map_err(|e| eyre::eyre!("{e:#}"))?;

    let bind = settings.api_bind.clone();
    let state = AppState {
        settings: Arc::new(settings),
        pool,
        redis,
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(bind = %bind, "api listening");
    axum::serve(listener, app).await?;
    Ok(())
}
