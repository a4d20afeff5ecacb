use titan_core::config::Settings;
use titan_core::shutdown::Shutdown;
use titan_storage::heartbeat::spawn_heartbeat;

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
    let heartbeat_conn = titan_storage::connect_redis(&settings.redis_url)
        .await
        .map_err(|e| eyre::eyre!("{e:#}"))?;

    let heartbeat = spawn_heartbeat(heartbeat_conn, titan_outcomes::worker::WORKER_NAME.into());
    let shutdown = Shutdown::install();

    let result = titan_outcomes::worker::run(settings, pool, shutdown).await;
    heartbeat.abort();
    result.map_err(|e| eyre::eyre!("{e:#}"))
}
