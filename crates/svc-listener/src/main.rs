//! Chain listener: one websocket subscription per configured chain over the
//! watched-address set, deduping every delivered log before publishing it
//! to `titan:raw_events`.

mod listener;

use titan_core::config::Settings;
use titan_core::shutdown::Shutdown;
use titan_core::types::REQUIRED_CHAINS;
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

    // A chain without a websocket endpoint cannot be listened to at all.
    for chain in REQUIRED_CHAINS {
        if settings.rpc_ws(chain).is_none() {
            return Err(eyre::eyre!("CHAIN_CONFIG for {chain} is missing rpc_ws"));
        }
    }

    let pool = titan_storage::connect_pg(&settings.database_url)
        .await
        .map_err(|e| eyre::eyre!("{e:#}"))?;
    let heartbeat_conn = titan_storage::connect_redis(&settings.redis_url)
        .await
        .map_err(|e| eyre::eyre!("{e:#}"))?;
    let heartbeat = spawn_heartbeat(heartbeat_conn, listener::WORKER_NAME.into());

    let shutdown = Shutdown::install();
    let mut tasks = Vec::new();
    for chain in REQUIRED_CHAINS {
        let redis = titan_storage::connect_redis(&settings.redis_url)
            .await
            .map_err(|e| eyre::eyre!("{e:#}"))?;
        tasks.push(tokio::spawn(listener::listen_chain(
            settings.clone(),
            pool.clone(),
            redis,
            chain.to_string(),
            shutdown.clone(),
        )));
    }

    for task in tasks {
        if let Err(err) = task.await {
            tracing::error!(error = %err, "listener task panicked");
        }
    }
    heartbeat.abort();
    Ok(())
}
