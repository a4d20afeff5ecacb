//! The listener's view of the watchlist: active pair addresses per chain,
//! cached in Redis for a minute and rebuilt lazily from Postgres.

use std::collections::HashMap;

use anyhow::Result;
use sqlx::PgPool;

use titan_core::config::Settings;
use titan_storage::repos::watch_pairs;
use titan_storage::{cache, RedisConn};

pub const WATCH_PAIRS_SNAPSHOT_KEY: &str = "titan:watch_pairs:snapshot";
pub const WATCH_PAIRS_SNAPSHOT_TTL_SECONDS: u64 = 60;

pub type WatchPairsSnapshot = HashMap<String, Vec<String>>;

/// Cached snapshot when fresh, else rebuilt best-first per chain (capped)
/// and written back with the TTL.
pub async fn get_watch_pairs_snapshot(
    settings: &Settings,
    pool: &PgPool,
    redis: &mut RedisConn,
) -> Result<WatchPairsSnapshot> {
    if let Some(cached) = cache::get_json(redis, WATCH_PAIRS_SNAPSHOT_KEY).await? {
        if let Ok(snapshot) = serde_json::from_value::<WatchPairsSnapshot>(cached) {
            return Ok(snapshot);
        }
    }

    let mut snapshot: WatchPairsSnapshot = HashMap::new();
    for chain in settings.chain_config.keys() {
        let pairs =
            watch_pairs::active_for_chain(pool, chain, settings.autopilot.max_pairs_per_chain)
                .await?;
        snapshot.insert(
            chain.clone(),
            pairs.into_iter().map(|p| p.pair_address).collect(),
        );
    }

    cache::set_json(
        redis,
        WATCH_PAIRS_SNAPSHOT_KEY,
        &serde_json::to_value(&snapshot)?,
        WATCH_PAIRS_SNAPSHOT_TTL_SECONDS,
    )
    .await?;
    Ok(snapshot)
}
