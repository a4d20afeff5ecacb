use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgExecutor;

use crate::models::WatchPair;

pub const SEED_PACK_SOURCE: &str = "seed_pack";
pub const AUTOPILOT_SOURCE: &str = "autopilot";

/// Fields the autopilot refresh carries for one surviving pair.
#[derive(Debug, Clone)]
pub struct AutopilotPairUpdate {
    pub chain: String,
    pub pair_address: String,
    pub dex: Option<String>,
    pub token0_symbol: Option<String>,
    pub token0_address: Option<String>,
    pub token1_symbol: Option<String>,
    pub token1_address: Option<String>,
    pub priority: i32,
    pub score: Decimal,
    pub reason: serde_json::Value,
    pub expires_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// Active pairs for the listener snapshot, best-first.
pub async fn active_for_chain(
    executor: impl PgExecutor<'_>,
    chain: &str,
    cap: i64,
) -> Result<Vec<WatchPair>> {
    let pairs = sqlx::query_as::<_, WatchPair>(
        "SELECT * FROM watch_pairs
         WHERE chain = $1 AND expires_at > now()
         ORDER BY priority DESC, score DESC, last_seen DESC NULLS LAST
         LIMIT $2",
    )
    .bind(chain)
    .bind(cap)
    .fetch_all(executor)
    .await?;
    Ok(pairs)
}

pub async fn get(
    executor: impl PgExecutor<'_>,
    chain: &str,
    pair_address: &str,
) -> Result<Option<WatchPair>> {
    let pair = sqlx::query_as::<_, WatchPair>(
        "SELECT * FROM watch_pairs WHERE chain = $1 AND pair_address = $2",
    )
    .bind(chain)
    .bind(pair_address)
    .fetch_optional(executor)
    .await?;
    Ok(pair)
}

pub async fn is_active(
    executor: impl PgExecutor<'_>,
    chain: &str,
    pair_address: &str,
) -> Result<bool> {
    let active = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
             SELECT 1 FROM watch_pairs
             WHERE chain = $1 AND pair_address = $2 AND expires_at > now()
         )",
    )
    .bind(chain)
    .bind(pair_address)
    .fetch_one(executor)
    .await?;
    Ok(active)
}

/// Autopilot ingest upsert. Seed-pack provenance is sticky: a refresh keeps
/// the row fresh but never reclassifies it as autopilot.
pub async fn upsert_from_autopilot(
    executor: impl PgExecutor<'_>,
    update: &AutopilotPairUpdate,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO watch_pairs
             (chain, pair_address, dex, token0_symbol, token0_address,
              token1_symbol, token1_address, source, priority, score, reason,
              expires_at, last_seen)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'autopilot', $8, $9, $10, $11, $12)
         ON CONFLICT (chain, pair_address) DO UPDATE SET
             dex = COALESCE(EXCLUDED.dex, watch_pairs.dex),
             token0_symbol = COALESCE(EXCLUDED.token0_symbol, watch_pairs.token0_symbol),
             token0_address = COALESCE(EXCLUDED.token0_address, watch_pairs.token0_address),
             token1_symbol = COALESCE(EXCLUDED.token1_symbol, watch_pairs.token1_symbol),
             token1_address = COALESCE(EXCLUDED.token1_address, watch_pairs.token1_address),
             priority = EXCLUDED.priority,
             score = EXCLUDED.score,
             reason = EXCLUDED.reason,
             expires_at = EXCLUDED.expires_at,
             last_seen = EXCLUDED.last_seen,
             source = CASE WHEN watch_pairs.source = 'seed_pack'
                           THEN watch_pairs.source ELSE 'autopilot' END",
    )
    .bind(&update.chain)
    .bind(&update.pair_address)
    .bind(&update.dex)
    .bind(&update.token0_symbol)
    .bind(&update.token0_address)
    .bind(&update.token1_symbol)
    .bind(&update.token1_address)
    .bind(update.priority)
    .bind(update.score)
    .bind(&update.reason)
    .bind(update.expires_at)
    .bind(update.last_seen)
    .execute(executor)
    .await?;
    Ok(())
}

/// Active autopilot pairs in churn order (best kept first).
pub async fn active_autopilot_for_chain(
    executor: impl PgExecutor<'_>,
    chain: &str,
) -> Result<Vec<WatchPair>> {
    let pairs = sqlx::query_as::<_, WatchPair>(
        "SELECT * FROM watch_pairs
         WHERE chain = $1 AND source = 'autopilot' AND expires_at > now()
         ORDER BY priority DESC, last_seen DESC NULLS LAST",
    )
    .bind(chain)
    .fetch_all(executor)
    .await?;
    Ok(pairs)
}

/// Churn demotion: immediate expiry, priority floored at zero. The source
/// guard makes seed-pack rows untouchable even if the caller slips.
pub async fn demote(
    executor: impl PgExecutor<'_>,
    chain: &str,
    pair_address: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE watch_pairs
         SET expires_at = $3, priority = LEAST(priority, 0)
         WHERE chain = $1 AND pair_address = $2 AND source <> 'seed_pack'",
    )
    .bind(chain)
    .bind(pair_address)
    .bind(now)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn upsert_seed_pair(
    executor: impl PgExecutor<'_>,
    chain: &str,
    pair_address: &str,
    dex: Option<&str>,
    token0_symbol: Option<&str>,
    token0_address: Option<&str>,
    token1_symbol: Option<&str>,
    token1_address: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO watch_pairs
             (chain, pair_address, dex, token0_symbol, token0_address,
              token1_symbol, token1_address, source, priority, expires_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'seed_pack', 100, $8)
         ON CONFLICT (chain, pair_address) DO UPDATE SET
             dex = COALESCE(EXCLUDED.dex, watch_pairs.dex),
             token0_symbol = COALESCE(EXCLUDED.token0_symbol, watch_pairs.token0_symbol),
             token0_address = COALESCE(EXCLUDED.token0_address, watch_pairs.token0_address),
             token1_symbol = COALESCE(EXCLUDED.token1_symbol, watch_pairs.token1_symbol),
             token1_address = COALESCE(EXCLUDED.token1_address, watch_pairs.token1_address),
             source = 'seed_pack',
             priority = 100,
             expires_at = EXCLUDED.expires_at",
    )
    .bind(chain)
    .bind(pair_address)
    .bind(dex)
    .bind(token0_symbol)
    .bind(token0_address)
    .bind(token1_symbol)
    .bind(token1_address)
    .bind(expires_at)
    .execute(executor)
    .await?;
    Ok(())
}
