use anyhow::Result;
use rust_decimal::Decimal;
use sqlx::PgExecutor;

use crate::models::Wallet;

pub async fn get(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
) -> Result<Option<Wallet>> {
    let wallet = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE chain = $1 AND address = $2",
    )
    .bind(chain)
    .bind(address)
    .fetch_optional(executor)
    .await?;
    Ok(wallet)
}

/// Decoder/profiler/alerts gate: ignored wallets are skipped everywhere.
pub async fn is_ignored(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
) -> Result<bool> {
    let ignored = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (
             SELECT 1 FROM wallets
             WHERE chain = $1 AND address = $2 AND tier = 'ignore'
         )",
    )
    .bind(chain)
    .bind(address.to_lowercase())
    .fetch_one(executor)
    .await?;
    Ok(ignored)
}

pub async fn list_all(executor: impl PgExecutor<'_>) -> Result<Vec<Wallet>> {
    let wallets = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets ORDER BY chain, address")
        .fetch_all(executor)
        .await?;
    Ok(wallets)
}

pub async fn list_by_tier(
    executor: impl PgExecutor<'_>,
    tier: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Wallet>> {
    let wallets = match tier {
        Some(tier) => {
            sqlx::query_as::<_, Wallet>(
                "SELECT * FROM wallets WHERE tier = $1
                 ORDER BY merit_score DESC LIMIT $2 OFFSET $3",
            )
            .bind(tier)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?
        }
        None => {
            sqlx::query_as::<_, Wallet>(
                "SELECT * FROM wallets ORDER BY merit_score DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?
        }
    };
    Ok(wallets)
}

pub async fn top_by_merit(executor: impl PgExecutor<'_>, limit: i64) -> Result<Vec<Wallet>> {
    let wallets = sqlx::query_as::<_, Wallet>(
        "SELECT * FROM wallets WHERE tier IS DISTINCT FROM 'ignore'
         ORDER BY merit_score DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(wallets)
}

/// Merit engine write path: score, tier and the tier_reason rationale move
/// together.
pub async fn update_score_and_tier(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
    merit_score: Decimal,
    tier: Option<&str>,
    tier_reason: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "UPDATE wallets
         SET merit_score = $3, tier = $4, tier_reason = $5
         WHERE chain = $1 AND address = $2",
    )
    .bind(chain)
    .bind(address)
    .bind(merit_score)
    .bind(tier)
    .bind(tier_reason)
    .execute(executor)
    .await?;
    Ok(())
}

/// Seed import: warm-start wallets land as shadow with a prior; an existing
/// ignored wallet is left alone by the caller.
pub async fn upsert_seed_wallet(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
    prior_weight: Decimal,
    tier_reason: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO wallets
             (chain, address, source, prior_weight, merit_score, tier, tier_reason)
         VALUES ($1, $2, 'seed_pack', $3, 0.0, 'shadow', $4)
         ON CONFLICT (chain, address) DO UPDATE SET
             source = 'seed_pack',
             prior_weight = EXCLUDED.prior_weight,
             merit_score = EXCLUDED.merit_score,
             tier = EXCLUDED.tier,
             tier_reason = EXCLUDED.tier_reason",
    )
    .bind(chain)
    .bind(address)
    .bind(prior_weight)
    .bind(tier_reason)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn upsert_ignored_wallet(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
    ignore_reason: Option<&str>,
    tier_reason: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO wallets
             (chain, address, source, prior_weight, merit_score, tier, tier_reason, ignore_reason)
         VALUES ($1, $2, 'seed_pack', 0.0, 0.0, 'ignore', $3, $4)
         ON CONFLICT (chain, address) DO UPDATE SET
             source = 'seed_pack',
             tier = 'ignore',
             tier_reason = EXCLUDED.tier_reason,
             ignore_reason = EXCLUDED.ignore_reason",
    )
    .bind(chain)
    .bind(address)
    .bind(tier_reason)
    .bind(ignore_reason)
    .execute(executor)
    .await?;
    Ok(())
}
