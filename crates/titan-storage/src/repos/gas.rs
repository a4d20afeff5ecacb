use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::ChainGasEstimate;

pub async fn record_observation(
    executor: impl PgExecutor<'_>,
    chain: &str,
    tx_hash: &str,
    gas_cost_usd: f64,
    observed_at: DateTime<Utc>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO gas_cost_observations (chain, tx_hash, gas_cost_usd, observed_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (chain, tx_hash) DO NOTHING",
    )
    .bind(chain)
    .bind(tx_hash)
    .bind(gas_cost_usd)
    .bind(observed_at)
    .execute(executor)
    .await?;
    Ok(())
}

/// Costs seen in the rolling window, newest first.
pub async fn costs_since(
    executor: impl PgExecutor<'_>,
    chain: &str,
    cutoff: DateTime<Utc>,
) -> Result<Vec<f64>> {
    let costs = sqlx::query_scalar::<_, f64>(
        "SELECT gas_cost_usd FROM gas_cost_observations
         WHERE chain = $1 AND observed_at >= $2
         ORDER BY observed_at DESC",
    )
    .bind(chain)
    .bind(cutoff)
    .fetch_all(executor)
    .await?;
    Ok(costs)
}

pub async fn upsert_estimate(
    executor: impl PgExecutor<'_>,
    chain: &str,
    avg_gas_usd_1h: f64,
    p95_gas_usd_1h: f64,
    samples_1h: i32,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO chain_gas_estimates
             (chain, avg_gas_usd_1h, p95_gas_usd_1h, samples_1h, updated_at)
         VALUES ($1, $2, $3, $4, now())
         ON CONFLICT (chain) DO UPDATE SET
             avg_gas_usd_1h = EXCLUDED.avg_gas_usd_1h,
             p95_gas_usd_1h = EXCLUDED.p95_gas_usd_1h,
             samples_1h = EXCLUDED.samples_1h,
             updated_at = now()",
    )
    .bind(chain)
    .bind(avg_gas_usd_1h)
    .bind(p95_gas_usd_1h)
    .bind(samples_1h)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get_estimate(
    executor: impl PgExecutor<'_>,
    chain: &str,
) -> Result<Option<ChainGasEstimate>> {
    let estimate = sqlx::query_as::<_, ChainGasEstimate>(
        "SELECT * FROM chain_gas_estimates WHERE chain = $1",
    )
    .bind(chain)
    .fetch_optional(executor)
    .await?;
    Ok(estimate)
}
