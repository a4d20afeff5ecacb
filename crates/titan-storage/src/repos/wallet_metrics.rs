use anyhow::Result;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::WalletMetric;

pub async fn get(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
) -> Result<Option<WalletMetric>> {
    let metric = sqlx::query_as::<_, WalletMetric>(
        "SELECT * FROM wallet_metrics WHERE chain = $1 AND wallet_address = $2",
    )
    .bind(chain)
    .bind(wallet_address)
    .fetch_optional(executor)
    .await?;
    Ok(metric)
}

pub async fn upsert(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
    total_value: f64,
    pnl: f64,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO wallet_metrics (id, chain, wallet_address, total_value, pnl, updated_at)
         VALUES ($1, $2, $3, $4, $5, now())
         ON CONFLICT (chain, wallet_address) DO UPDATE SET
             total_value = EXCLUDED.total_value,
             pnl = EXCLUDED.pnl,
             updated_at = now()",
    )
    .bind(Uuid::new_v4())
    .bind(chain)
    .bind(wallet_address)
    .bind(total_value)
    .bind(pnl)
    .execute(executor)
    .await?;
    Ok(())
}
