use anyhow::Result;
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::models::Position;

pub async fn upsert(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
    token_address: &str,
    quantity: f64,
    average_price: Option<f64>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO positions
             (id, chain, wallet_address, token_address, quantity, average_price, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, now())
         ON CONFLICT (chain, wallet_address, token_address) DO UPDATE SET
             quantity = EXCLUDED.quantity,
             average_price = EXCLUDED.average_price,
             updated_at = now()",
    )
    .bind(Uuid::new_v4())
    .bind(chain)
    .bind(wallet_address)
    .bind(token_address)
    .bind(quantity)
    .bind(average_price)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list_for_wallet(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
) -> Result<Vec<Position>> {
    let positions = sqlx::query_as::<_, Position>(
        "SELECT * FROM positions
         WHERE chain = $1 AND wallet_address = $2
         ORDER BY token_address",
    )
    .bind(chain)
    .bind(wallet_address)
    .fetch_all(executor)
    .await?;
    Ok(positions)
}

pub async fn count_for_wallet(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM positions WHERE chain = $1 AND wallet_address = $2",
    )
    .bind(chain)
    .bind(wallet_address)
    .fetch_one(executor)
    .await?;
    Ok(count)
}
