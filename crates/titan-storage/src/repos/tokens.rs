use anyhow::Result;
use sqlx::PgExecutor;

use crate::models::Token;

pub async fn exists(executor: impl PgExecutor<'_>, chain: &str, address: &str) -> Result<bool> {
    let known = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS (SELECT 1 FROM tokens WHERE chain = $1 AND address = $2)",
    )
    .bind(chain)
    .bind(address)
    .fetch_one(executor)
    .await?;
    Ok(known)
}

pub async fn get(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
) -> Result<Option<Token>> {
    let token =
        sqlx::query_as::<_, Token>("SELECT * FROM tokens WHERE chain = $1 AND address = $2")
            .bind(chain)
            .bind(address)
            .fetch_optional(executor)
            .await?;
    Ok(token)
}

/// First-observation cache of token metadata; later sightings refresh
/// whatever fields are newly known.
pub async fn upsert(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
    symbol: Option<&str>,
    name: Option<&str>,
    decimals: Option<i32>,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO tokens (chain, address, symbol, name, decimals, updated_at)
         VALUES ($1, $2, $3, $4, $5, now())
         ON CONFLICT (chain, address) DO UPDATE SET
             symbol = COALESCE(EXCLUDED.symbol, tokens.symbol),
             name = COALESCE(EXCLUDED.name, tokens.name),
             decimals = COALESCE(EXCLUDED.decimals, tokens.decimals),
             updated_at = now()",
    )
    .bind(chain)
    .bind(address)
    .bind(symbol)
    .bind(name)
    .bind(decimals)
    .execute(executor)
    .await?;
    Ok(())
}
