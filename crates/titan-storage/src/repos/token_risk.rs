use anyhow::Result;
use sqlx::PgExecutor;

use crate::models::TokenRisk;

pub async fn get(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
) -> Result<Option<TokenRisk>> {
    let risk = sqlx::query_as::<_, TokenRisk>(
        "SELECT * FROM token_risk WHERE chain = $1 AND address = $2",
    )
    .bind(chain)
    .bind(address)
    .fetch_optional(executor)
    .await?;
    Ok(risk)
}

/// One row per token; every refresh replaces score/flags and the whole
/// components document (history lives inside components and is appended by
/// the risk worker before calling this).
pub async fn upsert(
    executor: impl PgExecutor<'_>,
    chain: &str,
    address: &str,
    score: f64,
    tss: f64,
    flags: &serde_json::Value,
    components: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO token_risk (chain, address, score, tss, flags, components, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, now())
         ON CONFLICT (chain, address) DO UPDATE SET
             score = EXCLUDED.score,
             tss = EXCLUDED.tss,
             flags = EXCLUDED.flags,
             components = EXCLUDED.components,
             updated_at = now()",
    )
    .bind(chain)
    .bind(address)
    .bind(score)
    .bind(tss)
    .bind(flags)
    .bind(components)
    .execute(executor)
    .await?;
    Ok(())
}
