use anyhow::Result;
use sqlx::PgExecutor;

use crate::models::SettingRow;

pub async fn get(executor: impl PgExecutor<'_>, key: &str) -> Result<Option<SettingRow>> {
    let row = sqlx::query_as::<_, SettingRow>("SELECT * FROM settings_store WHERE key = $1")
        .bind(key)
        .fetch_optional(executor)
        .await?;
    Ok(row)
}

pub async fn put(
    executor: impl PgExecutor<'_>,
    key: &str,
    value: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO settings_store (key, value, updated_at)
         VALUES ($1, $2, now())
         ON CONFLICT (key) DO UPDATE SET
             value = EXCLUDED.value,
             updated_at = now()",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn list(executor: impl PgExecutor<'_>) -> Result<Vec<SettingRow>> {
    let rows = sqlx::query_as::<_, SettingRow>("SELECT * FROM settings_store ORDER BY key")
        .fetch_all(executor)
        .await?;
    Ok(rows)
}
