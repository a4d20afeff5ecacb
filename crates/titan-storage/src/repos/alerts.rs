use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

use crate::models::Alert;

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub chain: String,
    pub wallet_address: String,
    pub token_address: Option<String>,
    pub alert_type: String,
    pub tss: Option<f64>,
    pub conviction: Option<f64>,
    pub reasons: serde_json::Value,
    pub narrative: Option<String>,
}

pub async fn insert(executor: impl PgExecutor<'_>, alert: &NewAlert) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO alerts
             (id, chain, wallet_address, token_address, alert_type, tss,
              conviction, reasons, narrative, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now())",
    )
    .bind(id)
    .bind(&alert.chain)
    .bind(&alert.wallet_address)
    .bind(&alert.token_address)
    .bind(&alert.alert_type)
    .bind(alert.tss)
    .bind(alert.conviction)
    .bind(&alert.reasons)
    .bind(&alert.narrative)
    .execute(executor)
    .await?;
    Ok(id)
}

pub async fn get(executor: impl PgExecutor<'_>, id: Uuid) -> Result<Option<Alert>> {
    let alert = sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(alert)
}

/// Cooldown probe: newest alert of a type for `(chain, wallet, token)`.
pub async fn latest_for(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
    token_address: &str,
    alert_type: &str,
) -> Result<Option<Alert>> {
    let alert = sqlx::query_as::<_, Alert>(
        "SELECT * FROM alerts
         WHERE chain = $1 AND wallet_address = $2 AND token_address = $3
           AND alert_type = $4
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(chain)
    .bind(wallet_address)
    .bind(token_address)
    .bind(alert_type)
    .fetch_optional(executor)
    .await?;
    Ok(alert)
}

/// Tier-change dedupe: newest wallet_tier alert regardless of token.
pub async fn latest_tier_alert(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
    since: DateTime<Utc>,
) -> Result<Option<Alert>> {
    let alert = sqlx::query_as::<_, Alert>(
        "SELECT * FROM alerts
         WHERE chain = $1 AND wallet_address = $2 AND alert_type = 'wallet_tier'
           AND created_at >= $3
         ORDER BY created_at DESC
         LIMIT 1",
    )
    .bind(chain)
    .bind(wallet_address)
    .bind(since)
    .fetch_optional(executor)
    .await?;
    Ok(alert)
}

pub async fn list(
    executor: impl PgExecutor<'_>,
    chain: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Alert>> {
    let alerts = match chain {
        Some(chain) => {
            sqlx::query_as::<_, Alert>(
                "SELECT * FROM alerts WHERE chain = $1
                 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            )
            .bind(chain)
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?
        }
        None => {
            sqlx::query_as::<_, Alert>(
                "SELECT * FROM alerts ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(executor)
            .await?
        }
    };
    Ok(alerts)
}

/// Alerts old enough for a horizon that still lack its outcome row.
pub async fn eligible_for_horizon(
    executor: impl PgExecutor<'_>,
    cutoff: DateTime<Utc>,
    horizon_minutes: i32,
    limit: i64,
) -> Result<Vec<Alert>> {
    let alerts = sqlx::query_as::<_, Alert>(
        "SELECT a.* FROM alerts a
         WHERE a.created_at <= $1
           AND NOT EXISTS (
               SELECT 1 FROM signal_outcomes o
               WHERE o.alert_id = a.id AND o.horizon_minutes = $2
           )
         ORDER BY a.created_at ASC
         LIMIT $3",
    )
    .bind(cutoff)
    .bind(horizon_minutes)
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(alerts)
}

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct AlertTypeCount {
    pub alert_type: String,
    pub count: i64,
}

pub async fn counts_by_type(executor: impl PgExecutor<'_>) -> Result<Vec<AlertTypeCount>> {
    let rows = sqlx::query_as::<_, AlertTypeCount>(
        "SELECT alert_type, COUNT(*) AS count FROM alerts GROUP BY alert_type",
    )
    .fetch_all(executor)
    .await?;
    Ok(rows)
}
