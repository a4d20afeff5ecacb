use anyhow::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgExecutor};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewSignalOutcome {
    pub alert_id: Uuid,
    pub horizon_minutes: i32,
    pub was_sellable_entire_window: Option<bool>,
    pub min_exit_slippage_1k: Option<Decimal>,
    pub max_exit_slippage_1k: Option<Decimal>,
    pub tradeable_peak_gain: Option<Decimal>,
    pub exit_feasible_peak_gain: Option<Decimal>,
    pub exit_feasible_peak_time: Option<DateTime<Utc>>,
    pub tradeable_drawdown: Option<Decimal>,
    pub net_tradeable_return_est: Option<Decimal>,
    pub trap_flag: Option<bool>,
}

/// Unique on `(alert_id, horizon)`; a second evaluation of the same window
/// is a no-op, which is what makes evaluator re-runs safe.
pub async fn insert(executor: impl PgExecutor<'_>, outcome: &NewSignalOutcome) -> Result<bool> {
    let result = sqlx::query(
        "INSERT INTO signal_outcomes
             (alert_id, horizon_minutes, was_sellable_entire_window,
              min_exit_slippage_1k, max_exit_slippage_1k, tradeable_peak_gain,
              exit_feasible_peak_gain, exit_feasible_peak_time,
              tradeable_drawdown, net_tradeable_return_est, trap_flag,
              evaluated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
         ON CONFLICT (alert_id, horizon_minutes) DO NOTHING",
    )
    .bind(outcome.alert_id)
    .bind(outcome.horizon_minutes)
    .bind(outcome.was_sellable_entire_window)
    .bind(outcome.min_exit_slippage_1k)
    .bind(outcome.max_exit_slippage_1k)
    .bind(outcome.tradeable_peak_gain)
    .bind(outcome.exit_feasible_peak_gain)
    .bind(outcome.exit_feasible_peak_time)
    .bind(outcome.tradeable_drawdown)
    .bind(outcome.net_tradeable_return_est)
    .bind(outcome.trap_flag)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// NetEV expected-move input: mean valid net return for a token.
pub async fn avg_valid_net_return(
    executor: impl PgExecutor<'_>,
    chain: &str,
    token_address: &str,
) -> Result<Option<f64>> {
    let avg = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(o.net_tradeable_return_est)::float8
         FROM signal_outcomes o
         JOIN alerts a ON a.id = o.alert_id
         WHERE a.chain = $1 AND a.token_address = $2
           AND o.was_sellable_entire_window IS TRUE
           AND o.trap_flag IS FALSE
           AND o.net_tradeable_return_est IS NOT NULL",
    )
    .bind(chain)
    .bind(token_address)
    .fetch_one(executor)
    .await?;
    Ok(avg)
}

#[derive(Debug, Clone, FromRow)]
pub struct WalletOutcomeAggregate {
    pub sample_size: i64,
    pub positive_count: i64,
    pub avg_return: Option<f64>,
}

/// Merit inputs: count/positives/mean over the wallet's valid outcomes.
pub async fn wallet_outcome_aggregate(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
) -> Result<WalletOutcomeAggregate> {
    let row = sqlx::query_as::<_, WalletOutcomeAggregate>(
        "SELECT COUNT(o.id) AS sample_size,
                COALESCE(SUM(CASE WHEN o.net_tradeable_return_est > 0 THEN 1 ELSE 0 END), 0)
                    AS positive_count,
                AVG(o.net_tradeable_return_est)::float8 AS avg_return
         FROM signal_outcomes o
         JOIN alerts a ON a.id = o.alert_id
         WHERE a.chain = $1 AND a.wallet_address = $2
           AND o.was_sellable_entire_window IS TRUE
           AND o.trap_flag IS FALSE
           AND o.net_tradeable_return_est IS NOT NULL",
    )
    .bind(chain)
    .bind(wallet_address)
    .fetch_one(executor)
    .await?;
    Ok(row)
}

#[derive(Debug, Clone, FromRow)]
pub struct ValidOutcomeRow {
    pub alert_id: Uuid,
    pub token_address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub net_return: f64,
}

/// The wallet's valid outcomes with the alert context the contribution
/// weighting needs.
pub async fn valid_outcomes_for_wallet(
    executor: impl PgExecutor<'_>,
    chain: &str,
    wallet_address: &str,
) -> Result<Vec<ValidOutcomeRow>> {
    let rows = sqlx::query_as::<_, ValidOutcomeRow>(
        "SELECT a.id AS alert_id, a.token_address, a.created_at,
                o.net_tradeable_return_est::float8 AS net_return
         FROM signal_outcomes o
         JOIN alerts a ON a.id = o.alert_id
         WHERE a.chain = $1 AND a.wallet_address = $2
           AND o.was_sellable_entire_window IS TRUE
           AND o.trap_flag IS FALSE
           AND o.net_tradeable_return_est IS NOT NULL
         ORDER BY a.created_at ASC",
    )
    .bind(chain)
    .bind(wallet_address)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}

pub async fn trap_rate(executor: impl PgExecutor<'_>) -> Result<Option<f64>> {
    let rate = sqlx::query_scalar::<_, Option<f64>>(
        "SELECT AVG(CASE WHEN trap_flag THEN 1.0 ELSE 0.0 END)::float8
         FROM signal_outcomes
         WHERE trap_flag IS NOT NULL",
    )
    .fetch_one(executor)
    .await?;
    Ok(rate)
}

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct HorizonNetReturn {
    pub horizon_minutes: i32,
    pub avg_net_return: Option<f64>,
    pub sample_size: i64,
}

pub async fn avg_net_return_by_horizon(
    executor: impl PgExecutor<'_>,
) -> Result<Vec<HorizonNetReturn>> {
    let rows = sqlx::query_as::<_, HorizonNetReturn>(
        "SELECT horizon_minutes,
                AVG(net_tradeable_return_est)::float8 AS avg_net_return,
                COUNT(net_tradeable_return_est) AS sample_size
         FROM signal_outcomes
         GROUP BY horizon_minutes
         ORDER BY horizon_minutes",
    )
    .fetch_all(executor)
    .await?;
    Ok(rows)
}
