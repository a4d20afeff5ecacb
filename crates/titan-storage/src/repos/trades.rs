use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgExecutor};

use crate::models::Trade;

/// Insert payload for a decoded trade; the natural key makes replays no-ops
/// that refresh the decoded fields.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: i32,
    pub block_number: Option<i64>,
    pub wallet_address: Option<String>,
    pub token_address: Option<String>,
    pub side: Option<String>,
    pub amount: Option<f64>,
    pub price: Option<f64>,
    pub usd_value: Option<f64>,
    pub block_time: Option<DateTime<Utc>>,
    pub dex: Option<String>,
    pub pair_address: Option<String>,
    pub decode_confidence: f64,
}

pub async fn upsert(executor: impl PgExecutor<'_>, trade: &NewTrade) -> Result<()> {
    sqlx::query(
        "INSERT INTO trades
             (chain, tx_hash, log_index, block_number, wallet_address,
              token_address, side, amount, price, usd_value, block_time, dex,
              pair_address, decode_confidence)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
         ON CONFLICT (chain, tx_hash, log_index) DO UPDATE SET
             block_number = EXCLUDED.block_number,
             wallet_address = EXCLUDED.wallet_address,
             token_address = EXCLUDED.token_address,
             side = EXCLUDED.side,
             amount = EXCLUDED.amount,
             price = EXCLUDED.price,
             usd_value = EXCLUDED.usd_value,
             block_time = EXCLUDED.block_time,
             dex = EXCLUDED.dex,
             pair_address = EXCLUDED.pair_address,
             decode_confidence = EXCLUDED.decode_confidence",
    )
    .bind(&trade.chain)
    .bind(&trade.tx_hash)
    .bind(trade.log_index)
    .bind(trade.block_number)
    .bind(&trade.wallet_address)
    .bind(&trade.token_address)
    .bind(&trade.side)
    .bind(trade.amount)
    .bind(trade.price)
    .bind(trade.usd_value)
    .bind(trade.block_time)
    .bind(&trade.dex)
    .bind(&trade.pair_address)
    .bind(trade.decode_confidence)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn get(
    executor: impl PgExecutor<'_>,
    chain: &str,
    tx_hash: &str,
    log_index: i32,
) -> Result<Option<Trade>> {
    let trade = sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades WHERE chain = $1 AND tx_hash = $2 AND log_index = $3",
    )
    .bind(chain)
    .bind(tx_hash)
    .bind(log_index)
    .fetch_optional(executor)
    .await?;
    Ok(trade)
}

/// Alerts scan input: buys inside the lookback window, newest first.
pub async fn recent_buys(
    executor: impl PgExecutor<'_>,
    cutoff: DateTime<Utc>,
) -> Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades
         WHERE lower(side) = 'buy' AND created_at >= $1
         ORDER BY created_at DESC",
    )
    .bind(cutoff)
    .fetch_all(executor)
    .await?;
    Ok(trades)
}

/// Profiler input: every attributed trade in deterministic replay order.
pub async fn all_with_wallet(executor: impl PgExecutor<'_>) -> Result<Vec<Trade>> {
    let trades = sqlx::query_as::<_, Trade>(
        "SELECT * FROM trades
         WHERE wallet_address IS NOT NULL
         ORDER BY COALESCE(block_time, created_at) ASC, created_at ASC,
                  tx_hash ASC, log_index ASC",
    )
    .fetch_all(executor)
    .await?;
    Ok(trades)
}

/// High-confidence price points for the outcome window.
pub async fn price_series(
    executor: impl PgExecutor<'_>,
    chain: &str,
    token_address: &str,
    pair_address: Option<&str>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<(DateTime<Utc>, f64)>> {
    let rows: Vec<(DateTime<Utc>, f64)> = match pair_address {
        Some(pair) => {
            sqlx::query_as(
                "SELECT block_time, price FROM trades
                 WHERE chain = $1 AND token_address = $2 AND pair_address = $3
                   AND block_time BETWEEN $4 AND $5
                   AND decode_confidence >= 0.6
                   AND price IS NOT NULL AND price > 0
                 ORDER BY block_time ASC",
            )
            .bind(chain)
            .bind(token_address)
            .bind(pair)
            .bind(start)
            .bind(end)
            .fetch_all(executor)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT block_time, price FROM trades
                 WHERE chain = $1 AND token_address = $2
                   AND block_time BETWEEN $3 AND $4
                   AND decode_confidence >= 0.6
                   AND price IS NOT NULL AND price > 0
                 ORDER BY block_time ASC",
            )
            .bind(chain)
            .bind(token_address)
            .bind(start)
            .bind(end)
            .fetch_all(executor)
            .await?
        }
    };
    Ok(rows)
}

#[derive(Debug, Clone, FromRow, serde::Serialize)]
pub struct PairTradeCount {
    pub chain: String,
    pub pair_address: String,
    pub trade_count: i64,
}

pub async fn top_pairs_by_trade_count(
    executor: impl PgExecutor<'_>,
    limit: i64,
) -> Result<Vec<PairTradeCount>> {
    let rows = sqlx::query_as::<_, PairTradeCount>(
        "SELECT chain, pair_address, COUNT(*) AS trade_count
         FROM trades
         WHERE pair_address IS NOT NULL
         GROUP BY chain, pair_address
         ORDER BY trade_count DESC
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(executor)
    .await?;
    Ok(rows)
}
