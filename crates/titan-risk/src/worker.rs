//! Risk worker: one loop, two consumer groups. Decoded trades fan into
//! deduped per-token risk jobs; risk jobs fetch external data and write the
//! token_risk row, degrading to a flagged zero-score record on outage.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use titan_core::config::Settings;
use titan_core::shutdown::Shutdown;
use titan_core::types::DecodedTradeMsg;
use titan_storage::repos::token_risk;
use titan_storage::streams::{
    self, StreamMessage, DEFAULT_MAX_RETRIES, RISK_JOBS_DEDUPE_KEY, STREAM_DECODED_TRADES,
    STREAM_RISK_JOBS,
};
use titan_storage::RedisConn;

use crate::sources::TokenDataSource;
use crate::tss;

pub const ENQUEUE_GROUP: &str = "risk_enqueuers";
pub const SCORE_GROUP: &str = "risk_scorers";
pub const WORKER_NAME: &str = "risk";

const DEDUPE_TTL_SECONDS: i64 = 60;
const BATCH_COUNT: usize = 10;
const BLOCK_MS: usize = 500;

/// Decoded trade -> risk job, suppressed by the 60 s per-token dedupe set.
pub async fn enqueue_from_trade(
    redis: &mut RedisConn,
    fields: &HashMap<String, String>,
) -> Result<bool> {
    let msg = DecodedTradeMsg::from_fields(fields)?;
    let Some(token_address) = msg.token_address else {
        debug!(tx = %msg.tx_hash, "decoded trade without token, skipping risk job");
        return Ok(false);
    };
    let dedupe_value = format!("{}:{}", msg.chain, token_address);
    if streams::dedupe_with_ttl(redis, RISK_JOBS_DEDUPE_KEY, &dedupe_value, DEDUPE_TTL_SECONDS)
        .await?
    {
        return Ok(false);
    }
    streams::publish_to_stream(
        redis,
        STREAM_RISK_JOBS,
        &[
            ("chain".into(), msg.chain),
            ("token_address".into(), token_address),
            ("tx_hash".into(), msg.tx_hash),
            ("log_index".into(), msg.log_index.to_string()),
        ],
    )
    .await?;
    Ok(true)
}

/// Risk job -> token_risk row. External failure is not a message failure:
/// the row is written with `data_unavailable` instead.
pub async fn score_token(
    settings: &Settings,
    pool: &PgPool,
    source: &dyn TokenDataSource,
    fields: &HashMap<String, String>,
) -> Result<()> {
    let chain = fields
        .get("chain")
        .cloned()
        .unwrap_or_else(|| "ethereum".into())
        .to_lowercase();
    let Some(token_address) = fields
        .get("token_address")
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
    else {
        debug!("risk job without token_address, skipping");
        return Ok(());
    };

    let chain_id = settings.chain(&chain).map(|c| c.chain_id).unwrap_or(1);
    let dexscreener = source.dexscreener_tokens(&token_address).await;
    let goplus = source.goplus_token_security(chain_id, &token_address).await;

    let mut assessment = match (&dexscreener, &goplus) {
        (Err(dex_err), Err(goplus_err)) => {
            warn!(
                chain = %chain,
                token = %token_address,
                dexscreener_error = %dex_err,
                goplus_error = %goplus_err,
                "risk sources unavailable, writing degraded record"
            );
            tss::unavailable()
        }
        _ => tss::assess(
            &token_address,
            dexscreener.as_ref().ok(),
            goplus.as_ref().ok(),
        ),
    };

    let previous = token_risk::get(pool, &chain, &token_address).await?;
    tss::attach_history(
        &mut assessment,
        previous.as_ref().map(|p| &p.components),
        Utc::now(),
    );

    let mut tx = pool.begin().await?;
    token_risk::upsert(
        &mut *tx,
        &chain,
        &token_address,
        assessment.score,
        assessment.tss,
        &serde_json::json!(assessment.flags),
        &assessment.components,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

async fn drain_enqueue_batch(redis: &mut RedisConn, consumer: &str) -> Result<usize> {
    let messages = streams::consume_from_stream(
        redis,
        STREAM_DECODED_TRADES,
        ENQUEUE_GROUP,
        consumer,
        BATCH_COUNT,
        BLOCK_MS,
    )
    .await?;
    let count = messages.len();
    for StreamMessage { id, fields } in messages {
        match enqueue_from_trade(redis, &fields).await {
            Ok(_) => {
                streams::acknowledge_message(redis, STREAM_DECODED_TRADES, ENQUEUE_GROUP, &id)
                    .await?;
            }
            Err(err) => {
                warn!(message_id = %id, error = %err, "risk enqueue failed");
                streams::retry_or_dead_letter(
                    redis,
                    STREAM_DECODED_TRADES,
                    ENQUEUE_GROUP,
                    &id,
                    &fields,
                    DEFAULT_MAX_RETRIES,
                )
                .await?;
            }
        }
    }
    Ok(count)
}

async fn drain_score_batch(
    settings: &Settings,
    pool: &PgPool,
    redis: &mut RedisConn,
    source: &dyn TokenDataSource,
    consumer: &str,
) -> Result<usize> {
    let messages = streams::consume_from_stream(
        redis,
        STREAM_RISK_JOBS,
        SCORE_GROUP,
        consumer,
        BATCH_COUNT,
        BLOCK_MS,
    )
    .await?;
    let count = messages.len();
    for StreamMessage { id, fields } in messages {
        match score_token(settings, pool, source, &fields).await {
            Ok(()) => {
                streams::acknowledge_message(redis, STREAM_RISK_JOBS, SCORE_GROUP, &id).await?;
            }
            Err(err) => {
                warn!(message_id = %id, error = %err, "risk scoring failed");
                streams::retry_or_dead_letter(
                    redis,
                    STREAM_RISK_JOBS,
                    SCORE_GROUP,
                    &id,
                    &fields,
                    DEFAULT_MAX_RETRIES,
                )
                .await?;
            }
        }
    }
    Ok(count)
}

pub async fn run(
    settings: Settings,
    pool: PgPool,
    mut redis: RedisConn,
    source: Box<dyn TokenDataSource>,
    mut shutdown: Shutdown,
) -> Result<()> {
    streams::ensure_consumer_group(&mut redis, STREAM_DECODED_TRADES, ENQUEUE_GROUP).await?;
    streams::ensure_consumer_group(&mut redis, STREAM_RISK_JOBS, SCORE_GROUP).await?;
    let consumer = format!("{WORKER_NAME}-{}", std::process::id());
    info!(consumer = %consumer, "risk worker started");

    while !shutdown.is_triggered() {
        let mut processed = 0;
        match drain_enqueue_batch(&mut redis, &consumer).await {
            Ok(count) => processed += count,
            Err(err) => warn!(error = %err, "risk enqueue batch failed"),
        }
        match drain_score_batch(&settings, &pool, &mut redis, source.as_ref(), &consumer).await {
            Ok(count) => processed += count,
            Err(err) => warn!(error = %err, "risk score batch failed"),
        }
        if processed == 0 && shutdown.wait_timeout(Duration::from_secs(1)).await {
            break;
        }
    }
    info!("risk worker stopped");
    Ok(())
}
