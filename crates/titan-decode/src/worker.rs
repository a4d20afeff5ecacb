//! Decoder worker: consumes `titan:raw_events` through the `decoders`
//! group, resolves pool tokens, persists trades and republishes the
//! high-confidence ones.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{debug, info, warn};

use titan_chain::rpc::{RpcClient, TOKEN0_SELECTOR, TOKEN1_SELECTOR};
use titan_core::address::address_from_word;
use titan_core::config::Settings;
use titan_core::http::HttpClient;
use titan_core::shutdown::Shutdown;
use titan_core::types::RawLogEvent;
use titan_storage::repos::{trades, wallets};
use titan_storage::streams::{
    self, StreamMessage, DEFAULT_MAX_RETRIES, STREAM_DECODED_TRADES, STREAM_RAW_EVENTS,
};
use titan_storage::{cache, RedisConn};

use crate::registry::lookup_dex;
use crate::swap::{decode_raw_event, DecodedSwap, ResolvedTokens, MIN_PUBLISH_CONFIDENCE};
use crate::topics::{UNISWAP_V2_SWAP_TOPIC, UNISWAP_V3_SWAP_TOPIC};

pub const GROUP_NAME: &str = "decoders";
pub const WORKER_NAME: &str = "decoder";

const TOKEN_LOOKUP_TTL_SECONDS: u64 = 60 * 60 * 6;
const BATCH_COUNT: usize = 10;
const BLOCK_MS: usize = 1_000;

fn token_lookup_key(chain: &str, pool: &str, selector: &str) -> String {
    format!("decode:token_lookup:{chain}:{pool}:{selector}")
}

/// `token0()`/`token1()` via `eth_call`, cached in Redis for six hours.
/// RPC failure only means a missing token, never a failed message.
async fn pool_token(
    settings: &Settings,
    http: &HttpClient,
    redis: &mut RedisConn,
    chain: &str,
    pair_address: &str,
    selector: &str,
) -> Option<String> {
    let key = token_lookup_key(chain, pair_address, selector);
    if let Ok(Some(cached)) = cache::get_string(redis, &key).await {
        return Some(cached);
    }
    let rpc_url = settings.rpc_http(chain)?;
    let rpc = RpcClient::new(http, rpc_url);
    let raw = match rpc.eth_call(pair_address, selector).await {
        Ok(result) => result?,
        Err(err) => {
            warn!(chain, pair = pair_address, error = %err, "token lookup failed");
            return None;
        }
    };
    let token = address_from_word(&raw)?;
    if let Err(err) = cache::set_string(redis, &key, &token, TOKEN_LOOKUP_TTL_SECONDS).await {
        debug!(error = %err, "token lookup cache write failed");
    }
    Some(token)
}

async fn resolve_tokens(
    settings: &Settings,
    http: &HttpClient,
    redis: &mut RedisConn,
    event: &RawLogEvent,
) -> ResolvedTokens {
    let is_swap = event
        .topics
        .first()
        .map(|t| t == UNISWAP_V2_SWAP_TOPIC.as_str() || t == UNISWAP_V3_SWAP_TOPIC.as_str())
        .unwrap_or(false);
    if !is_swap || lookup_dex(&event.chain, &event.address).is_none() {
        return ResolvedTokens::default();
    }
    ResolvedTokens {
        token0: pool_token(settings, http, redis, &event.chain, &event.address, TOKEN0_SELECTOR)
            .await,
        token1: pool_token(settings, http, redis, &event.chain, &event.address, TOKEN1_SELECTOR)
            .await,
    }
}

fn decoded_trade_fields(decoded: &DecodedSwap, block_time: Option<DateTime<Utc>>) -> Vec<(String, String)> {
    let opt = |value: Option<String>| value.unwrap_or_default();
    vec![
        ("chain".into(), decoded.chain.clone()),
        ("tx_hash".into(), decoded.tx_hash.clone()),
        ("log_index".into(), decoded.log_index.to_string()),
        (
            "block_number".into(),
            decoded.block_number.map(|n| n.to_string()).unwrap_or_default(),
        ),
        ("wallet_address".into(), opt(decoded.wallet_address.clone())),
        ("token_address".into(), opt(decoded.token_address.clone())),
        (
            "side".into(),
            decoded.side.map(|s| s.as_str().to_string()).unwrap_or_default(),
        ),
        (
            "amount".into(),
            decoded.amount.map(|a| a.to_string()).unwrap_or_default(),
        ),
        ("price".into(), String::new()),
        ("usd_value".into(), String::new()),
        ("dex".into(), opt(decoded.dex.clone())),
        ("pair_address".into(), opt(decoded.pair_address.clone())),
        (
            "decode_confidence".into(),
            format!("{:.2}", decoded.decode_confidence),
        ),
        (
            "block_time".into(),
            block_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
        ),
    ]
}

/// Decode, persist, republish. Transactional against Postgres; a failure
/// propagates so the caller routes the message to retry/dead-letter.
pub async fn handle_message(
    settings: &Settings,
    pool: &PgPool,
    redis: &mut RedisConn,
    http: &HttpClient,
    fields: &HashMap<String, String>,
) -> Result<()> {
    let event = RawLogEvent::from_fields(fields)?;
    let registry_entry = lookup_dex(&event.chain, &event.address);
    let tokens = resolve_tokens(settings, http, redis, &event).await;
    let decoded = decode_raw_event(&event, registry_entry, &tokens);

    if let Some(wallet) = &decoded.wallet_address {
        if wallets::is_ignored(pool, &decoded.chain, wallet).await? {
            info!(
                chain = %decoded.chain,
                wallet = %wallet,
                tx = %decoded.tx_hash,
                "skipping trade from ignored wallet"
            );
            return Ok(());
        }
    }

    let mut tx = pool.begin().await?;
    trades::upsert(
        &mut *tx,
        &trades::NewTrade {
            chain: decoded.chain.clone(),
            tx_hash: decoded.tx_hash.clone(),
            log_index: decoded.log_index as i32,
            block_number: decoded.block_number.map(|n| n as i64),
            wallet_address: decoded.wallet_address.clone(),
            token_address: decoded.token_address.clone(),
            side: decoded.side.map(|s| s.as_str().to_string()),
            amount: decoded.amount,
            price: None,
            usd_value: None,
            block_time: None,
            dex: decoded.dex.clone(),
            pair_address: decoded.pair_address.clone(),
            decode_confidence: decoded.decode_confidence,
        },
    )
    .await?;
    tx.commit().await?;

    if decoded.decode_confidence >= MIN_PUBLISH_CONFIDENCE {
        streams::publish_to_stream(
            redis,
            STREAM_DECODED_TRADES,
            &decoded_trade_fields(&decoded, None),
        )
        .await?;
    }
    Ok(())
}

pub async fn process_batch(
    settings: &Settings,
    pool: &PgPool,
    redis: &mut RedisConn,
    http: &HttpClient,
    consumer: &str,
) -> Result<usize> {
    let messages = streams::consume_from_stream(
        redis,
        STREAM_RAW_EVENTS,
        GROUP_NAME,
        consumer,
        BATCH_COUNT,
        BLOCK_MS,
    )
    .await?;
    let count = messages.len();
    for StreamMessage { id, fields } in messages {
        match handle_message(settings, pool, redis, http, &fields).await {
            Ok(()) => {
                streams::acknowledge_message(redis, STREAM_RAW_EVENTS, GROUP_NAME, &id).await?;
            }
            Err(err) => {
                warn!(message_id = %id, error = %err, "decoder message failed");
                streams::retry_or_dead_letter(
                    redis,
                    STREAM_RAW_EVENTS,
                    GROUP_NAME,
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
    mut shutdown: Shutdown,
) -> Result<()> {
    streams::ensure_consumer_group(&mut redis, STREAM_RAW_EVENTS, GROUP_NAME).await?;
    let http = HttpClient::with_defaults()?;
    let consumer = format!("{WORKER_NAME}-{}", std::process::id());
    info!(consumer = %consumer, "decoder started");

    while !shutdown.is_triggered() {
        let processed =
            match process_batch(&settings, &pool, &mut redis, &http, &consumer).await {
                Ok(count) => count,
                Err(err) => {
                    warn!(error = %err, "decoder batch failed");
                    0
                }
            };
        if processed == 0 && shutdown.wait_timeout(Duration::from_secs(1)).await {
            break;
        }
    }
    info!("decoder stopped");
    Ok(())
}
