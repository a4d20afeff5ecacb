//! Per-chain subscription loop: connect, subscribe to the watched set,
//! pump logs into the raw-events stream, reconnect with capped backoff, and
//! resubscribe when the watched set drifts.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::{anyhow, Result};
use futures_util::{SinkExt, StreamExt};
use sqlx::PgPool;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use titan_chain::ws::{parse_frame, subscribe_logs_request, WsFrame};
use titan_core::config::Settings;
use titan_core::shutdown::Shutdown;
use titan_core::types::RawLogEvent;
use titan_storage::streams::{self, RAW_EVENTS_DEDUPE_KEY, STREAM_RAW_EVENTS};
use titan_storage::RedisConn;
use titan_watchlist::snapshot::get_watch_pairs_snapshot;

pub const WORKER_NAME: &str = "listener";

const RECONNECT_BASE: Duration = Duration::from_secs(1);
const RECONNECT_MAX: Duration = Duration::from_secs(30);
const READ_TIMEOUT: Duration = Duration::from_secs(1);
const WATCHED_REFRESH: Duration = Duration::from_secs(60);
const DEDUPE_TTL_SECONDS: i64 = 3600;

/// Operator addresses plus the active watch pairs for the chain.
async fn watched_addresses(
    settings: &Settings,
    pool: &PgPool,
    redis: &mut RedisConn,
    chain: &str,
) -> Result<BTreeSet<String>> {
    let mut watched: BTreeSet<String> = settings
        .watched_addresses(chain)
        .iter()
        .map(|a| a.to_lowercase())
        .collect();
    let snapshot = get_watch_pairs_snapshot(settings, pool, redis).await?;
    if let Some(pairs) = snapshot.get(chain) {
        watched.extend(pairs.iter().map(|a| a.to_lowercase()));
    }
    Ok(watched)
}

/// Dedupes and publishes one delivered log. Returns true when the log was
/// first-sight.
async fn publish_log(redis: &mut RedisConn, event: &RawLogEvent) -> Result<bool> {
    let seen = streams::dedupe_with_ttl(
        redis,
        RAW_EVENTS_DEDUPE_KEY,
        &event.dedupe_key(),
        DEDUPE_TTL_SECONDS,
    )
    .await?;
    if seen {
        debug!(key = %event.dedupe_key(), "duplicate log dropped");
        return Ok(false);
    }
    streams::publish_to_stream(redis, STREAM_RAW_EVENTS, &event.to_fields()).await?;
    Ok(true)
}

/// One connection lifetime. Returns Ok(true) when the caller should
/// reconnect immediately without backoff (watched-set change), Ok(false) on
/// shutdown.
async fn run_connection(
    settings: &Settings,
    pool: &PgPool,
    redis: &mut RedisConn,
    chain: &str,
    ws_url: &str,
    shutdown: &Shutdown,
    backoff: &mut Duration,
) -> Result<bool> {
    let watched = watched_addresses(settings, pool, redis, chain).await?;
    if watched.is_empty() {
        debug!(chain, "no watched addresses yet");
    }

    let (ws_stream, _) = tokio_tungstenite::connect_async(ws_url).await?;
    let (mut write, mut read) = ws_stream.split();

    let addresses: Vec<String> = watched.iter().cloned().collect();
    let request = subscribe_logs_request(1, &addresses);
    write.send(Message::Text(request.to_string())).await?;

    let subscription_id = loop {
        match tokio::time::timeout(Duration::from_secs(10), read.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => match parse_frame(&text) {
                WsFrame::SubscriptionAck(ack) => {
                    if let Some(id) = ack.result {
                        break id;
                    }
                    return Err(anyhow!("subscription rejected: {:?}", ack.error));
                }
                _ => continue,
            },
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(err))) => return Err(err.into()),
            Ok(None) => return Err(anyhow!("socket closed before subscription ack")),
            Err(_) => return Err(anyhow!("subscription ack timed out")),
        }
    };
    info!(chain, subscription = %subscription_id, watched = watched.len(), "subscribed");

    let mut last_refresh = tokio::time::Instant::now();
    loop {
        if shutdown.is_triggered() {
            return Ok(false);
        }

        // Periodically reconcile against the watch-pair snapshot; a drift
        // means resubscribing with the new address set.
        if last_refresh.elapsed() >= WATCHED_REFRESH {
            last_refresh = tokio::time::Instant::now();
            match watched_addresses(settings, pool, redis, chain).await {
                Ok(current) => {
                    if current != watched {
                        info!(chain, watched = current.len(), "watched set changed, resubscribing");
                        return Ok(true);
                    }
                }
                Err(err) => debug!(chain, error = %err, "watched set refresh failed"),
            }
        }

        // Short read timeout keeps shutdown latency bounded.
        let frame = match tokio::time::timeout(READ_TIMEOUT, read.next()).await {
            Err(_) => continue,
            Ok(None) => return Err(anyhow!("websocket closed")),
            Ok(Some(Err(err))) => return Err(err.into()),
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => match parse_frame(&text) {
                WsFrame::Log(entry) => {
                    if entry.removed {
                        debug!(chain, "skipping removed log");
                        continue;
                    }
                    let event = entry.into_raw_event(chain);
                    if event.tx_hash.is_empty() {
                        warn!(chain, "malformed log without tx hash, skipping");
                        continue;
                    }
                    if let Err(err) = publish_log(redis, &event).await {
                        warn!(chain, error = %err, "raw event publish failed");
                    } else {
                        // A flowing subscription resets the backoff.
                        *backoff = RECONNECT_BASE;
                    }
                }
                _ => continue,
            },
            Message::Ping(data) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Message::Close(_) => return Err(anyhow!("websocket closed by peer")),
            _ => continue,
        }
    }
}

pub async fn listen_chain(
    settings: Settings,
    pool: PgPool,
    mut redis: RedisConn,
    chain: String,
    mut shutdown: Shutdown,
) {
    let ws_url = settings
        .rpc_ws(&chain)
        .expect("validated at startup")
        .to_string();
    let mut backoff = RECONNECT_BASE;

    while !shutdown.is_triggered() {
        match run_connection(
            &settings,
            &pool,
            &mut redis,
            &chain,
            &ws_url,
            &shutdown,
            &mut backoff,
        )
        .await
        {
            Ok(true) => continue,
            Ok(false) => break,
            Err(err) => {
                warn!(chain = %chain, error = %err, backoff_secs = backoff.as_secs(),
                    "listener connection failed");
                if shutdown.wait_timeout(backoff).await {
                    break;
                }
                backoff = (backoff * 2).min(RECONNECT_MAX);
            }
        }
    }
    info!(chain = %chain, "listener stopped");
}
