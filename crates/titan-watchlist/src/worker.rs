//! Autopilot worker: periodic DexScreener sweep, quality filter, GoPlus
//! screen for known tokens, upsert, then capped churn that never touches
//! seed-pack rows.

use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use titan_core::config::Settings;
use titan_core::http::HttpClient;
use titan_core::shutdown::Shutdown;
use titan_core::types::REQUIRED_CHAINS;
use titan_storage::repos::{tokens, watch_pairs};

use crate::autopilot::{
    has_critical_goplus_flags, parse_pair, passes_quality, priority_score, select_for_demotion,
};

pub const WORKER_NAME: &str = "autopilot";
const PAIR_TTL_HOURS: i64 = 6;

async fn fetch_search_pairs(
    settings: &Settings,
    http: &HttpClient,
    chain: &str,
) -> Result<Vec<serde_json::Value>> {
    let url = format!("{}/search", settings.dexscreener_base_url);
    let payload = http.get_json(&url, &[("q", chain)]).await?;
    match payload.get("pairs") {
        Some(serde_json::Value::Array(pairs)) if !pairs.is_empty() => Ok(pairs.clone()),
        _ => bail!("dexscreener search returned no pairs for {chain}"),
    }
}

/// Base-token screen for pairs we already track the token of: any critical
/// GoPlus flag disqualifies the pair this round.
async fn token_flagged(
    settings: &Settings,
    http: &HttpClient,
    pool: &PgPool,
    chain: &str,
    token_address: Option<&str>,
) -> Result<bool> {
    let Some(token_address) = token_address else {
        return Ok(false);
    };
    if !tokens::exists(pool, chain, token_address).await? {
        return Ok(false);
    }
    let chain_id = settings.chain(chain).map(|c| c.chain_id).unwrap_or(1);
    let url = format!("{}/token_security/{}", settings.goplus_base_url, chain_id);
    match http
        .get_json(&url, &[("contract_addresses", token_address)])
        .await
    {
        Ok(payload) => Ok(has_critical_goplus_flags(&payload, token_address)),
        Err(err) => {
            debug!(token = %token_address, error = %err, "goplus screen failed, not blocking");
            Ok(false)
        }
    }
}

pub async fn run_autopilot_once(
    settings: &Settings,
    pool: &PgPool,
    http: &HttpClient,
) -> Result<usize> {
    let now = Utc::now();
    let mut ingested = 0;

    for chain in REQUIRED_CHAINS {
        let pairs = match fetch_search_pairs(settings, http, chain).await {
            Ok(pairs) => pairs,
            Err(err) => {
                warn!(chain, error = %err, "autopilot fetch failed");
                continue;
            }
        };

        for raw_pair in &pairs {
            let Some(candidate) = parse_pair(chain, raw_pair, now) else {
                continue;
            };
            if !passes_quality(&settings.autopilot, &candidate) {
                continue;
            }
            let screen_token = candidate
                .token0_address
                .as_deref()
                .or(candidate.token1_address.as_deref());
            if token_flagged(settings, http, pool, chain, screen_token).await? {
                debug!(pair = %candidate.pair_address, "autopilot skip: critical token flags");
                continue;
            }

            let priority = priority_score(candidate.liquidity_usd, candidate.volume_24h);
            watch_pairs::upsert_from_autopilot(
                pool,
                &watch_pairs::AutopilotPairUpdate {
                    chain: candidate.chain.clone(),
                    pair_address: candidate.pair_address.clone(),
                    dex: candidate.dex.clone(),
                    token0_symbol: candidate.token0_symbol.clone(),
                    token0_address: candidate.token0_address.clone(),
                    token1_symbol: candidate.token1_symbol.clone(),
                    token1_address: candidate.token1_address.clone(),
                    priority,
                    score: Decimal::from_f64(candidate.liquidity_usd / 1000.0)
                        .unwrap_or(Decimal::ZERO),
                    reason: json!({
                        "source": "autopilot",
                        "liquidity_usd": candidate.liquidity_usd,
                        "volume_24h": candidate.volume_24h,
                        "age_hours": candidate.age_hours,
                    }),
                    expires_at: now + ChronoDuration::hours(PAIR_TTL_HOURS),
                    last_seen: now,
                },
            )
            .await?;
            ingested += 1;
        }
    }

    // Churn pass: respect the per-chain cap, best-first, seed pack immune.
    for chain in REQUIRED_CHAINS {
        let active = watch_pairs::active_for_chain(pool, chain, i64::MAX).await?;
        let demotions =
            select_for_demotion(&active, settings.autopilot.max_pairs_per_chain as usize);
        for pair_address in &demotions {
            watch_pairs::demote(pool, chain, pair_address, now).await?;
        }
        if !demotions.is_empty() {
            info!(chain, demoted = demotions.len(), "autopilot churn applied");
        }
    }

    info!(ingested, "autopilot cycle complete");
    Ok(ingested)
}

pub async fn run(settings: Settings, pool: PgPool, mut shutdown: Shutdown) -> Result<()> {
    let http = HttpClient::with_defaults()?;
    info!("autopilot started");
    while !shutdown.is_triggered() {
        if let Err(err) = run_autopilot_once(&settings, &pool, &http).await {
            warn!(error = %err, "autopilot cycle failed");
        }
        let sleep_seconds = rand::thread_rng().gen_range(
            settings.autopilot.min_sleep_seconds..=settings.autopilot.max_sleep_seconds.max(settings.autopilot.min_sleep_seconds),
        );
        if shutdown.wait_timeout(Duration::from_secs(sleep_seconds)).await {
            break;
        }
    }
    info!("autopilot stopped");
    Ok(())
}
