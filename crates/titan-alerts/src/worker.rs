//! Alerts worker: scans recent buys, routes watchlist pool activity, and
//! applies the NetEV gate plus cooldowns before emitting anything.

use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use sqlx::PgPool;
use tracing::{debug, info, warn};

use titan_core::config::Settings;
use titan_core::http::HttpClient;
use titan_core::shutdown::Shutdown;
use titan_core::types::AlertType;
use titan_storage::models::{TokenRisk, Trade};
use titan_storage::repos::{alerts, outcomes, token_risk, trades, wallet_metrics, wallets, watch_pairs};

use crate::conviction::conviction_score;
use crate::cost::estimate_trade_gas_cost;
use crate::narrator::narrate_alert;
use crate::netev;

pub const WORKER_NAME: &str = "alerts";
pub const COOLDOWN_MINUTES: i64 = 60;
pub const LOOKBACK_HOURS: i64 = 24;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

fn effective_tss(risk: &TokenRisk) -> f64 {
    risk.score
        .or_else(|| risk.components.pointer("/tss/score").and_then(|v| v.as_f64()))
        .unwrap_or(0.0)
}

fn entry_price(trade: &Trade) -> Option<f64> {
    trade.price.or_else(|| match (trade.usd_value, trade.amount) {
        (Some(usd), Some(amount)) if amount > 0.0 => Some(usd / amount),
        _ => None,
    })
}

fn trade_snapshot(trade: &Trade) -> serde_json::Value {
    json!({
        "tx_hash": trade.tx_hash,
        "log_index": trade.log_index,
        "side": trade.side,
        "amount": trade.amount,
        "price": trade.price,
        "usd_value": trade.usd_value,
        "dex": trade.dex,
        "block_time": trade.block_time.map(|t| t.to_rfc3339()),
    })
}

async fn in_cooldown(
    pool: &PgPool,
    trade: &Trade,
    wallet: &str,
    token: &str,
    alert_type: AlertType,
) -> Result<bool> {
    let latest =
        alerts::latest_for(pool, &trade.chain, wallet, token, alert_type.as_str()).await?;
    if let Some(latest) = latest {
        let cooldown_until = latest.created_at + ChronoDuration::minutes(COOLDOWN_MINUTES);
        if Utc::now() < cooldown_until {
            return Ok(true);
        }
    }
    Ok(false)
}

/// One scan cycle; returns the number of alerts created.
pub async fn run_once(settings: &Settings, pool: &PgPool, http: &HttpClient) -> Result<usize> {
    let cutoff = Utc::now() - ChronoDuration::hours(LOOKBACK_HOURS);
    let buys = trades::recent_buys(pool, cutoff).await?;
    let mut created = 0;

    for trade in buys {
        let (Some(wallet), Some(token)) = (trade.wallet_address.clone(), trade.token_address.clone())
        else {
            debug!(tx = %trade.tx_hash, "alert skip: trade missing wallet or token");
            continue;
        };

        let Some(risk) = token_risk::get(pool, &trade.chain, &token).await? else {
            debug!(token = %token, "alert skip: no token risk row");
            continue;
        };
        let tss = effective_tss(&risk);

        // Ignored wallets never alert, including on watchlist pairs.
        if wallets::is_ignored(pool, &trade.chain, &wallet).await? {
            debug!(wallet = %wallet, "alert skip: ignored wallet");
            continue;
        }

        let watched_pair = match &trade.pair_address {
            Some(pair) => watch_pairs::is_active(pool, &trade.chain, pair).await?,
            None => false,
        };

        if watched_pair && trade.usd_value.is_none() {
            if in_cooldown(pool, &trade, &wallet, &token, AlertType::PoolActivity).await? {
                debug!(wallet = %wallet, token = %token, "alert skip: pool activity cooldown");
                continue;
            }
            let size_usd = trade.usd_value.unwrap_or(0.0);
            let conviction = conviction_score(tss, size_usd, settings.tiers.titan);
            let reasons = json!({
                "kind": "pool_activity",
                "pair_address": trade.pair_address,
                "tss": tss,
                "conviction": conviction,
                "cooldown_minutes": COOLDOWN_MINUTES,
                "entry_price": entry_price(&trade),
                "trade": trade_snapshot(&trade),
            });
            let narrative = narrate_alert(settings, http, &reasons).await;
            alerts::insert(
                pool,
                &alerts::NewAlert {
                    chain: trade.chain.clone(),
                    wallet_address: wallet,
                    token_address: Some(token),
                    alert_type: AlertType::PoolActivity.as_str().into(),
                    tss: Some(tss),
                    conviction: Some(conviction),
                    reasons,
                    narrative: Some(narrative),
                },
            )
            .await?;
            created += 1;
            continue;
        }

        let Some(metric) = wallet_metrics::get(pool, &trade.chain, &wallet).await? else {
            debug!(wallet = %wallet, "alert skip: no wallet metric");
            continue;
        };

        if in_cooldown(pool, &trade, &wallet, &token, AlertType::TradeConviction).await? {
            debug!(wallet = %wallet, token = %token, "alert skip: cooldown");
            continue;
        }

        let avg_net = outcomes::avg_valid_net_return(pool, &trade.chain, &token).await?;
        let expected_move = netev::expected_move(settings, &trade.chain, avg_net);
        let slippage = netev::slippage_estimate(settings, Some(&risk));
        let mut conn = pool.acquire().await?;
        let gas = estimate_trade_gas_cost(settings, http, &mut conn, &trade).await?;
        drop(conn);

        let decision = netev::evaluate(
            settings,
            &trade.chain,
            trade.usd_value,
            expected_move,
            slippage,
            &gas,
        );
        if !decision.passed {
            debug!(
                wallet = %wallet,
                token = %token,
                gate = %decision.debug,
                "alert rejected by netev gate"
            );
            continue;
        }

        let total_value = metric.total_value.unwrap_or(0.0);
        let conviction = conviction_score(tss, total_value, settings.tiers.titan);
        let tier = settings.tiers.tier_for_value(total_value);
        let mut netev_reasons = decision.debug.clone();
        netev_reasons["gas_cost_source"] = json!(gas.source);
        let reasons = json!({
            "conviction": conviction,
            "tier": tier.as_str(),
            "wallet_total_value": metric.total_value,
            "tss": tss,
            "cooldown_minutes": COOLDOWN_MINUTES,
            "entry_price": entry_price(&trade),
            "pair_address": trade.pair_address,
            "netev": netev_reasons,
            "trade": trade_snapshot(&trade),
        });
        let narrative = narrate_alert(settings, http, &reasons).await;
        alerts::insert(
            pool,
            &alerts::NewAlert {
                chain: trade.chain.clone(),
                wallet_address: wallet,
                token_address: Some(token),
                alert_type: AlertType::TradeConviction.as_str().into(),
                tss: Some(tss),
                conviction: Some(conviction),
                reasons,
                narrative: Some(narrative),
            },
        )
        .await?;
        created += 1;
    }

    Ok(created)
}

pub async fn run(
    settings: Settings,
    pool: PgPool,
    mut shutdown: Shutdown,
) -> Result<()> {
    let http = HttpClient::with_defaults()?;
    info!("alerts worker started");
    while !shutdown.is_triggered() {
        match run_once(&settings, &pool, &http).await {
            Ok(created) => info!(alerts = created, "alerts cycle complete"),
            Err(err) => warn!(error = %err, "alerts cycle failed"),
        }
        if shutdown.wait_timeout(DEFAULT_INTERVAL).await {
            break;
        }
    }
    info!("alerts worker stopped");
    Ok(())
}
