//! Outcome evaluator worker: for each horizon, judge every mature alert
//! that still lacks an outcome row, and insert it idempotently.

use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};

use titan_core::config::Settings;
use titan_core::http::HttpClient;
use titan_core::shutdown::Shutdown;
use titan_storage::models::Alert;
use titan_storage::repos::{alerts, outcomes, token_risk};

use crate::peaks::{drawdown, entry_price, exit_feasible_peak, net_return, raw_peak_gain};
use crate::prices::{price_series, DexPriceCache};
use crate::risk_window::{assess_window, extract_snapshots};
use crate::slippage::estimate_slippage;

pub const WORKER_NAME: &str = "outcomes";
pub const HORIZONS_MINUTES: [i32; 3] = [30, 360, 1440];
pub const RUN_INTERVAL: Duration = Duration::from_secs(300);
const BATCH_LIMIT: i64 = 200;

fn to_decimal(value: Option<f64>) -> Option<Decimal> {
    value.and_then(|v| Decimal::from_f64((v * 1e8).round() / 1e8))
}

pub async fn evaluate_alert_horizon(
    settings: &Settings,
    pool: &PgPool,
    http: &HttpClient,
    cache: &DexPriceCache,
    alert: &Alert,
    horizon_minutes: i32,
) -> Result<Option<outcomes::NewSignalOutcome>> {
    let Some(token_address) = alert.token_address.clone() else {
        return Ok(None);
    };

    let window_start = alert.created_at;
    let window_end = alert.created_at + ChronoDuration::minutes(horizon_minutes as i64);

    let snapshots = match token_risk::get(pool, &alert.chain, &token_address).await? {
        Some(risk) => extract_snapshots(&risk),
        None => Vec::new(),
    };
    let window = assess_window(&snapshots, window_start, window_end);

    let (min_slippage, max_slippage) = if window.in_window.is_empty() {
        (None, None)
    } else {
        estimate_slippage(&window.in_window)
    };

    let (prices, prices_insufficient) = price_series(
        pool,
        http,
        cache,
        &settings.dexscreener_base_url,
        alert,
        &token_address,
        window_start,
        window_end,
    )
    .await?;
    let entry = entry_price(&alert.reasons, &prices);

    let mut peak_gain = None;
    let mut peak_drawdown = None;
    let mut exit_gain = None;
    let mut exit_time = None;
    let mut was_sellable = window.sellable;

    if !prices_insufficient {
        if let Some(entry) = entry.filter(|e| *e > 0.0) {
            let raw = raw_peak_gain(&prices, entry);
            peak_drawdown = drawdown(&prices, entry);

            let feasible = exit_feasible_peak(&prices, &window.in_window, entry);
            exit_gain = feasible.gain;
            exit_time = feasible.at;
            if feasible.gain.is_some() {
                peak_gain = raw;
                was_sellable = Some(feasible.was_sellable_entire_window);
            } else {
                // No reachable exit: the window was not tradeable at size.
                peak_gain = None;
                was_sellable = Some(false);
            }
        }
    }

    let net = net_return(peak_gain, max_slippage, window.trap_flag, was_sellable);

    Ok(Some(outcomes::NewSignalOutcome {
        alert_id: alert.id,
        horizon_minutes,
        was_sellable_entire_window: was_sellable,
        min_exit_slippage_1k: to_decimal(min_slippage),
        max_exit_slippage_1k: to_decimal(max_slippage),
        tradeable_peak_gain: to_decimal(peak_gain),
        exit_feasible_peak_gain: to_decimal(exit_gain),
        exit_feasible_peak_time: exit_time,
        tradeable_drawdown: to_decimal(peak_drawdown),
        net_tradeable_return_est: to_decimal(net),
        trap_flag: Some(window.trap_flag),
    }))
}

pub async fn run_once(
    settings: &Settings,
    pool: &PgPool,
    http: &HttpClient,
    cache: &DexPriceCache,
) -> Result<usize> {
    let now = Utc::now();
    let mut inserted = 0;

    for horizon in HORIZONS_MINUTES {
        let cutoff = now - ChronoDuration::minutes(horizon as i64);
        let eligible = alerts::eligible_for_horizon(pool, cutoff, horizon, BATCH_LIMIT).await?;
        for alert in eligible {
            let Some(outcome) =
                evaluate_alert_horizon(settings, pool, http, cache, &alert, horizon).await?
            else {
                continue;
            };
            if outcomes::insert(pool, &outcome).await? {
                inserted += 1;
            }
        }
    }

    info!(inserted, "outcome evaluator cycle complete");
    Ok(inserted)
}

pub async fn run(settings: Settings, pool: PgPool, mut shutdown: Shutdown) -> Result<()> {
    let http = HttpClient::with_defaults()?;
    let cache = DexPriceCache::new();
    info!("outcome evaluator started");
    while !shutdown.is_triggered() {
        if let Err(err) = run_once(&settings, &pool, &http, &cache).await {
            warn!(error = %err, "outcome evaluator cycle failed");
        }
        if shutdown.wait_timeout(RUN_INTERVAL).await {
            break;
        }
    }
    info!("outcome evaluator stopped");
    Ok(())
}
