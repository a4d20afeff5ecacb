//! Profiler worker: full-refresh accounting, wallet metrics, tier alerts
//! and the merit update, committed as one transaction per cycle.

use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};

use titan_alerts::narrator::narrate_alert;
use titan_core::config::Settings;
use titan_core::http::HttpClient;
use titan_core::shutdown::Shutdown;
use titan_core::types::{AlertType, Tier};
use titan_merit::engine::run_merit_update_once;
use titan_storage::repos::{alerts, positions, trades, wallet_metrics, wallets};

use crate::accounting::{fold_positions, total_value};

pub const WORKER_NAME: &str = "profiler";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(3600);

/// Appends a `wallet_tier` alert unless the same tier was already announced
/// in the last hour. Never announces `ignore`.
async fn maybe_create_tier_alert(
    conn: &mut PgConnection,
    settings: &Settings,
    http: &HttpClient,
    chain: &str,
    wallet_address: &str,
    tier: Tier,
    wallet_total: f64,
) -> Result<bool> {
    if tier == Tier::Ignore {
        return Ok(false);
    }
    let since = Utc::now() - ChronoDuration::hours(1);
    if let Some(existing) = alerts::latest_tier_alert(&mut *conn, chain, wallet_address, since).await? {
        if existing.reason_str("tier") == Some(tier.as_str()) {
            return Ok(false);
        }
    }
    let reasons = json!({
        "tier": tier.as_str(),
        "total_value": wallet_total,
    });
    let narrative = narrate_alert(settings, http, &reasons).await;
    alerts::insert(
        &mut *conn,
        &alerts::NewAlert {
            chain: chain.into(),
            wallet_address: wallet_address.into(),
            token_address: None,
            alert_type: AlertType::WalletTier.as_str().into(),
            tss: None,
            conviction: None,
            reasons,
            narrative: Some(narrative),
        },
    )
    .await?;
    Ok(true)
}

/// One full refresh. Returns the number of wallets updated (or merit rows
/// when accounting had nothing to do).
pub async fn run_once(settings: &Settings, pool: &PgPool, http: &HttpClient) -> Result<usize> {
    let all_trades = trades::all_with_wallet(pool).await?;
    let folded = fold_positions(&all_trades);

    let mut tx = pool.begin().await?;
    let mut updates = 0;

    for ((chain, wallet_address), token_positions) in &folded {
        if wallets::is_ignored(&mut *tx, chain, wallet_address).await? {
            debug!(chain = %chain, wallet = %wallet_address, "profiler skip: ignored wallet");
            continue;
        }
        for (token_address, state) in token_positions {
            positions::upsert(
                &mut *tx,
                chain,
                wallet_address,
                token_address,
                state.quantity,
                state.average_price,
            )
            .await?;
        }
        let wallet_total = total_value(token_positions);
        wallet_metrics::upsert(&mut *tx, chain, wallet_address, wallet_total, 0.0).await?;

        let tier = settings.tiers.tier_for_value(wallet_total);
        maybe_create_tier_alert(
            &mut *tx,
            settings,
            http,
            chain,
            wallet_address,
            tier,
            wallet_total,
        )
        .await?;
        updates += 1;
    }

    let merit_updates = run_merit_update_once(settings, &mut *tx).await?;
    tx.commit().await?;
    Ok(updates.max(merit_updates))
}

pub async fn run(settings: Settings, pool: PgPool, mut shutdown: Shutdown) -> Result<()> {
    let http = HttpClient::with_defaults()?;
    info!("profiler started");
    while !shutdown.is_triggered() {
        match run_once(&settings, &pool, &http).await {
            Ok(updated) => info!(wallets = updated, "profiler snapshot complete"),
            Err(err) => warn!(error = %err, "profiler cycle failed"),
        }
        if shutdown.wait_timeout(DEFAULT_INTERVAL).await {
            break;
        }
    }
    info!("profiler stopped");
    Ok(())
}
