//! Trade gas cost estimation. Preference order: the transaction's own
//! receipt priced in USD (recording an observation and refreshing the
//! chain's rolling 1 h estimate), then the rolling p95, then the chain
//! default.

use anyhow::Result;
use chrono::{Duration, Utc};
use serde_json::json;
use sqlx::PgConnection;
use tracing::debug;

use titan_chain::rpc::RpcClient;
use titan_core::config::Settings;
use titan_core::http::HttpClient;
use titan_storage::models::Trade;
use titan_storage::repos::gas;

const NATIVE_PRICE_URL: &str = "https://api.coingecko.com/api/v3/simple/price";

pub const SOURCE_RECEIPT: &str = "receipt_actual";
pub const SOURCE_ROLLING_P95: &str = "rolling_p95_1h";
pub const SOURCE_CHAIN_DEFAULT: &str = "chain_default";

#[derive(Debug, Clone)]
pub struct GasCostBreakdown {
    pub gas_cost_usd: f64,
    pub source: &'static str,
    pub native_price_usd: Option<f64>,
    pub gas_used: Option<u128>,
    pub effective_gas_price_wei: Option<u128>,
    pub avg_gas_usd_1h: Option<f64>,
    pub p95_gas_usd_1h: Option<f64>,
}

impl GasCostBreakdown {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "gas_cost_usd": self.gas_cost_usd,
            "source": self.source,
            "native_price_usd": self.native_price_usd,
            "gas_used": self.gas_used.map(|g| g as f64),
            "effective_gas_price_wei": self.effective_gas_price_wei.map(|p| p as f64),
            "avg_gas_usd_1h": self.avg_gas_usd_1h,
            "p95_gas_usd_1h": self.p95_gas_usd_1h,
        })
    }
}

fn native_coin_id(chain: &str) -> Option<&'static str> {
    match chain {
        "ethereum" => Some("ethereum"),
        "bsc" => Some("binancecoin"),
        _ => None,
    }
}

async fn native_price_usd(http: &HttpClient, chain: &str) -> Option<f64> {
    let coin = native_coin_id(chain)?;
    let payload = http
        .get_json(NATIVE_PRICE_URL, &[("ids", coin), ("vs_currencies", "usd")])
        .await
        .ok()?;
    payload.get(coin)?.get("usd")?.as_f64()
}

/// Inclusive p95 over the sorted sample, matching the statistics the
/// operators compare against.
pub fn percentile_95(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("finite gas costs"));
    if sorted.len() == 1 {
        return Some(sorted[0]);
    }
    let rank = 0.95 * (sorted.len() - 1) as f64;
    let low = rank.floor() as usize;
    let high = rank.ceil() as usize;
    if low == high {
        return Some(sorted[low]);
    }
    let weight = rank - low as f64;
    Some(sorted[low] * (1.0 - weight) + sorted[high] * weight)
}

async fn refresh_chain_estimate(
    conn: &mut PgConnection,
    chain: &str,
) -> Result<Option<(f64, f64, i32)>> {
    let cutoff = Utc::now() - Duration::hours(1);
    let costs = gas::costs_since(&mut *conn, chain, cutoff).await?;
    if costs.is_empty() {
        return Ok(None);
    }
    let avg = costs.iter().sum::<f64>() / costs.len() as f64;
    let p95 = percentile_95(&costs).expect("non-empty sample");
    gas::upsert_estimate(&mut *conn, chain, avg, p95, costs.len() as i32).await?;
    Ok(Some((avg, p95, costs.len() as i32)))
}

/// Gas cost for one trade, with the provenance the gate records in its debug
/// payload.
pub async fn estimate_trade_gas_cost(
    settings: &Settings,
    http: &HttpClient,
    conn: &mut PgConnection,
    trade: &Trade,
) -> Result<GasCostBreakdown> {
    let default_cost = settings.netev.default_gas_cost_usd(&trade.chain);

    let receipt = match settings.rpc_http(&trade.chain) {
        Some(url) => {
            let rpc = RpcClient::new(http, url);
            match rpc.transaction_receipt(&trade.tx_hash).await {
                Ok(receipt) => receipt,
                Err(err) => {
                    debug!(chain = %trade.chain, tx = %trade.tx_hash, error = %err,
                        "receipt lookup failed");
                    None
                }
            }
        }
        None => None,
    };

    if let Some(receipt) = receipt {
        if let (Some(gas_used), Some(price_wei), Some(fee_wei)) = (
            receipt.gas_used(),
            receipt.effective_gas_price_wei(),
            receipt.fee_wei(),
        ) {
            if let Some(native_price) = native_price_usd(http, &trade.chain).await {
                let gas_cost_usd = (fee_wei as f64 / 1e18) * native_price;
                gas::record_observation(
                    &mut *conn,
                    &trade.chain,
                    &trade.tx_hash,
                    gas_cost_usd,
                    Utc::now(),
                )
                .await?;
                let estimate = refresh_chain_estimate(&mut *conn, &trade.chain).await?;
                return Ok(GasCostBreakdown {
                    gas_cost_usd,
                    source: SOURCE_RECEIPT,
                    native_price_usd: Some(native_price),
                    gas_used: Some(gas_used),
                    effective_gas_price_wei: Some(price_wei),
                    avg_gas_usd_1h: estimate.map(|(avg, _, _)| avg),
                    p95_gas_usd_1h: estimate.map(|(_, p95, _)| p95),
                });
            }
        }
    }

    let estimate = gas::get_estimate(&mut *conn, &trade.chain).await?;
    if let Some(estimate) = &estimate {
        if let Some(p95) = estimate.p95_gas_usd_1h {
            return Ok(GasCostBreakdown {
                gas_cost_usd: p95,
                source: SOURCE_ROLLING_P95,
                native_price_usd: None,
                gas_used: None,
                effective_gas_price_wei: None,
                avg_gas_usd_1h: estimate.avg_gas_usd_1h,
                p95_gas_usd_1h: Some(p95),
            });
        }
    }

    Ok(GasCostBreakdown {
        gas_cost_usd: default_cost,
        source: SOURCE_CHAIN_DEFAULT,
        native_price_usd: None,
        gas_used: None,
        effective_gas_price_wei: None,
        avg_gas_usd_1h: estimate.as_ref().and_then(|e| e.avg_gas_usd_1h),
        p95_gas_usd_1h: estimate.as_ref().and_then(|e| e.p95_gas_usd_1h),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn p95_of_single_sample_is_that_sample() {
        assert_eq!(percentile_95(&[4.2]), Some(4.2));
        assert_eq!(percentile_95(&[]), None);
    }

    #[test]
    fn p95_sits_near_the_top_of_the_sample() {
        let values: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let p95 = percentile_95(&values).unwrap();
        assert!(p95 > 94.0 && p95 < 96.5, "p95 was {p95}");
    }

    #[test]
    fn native_coins_cover_both_chains() {
        assert_eq!(native_coin_id("ethereum"), Some("ethereum"));
        assert_eq!(native_coin_id("bsc"), Some("binancecoin"));
        assert_eq!(native_coin_id("solana"), None);
    }
}
