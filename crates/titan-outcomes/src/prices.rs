//! Price series for an outcome window: high-confidence decoded trades
//! first, DexScreener anchored at the window end when the chain data is too
//! thin.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::debug;

use titan_core::http::HttpClient;
use titan_storage::models::Alert;
use titan_storage::repos::trades;

use crate::peaks::PricePoint;

pub const DEX_CACHE_TTL: Duration = Duration::from_secs(120);

/// Small in-process cache for DexScreener token payloads.
pub struct DexPriceCache {
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl DexPriceCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(
        &self,
        http: &HttpClient,
        base_url: &str,
        token_address: &str,
    ) -> Option<Value> {
        let key = token_address.to_lowercase();
        {
            let entries = self.entries.lock().await;
            if let Some((at, payload)) = entries.get(&key) {
                if at.elapsed() < DEX_CACHE_TTL {
                    return Some(payload.clone());
                }
            }
        }
        let url = format!("{base_url}/tokens/{token_address}");
        match http.get_json(&url, &[]).await {
            Ok(payload) => {
                let mut entries = self.entries.lock().await;
                entries.insert(key, (Instant::now(), payload.clone()));
                Some(payload)
            }
            Err(err) => {
                debug!(token = %token_address, error = %err, "dexscreener price lookup failed");
                None
            }
        }
    }
}

impl Default for DexPriceCache {
    fn default() -> Self {
        Self::new()
    }
}

pub fn prices_from_payload(payload: &Value, anchor: DateTime<Utc>) -> Vec<PricePoint> {
    let Some(Value::Array(pairs)) = payload.get("pairs") else {
        return Vec::new();
    };
    pairs
        .iter()
        .filter_map(|pair| {
            let price = match pair.get("priceUsd") {
                Some(Value::String(text)) => text.parse::<f64>().ok(),
                Some(Value::Number(number)) => number.as_f64(),
                _ => None,
            }?;
            (price > 0.0).then_some((anchor, price))
        })
        .collect()
}

/// Trades in the window (pair-scoped when the alert knows its pair), padded
/// from DexScreener when fewer than two points exist. The bool is true when
/// even the padded series is too thin to price the window.
pub async fn price_series(
    pool: &PgPool,
    http: &HttpClient,
    cache: &DexPriceCache,
    dexscreener_base_url: &str,
    alert: &Alert,
    token_address: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<(Vec<PricePoint>, bool)> {
    let pair_address = alert.reason_str("pair_address").map(str::to_string);
    let mut prices = trades::price_series(
        pool,
        &alert.chain,
        token_address,
        pair_address.as_deref(),
        start,
        end,
    )
    .await?;

    if prices.len() >= 2 {
        return Ok((prices, false));
    }

    if let Some(payload) = cache.fetch(http, dexscreener_base_url, token_address).await {
        prices.extend(prices_from_payload(&payload, end));
    }
    let insufficient = prices.len() < 2;
    Ok((prices, insufficient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_prices_accept_string_and_number() {
        let anchor = Utc::now();
        let payload = json!({"pairs": [
            {"priceUsd": "1.25"},
            {"priceUsd": 2.5},
            {"priceUsd": "not a number"},
            {"priceUsd": 0.0},
            {},
        ]});
        let prices = prices_from_payload(&payload, anchor);
        assert_eq!(prices.len(), 2);
        assert_eq!(prices[0], (anchor, 1.25));
        assert_eq!(prices[1], (anchor, 2.5));
    }

    #[test]
    fn payload_without_pairs_is_empty() {
        assert!(prices_from_payload(&json!({}), Utc::now()).is_empty());
        assert!(prices_from_payload(&json!({"pairs": "x"}), Utc::now()).is_empty());
    }
}
