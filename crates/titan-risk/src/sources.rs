//! External token-data sources behind a trait seam, with short in-process
//! TTL caches so a burst of jobs for the same token costs one fetch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use titan_core::http::HttpClient;

pub const DEXSCREENER_CACHE_TTL: Duration = Duration::from_secs(60);
pub const GOPLUS_CACHE_TTL: Duration = Duration::from_secs(300);

#[async_trait]
pub trait TokenDataSource: Send + Sync {
    async fn dexscreener_tokens(&self, token_address: &str) -> Result<Value>;
    async fn goplus_token_security(&self, chain_id: u64, token_address: &str) -> Result<Value>;
}

struct TtlCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (Instant, Value)>>,
}

impl TtlCache {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|(at, _)| at.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    async fn put(&self, key: String, value: Value) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, (at, _)| at.elapsed() < self.ttl);
        entries.insert(key, (Instant::now(), value));
    }
}

pub struct HttpTokenDataSource {
    http: HttpClient,
    dexscreener_base_url: String,
    goplus_base_url: String,
    dexscreener_cache: TtlCache,
    goplus_cache: TtlCache,
}

impl HttpTokenDataSource {
    pub fn new(
        dexscreener_base_url: impl Into<String>,
        goplus_base_url: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            http: HttpClient::with_defaults()?,
            dexscreener_base_url: dexscreener_base_url.into(),
            goplus_base_url: goplus_base_url.into(),
            dexscreener_cache: TtlCache::new(DEXSCREENER_CACHE_TTL),
            goplus_cache: TtlCache::new(GOPLUS_CACHE_TTL),
        })
    }
}

#[async_trait]
impl TokenDataSource for HttpTokenDataSource {
    async fn dexscreener_tokens(&self, token_address: &str) -> Result<Value> {
        let key = token_address.to_lowercase();
        if let Some(cached) = self.dexscreener_cache.get(&key).await {
            return Ok(cached);
        }
        let url = format!("{}/tokens/{}", self.dexscreener_base_url, token_address);
        let payload = self.http.get_json(&url, &[]).await?;
        self.dexscreener_cache.put(key, payload.clone()).await;
        Ok(payload)
    }

    async fn goplus_token_security(&self, chain_id: u64, token_address: &str) -> Result<Value> {
        let key = format!("{chain_id}:{}", token_address.to_lowercase());
        if let Some(cached) = self.goplus_cache.get(&key).await {
            return Ok(cached);
        }
        let url = format!("{}/token_security/{}", self.goplus_base_url, chain_id);
        let payload = self
            .http
            .get_json(&url, &[("contract_addresses", token_address)])
            .await?;
        self.goplus_cache.put(key, payload.clone()).await;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ttl_cache_serves_until_expiry() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache
            .put("k".into(), serde_json::json!({"v": 1}))
            .await;
        assert!(cache.get("k").await.is_some());
        tokio::time::sleep(Duration::from_millis(25)).await;
        assert!(cache.get("k").await.is_none());
    }
}
