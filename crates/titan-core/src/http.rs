//! Shared HTTP client: one pooled reqwest client per worker with bounded
//! retries and a circuit breaker, so a flapping external source degrades to
//! fast failures instead of stacking timeouts.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff: Duration,
    pub max_backoff: Duration,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(5),
            breaker_threshold: 4,
            breaker_cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
struct BreakerState {
    consecutive_failures: u32,
    open_until: Option<Instant>,
}

pub struct HttpClient {
    client: reqwest::Client,
    retry: RetryConfig,
    breaker: Mutex<BreakerState>,
}

impl HttpClient {
    pub fn new(retry: RetryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("titan-service/1.0")
            .build()?;
        Ok(Self {
            client,
            retry,
            breaker: Mutex::new(BreakerState::default()),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(RetryConfig::default())
    }

    fn circuit_open(&self) -> bool {
        let mut state = self.breaker.lock().expect("breaker lock");
        match state.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                state.open_until = None;
                state.consecutive_failures = 0;
                false
            }
            None => false,
        }
    }

    fn record_failure(&self) {
        let mut state = self.breaker.lock().expect("breaker lock");
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.retry.breaker_threshold {
            state.open_until = Some(Instant::now() + self.retry.breaker_cooldown);
            warn!(
                failures = state.consecutive_failures,
                cooldown_secs = self.retry.breaker_cooldown.as_secs(),
                "http circuit opened"
            );
        }
    }

    fn record_success(&self) {
        let mut state = self.breaker.lock().expect("breaker lock");
        state.consecutive_failures = 0;
        state.open_until = None;
    }

    async fn execute(&self, build: impl Fn() -> reqwest::RequestBuilder) -> Result<reqwest::Response> {
        if self.circuit_open() {
            return Err(anyhow!("http circuit breaker open"));
        }
        let mut last_error = None;
        for attempt in 1..=self.retry.attempts {
            match build().send().await.and_then(|r| r.error_for_status()) {
                Ok(response) => {
                    self.record_success();
                    return Ok(response);
                }
                Err(err) => {
                    self.record_failure();
                    last_error = Some(err);
                    if self.circuit_open() || attempt >= self.retry.attempts {
                        break;
                    }
                    let backoff = self
                        .retry
                        .backoff
                        .checked_mul(1 << (attempt - 1))
                        .unwrap_or(self.retry.max_backoff)
                        .min(self.retry.max_backoff);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
        Err(anyhow!(last_error.expect("at least one attempt")))
    }

    pub async fn get_json(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value> {
        let response = self
            .execute(|| self.client.get(url).query(params))
            .await?;
        Ok(response.json().await?)
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let response = self.execute(|| self.client.post(url).json(body)).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_opens_after_threshold_and_recovers() {
        let client = HttpClient::new(RetryConfig {
            breaker_threshold: 2,
            breaker_cooldown: Duration::from_millis(10),
            ..RetryConfig::default()
        })
        .unwrap();

        assert!(!client.circuit_open());
        client.record_failure();
        assert!(!client.circuit_open());
        client.record_failure();
        assert!(client.circuit_open());

        std::thread::sleep(Duration::from_millis(15));
        assert!(!client.circuit_open());
    }

    #[test]
    fn success_resets_failure_count() {
        let client = HttpClient::new(RetryConfig {
            breaker_threshold: 2,
            ..RetryConfig::default()
        })
        .unwrap();
        client.record_failure();
        client.record_success();
        client.record_failure();
        assert!(!client.circuit_open());
    }
}
