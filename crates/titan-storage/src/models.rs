//! Row types for the Postgres schema. JSONB columns come back as
//! `serde_json::Value` and are read defensively: a missing or oddly-shaped
//! key means "default", never an error.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

use titan_core::types::Tier;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Wallet {
    pub chain: String,
    pub address: String,
    pub source: String,
    pub prior_weight: Decimal,
    pub merit_score: Decimal,
    pub tier: Option<String>,
    pub tier_reason: Option<serde_json::Value>,
    pub ignore_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Wallet {
    pub fn tier_enum(&self) -> Option<Tier> {
        self.tier.as_deref().and_then(|t| Tier::parse(t).ok())
    }

    pub fn is_ignored(&self) -> bool {
        self.tier_enum() == Some(Tier::Ignore)
    }

    /// Reads a boolean flag out of `tier_reason`, defaulting to false.
    pub fn reason_flag(&self, key: &str) -> bool {
        self.tier_reason
            .as_ref()
            .and_then(|r| r.get(key))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn reason_f64(&self, key: &str) -> Option<f64> {
        self.tier_reason
            .as_ref()
            .and_then(|r| r.get(key))
            .and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Token {
    pub chain: String,
    pub address: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WatchPair {
    pub chain: String,
    pub pair_address: String,
    pub dex: Option<String>,
    pub token0_symbol: Option<String>,
    pub token0_address: Option<String>,
    pub token1_symbol: Option<String>,
    pub token1_address: Option<String>,
    pub source: String,
    pub priority: i32,
    pub score: Decimal,
    pub reason: Option<serde_json::Value>,
    pub expires_at: DateTime<Utc>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Trade {
    pub chain: String,
    pub tx_hash: String,
    pub log_index: i32,
    pub block_number: Option<i64>,
    pub wallet_address: Option<String>,
    pub token_address: Option<String>,
    pub side: Option<String>,
    pub amount: Option<f64>,
    pub price: Option<f64>,
    pub usd_value: Option<f64>,
    pub block_time: Option<DateTime<Utc>>,
    pub dex: Option<String>,
    pub pair_address: Option<String>,
    pub decode_confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Position {
    pub id: Uuid,
    pub chain: String,
    pub wallet_address: String,
    pub token_address: String,
    pub quantity: f64,
    pub average_price: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WalletMetric {
    pub id: Uuid,
    pub chain: String,
    pub wallet_address: String,
    pub total_value: Option<f64>,
    pub pnl: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TokenRisk {
    pub chain: String,
    pub address: String,
    pub score: Option<f64>,
    pub tss: Option<f64>,
    pub flags: Option<serde_json::Value>,
    pub components: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

impl TokenRisk {
    pub fn flag_list(&self) -> Vec<String> {
        match &self.flags {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_lowercase())
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn component_f64(&self, key: &str) -> Option<f64> {
        self.components.get(key).and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub chain: String,
    pub wallet_address: String,
    pub token_address: Option<String>,
    pub alert_type: String,
    pub tss: Option<f64>,
    pub conviction: Option<f64>,
    pub reasons: serde_json::Value,
    pub narrative: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    pub fn reason_f64(&self, key: &str) -> Option<f64> {
        self.reasons.get(key).and_then(|v| v.as_f64())
    }

    pub fn reason_str(&self, key: &str) -> Option<&str> {
        self.reasons.get(key).and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SignalOutcome {
    pub id: i64,
    pub alert_id: Uuid,
    pub horizon_minutes: i32,
    pub was_sellable_entire_window: Option<bool>,
    pub min_exit_slippage_1k: Option<Decimal>,
    pub max_exit_slippage_1k: Option<Decimal>,
    pub tradeable_peak_gain: Option<Decimal>,
    pub exit_feasible_peak_gain: Option<Decimal>,
    pub exit_feasible_peak_time: Option<DateTime<Utc>>,
    pub tradeable_drawdown: Option<Decimal>,
    pub net_tradeable_return_est: Option<Decimal>,
    pub trap_flag: Option<bool>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChainGasEstimate {
    pub chain: String,
    pub avg_gas_usd_1h: Option<f64>,
    pub p95_gas_usd_1h: Option<f64>,
    pub samples_1h: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SettingRow {
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(tier: Option<&str>, reason: Option<serde_json::Value>) -> Wallet {
        Wallet {
            chain: "ethereum".into(),
            address: "0xabc".into(),
            source: "autopilot".into(),
            prior_weight: Decimal::ZERO,
            merit_score: Decimal::ZERO,
            tier: tier.map(str::to_string),
            tier_reason: reason,
            ignore_reason: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn ignored_wallet_detection() {
        assert!(wallet(Some("ignore"), None).is_ignored());
        assert!(!wallet(Some("titan"), None).is_ignored());
        assert!(!wallet(None, None).is_ignored());
    }

    #[test]
    fn reason_reads_are_defensive() {
        let w = wallet(
            Some("shadow"),
            Some(serde_json::json!({"bot_suspect": true, "integrity_score": 0.9})),
        );
        assert!(w.reason_flag("bot_suspect"));
        assert!(!w.reason_flag("copycat_dominant"));
        assert_eq!(w.reason_f64("integrity_score"), Some(0.9));
        assert!(wallet(None, None).reason_f64("integrity_score").is_none());
    }

    #[test]
    fn token_risk_flags_normalize() {
        let risk = TokenRisk {
            chain: "bsc".into(),
            address: "0xdef".into(),
            score: Some(55.0),
            tss: Some(55.0),
            flags: Some(serde_json::json!(["Honeypot", "low_liquidity"])),
            components: serde_json::json!({}),
            updated_at: Utc::now(),
        };
        assert_eq!(risk.flag_list(), vec!["honeypot", "low_liquidity"]);
    }
}
