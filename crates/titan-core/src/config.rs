//! Environment-driven configuration.
//!
//! Every threshold the workers consult lives here with its default, so a
//! deployment can retune the system without a rebuild. `CHAIN_CONFIG` is the
//! one hard requirement: it must name both supported chains and give each at
//! least one RPC endpoint, otherwise startup aborts.

use std::collections::HashMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::errors::TitanError;
use crate::types::{Tier, CHAIN_BSC, CHAIN_ETHEREUM, REQUIRED_CHAINS};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub rpc_http: Option<String>,
    #[serde(default)]
    pub rpc_ws: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TierThresholds {
    pub ocean: f64,
    pub shadow: f64,
    pub titan: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            ocean: 1_000_000.0,
            shadow: 100_000.0,
            titan: 10_000.0,
        }
    }
}

impl TierThresholds {
    pub fn tier_for_value(&self, total_value: f64) -> Tier {
        if total_value >= self.ocean {
            Tier::Ocean
        } else if total_value >= self.shadow {
            Tier::Shadow
        } else if total_value >= self.titan {
            Tier::Titan
        } else {
            Tier::Ignore
        }
    }
}

#[derive(Debug, Clone)]
pub struct MeritSettings {
    pub decay: f64,
    pub prior_constant: f64,
    pub return_clamp_min: f64,
    pub return_clamp_max: f64,
    pub ocean_to_shadow_positive_min: i64,
    pub shadow_to_titan_sample_min: i64,
    pub shadow_to_titan_threshold: f64,
    pub integrity_min: f64,
    pub seed_decay_min_outcomes: i64,
    pub seed_decay_threshold: f64,
    pub seed_decay_target_tier: Tier,
}

impl Default for MeritSettings {
    fn default() -> Self {
        Self {
            decay: 0.85,
            prior_constant: 0.015,
            return_clamp_min: -0.5,
            return_clamp_max: 0.5,
            ocean_to_shadow_positive_min: 3,
            shadow_to_titan_sample_min: 20,
            shadow_to_titan_threshold: 0.08,
            integrity_min: 0.8,
            seed_decay_min_outcomes: 12,
            seed_decay_threshold: -0.02,
            seed_decay_target_tier: Tier::Ocean,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetEvSettings {
    pub expected_move_eth: f64,
    pub expected_move_bsc: f64,
    pub min_usd_profit_eth: f64,
    pub min_usd_profit_bsc: f64,
    pub min_roi_eth: f64,
    pub min_roi_bsc: f64,
    pub gas_cost_usd_eth: f64,
    pub gas_cost_usd_bsc: f64,
    pub default_slippage: f64,
}

impl Default for NetEvSettings {
    fn default() -> Self {
        Self {
            expected_move_eth: 0.08,
            expected_move_bsc: 0.05,
            min_usd_profit_eth: 20.0,
            min_usd_profit_bsc: 6.0,
            min_roi_eth: 0.08,
            min_roi_bsc: 0.05,
            gas_cost_usd_eth: 14.0,
            gas_cost_usd_bsc: 1.2,
            default_slippage: 0.02,
        }
    }
}

impl NetEvSettings {
    pub fn expected_move(&self, chain: &str) -> f64 {
        if chain == CHAIN_BSC {
            self.expected_move_bsc
        } else {
            self.expected_move_eth
        }
    }

    pub fn min_usd_profit(&self, chain: &str) -> f64 {
        if chain == CHAIN_BSC {
            self.min_usd_profit_bsc
        } else {
            self.min_usd_profit_eth
        }
    }

    pub fn min_roi(&self, chain: &str) -> f64 {
        if chain == CHAIN_BSC {
            self.min_roi_bsc
        } else {
            self.min_roi_eth
        }
    }

    pub fn default_gas_cost_usd(&self, chain: &str) -> f64 {
        if chain == CHAIN_BSC {
            self.gas_cost_usd_bsc
        } else {
            self.gas_cost_usd_eth
        }
    }
}

#[derive(Debug, Clone)]
pub struct AutopilotSettings {
    pub liquidity_floor_eth: f64,
    pub liquidity_floor_bsc: f64,
    pub volume_floor_24h: f64,
    pub min_age_hours: f64,
    pub age_fallback_multiplier: f64,
    pub max_pairs_per_chain: i64,
    pub min_sleep_seconds: u64,
    pub max_sleep_seconds: u64,
}

impl Default for AutopilotSettings {
    fn default() -> Self {
        Self {
            liquidity_floor_eth: 50_000.0,
            liquidity_floor_bsc: 25_000.0,
            volume_floor_24h: 50_000.0,
            min_age_hours: 1.0,
            age_fallback_multiplier: 1.5,
            max_pairs_per_chain: 200,
            min_sleep_seconds: 600,
            max_sleep_seconds: 1800,
        }
    }
}

impl AutopilotSettings {
    pub fn liquidity_floor(&self, chain: &str) -> f64 {
        if chain == CHAIN_BSC {
            self.liquidity_floor_bsc
        } else {
            self.liquidity_floor_eth
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub redis_url: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub dexscreener_base_url: String,
    pub goplus_base_url: String,
    pub log_level: String,
    pub api_bind: String,
    pub chain_config: HashMap<String, ChainConfig>,
    pub watched_addresses_eth: Vec<String>,
    pub watched_addresses_bsc: Vec<String>,
    pub tiers: TierThresholds,
    pub merit: MeritSettings,
    pub netev: NetEvSettings,
    pub autopilot: AutopilotSettings,
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

fn var_f64(key: &str, default: f64) -> Result<f64, TitanError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TitanError::Config(format!("{key} is not a number: {raw}"))),
    }
}

fn var_i64(key: &str, default: i64) -> Result<i64, TitanError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TitanError::Config(format!("{key} is not an integer: {raw}"))),
    }
}

fn var_u64(key: &str, default: u64) -> Result<u64, TitanError> {
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| TitanError::Config(format!("{key} is not an integer: {raw}"))),
    }
}

/// Accepts either a JSON array of strings or a comma-separated list.
pub fn parse_address_list(raw: &str) -> Result<Vec<String>, TitanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.starts_with('[') {
        let parsed: Vec<String> = serde_json::from_str(trimmed)
            .map_err(|e| TitanError::Config(format!("bad address list JSON: {e}")))?;
        return Ok(parsed
            .into_iter()
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty())
            .collect());
    }
    Ok(trimmed
        .split(',')
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .collect())
}

fn parse_chain_config(raw: &str) -> Result<HashMap<String, ChainConfig>, TitanError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(HashMap::new());
    }
    let parsed: HashMap<String, ChainConfig> = serde_json::from_str(trimmed)
        .map_err(|e| TitanError::Config(format!("bad CHAIN_CONFIG JSON: {e}")))?;
    Ok(parsed
        .into_iter()
        .map(|(chain, cfg)| (chain.to_lowercase(), cfg))
        .collect())
}

impl Settings {
    pub fn from_env() -> Result<Self, TitanError> {
        let database_url = var("DATABASE_URL")
            .ok_or_else(|| TitanError::Config("DATABASE_URL is required".into()))?;
        let redis_url = var("REDIS_URL")
            .ok_or_else(|| TitanError::Config("REDIS_URL is required".into()))?;

        let chain_config = parse_chain_config(&var_or("CHAIN_CONFIG", ""))?;
        let watched_addresses_eth = parse_address_list(&var_or("WATCHED_ADDRESSES_ETH", ""))?;
        let watched_addresses_bsc = parse_address_list(&var_or("WATCHED_ADDRESSES_BSC", ""))?;

        let tiers = TierThresholds {
            ocean: var_f64("TIER_OCEAN_THRESHOLD", TierThresholds::default().ocean)?,
            shadow: var_f64("TIER_SHADOW_THRESHOLD", TierThresholds::default().shadow)?,
            titan: var_f64("TIER_TITAN_THRESHOLD", TierThresholds::default().titan)?,
        };

        let merit_defaults = MeritSettings::default();
        let merit = MeritSettings {
            decay: var_f64("MERIT_DECAY", merit_defaults.decay)?,
            prior_constant: var_f64("MERIT_PRIOR_CONSTANT", merit_defaults.prior_constant)?,
            return_clamp_min: var_f64("MERIT_RETURN_CLAMP_MIN", merit_defaults.return_clamp_min)?,
            return_clamp_max: var_f64("MERIT_RETURN_CLAMP_MAX", merit_defaults.return_clamp_max)?,
            ocean_to_shadow_positive_min: var_i64(
                "MERIT_OCEAN_TO_SHADOW_POSITIVE_MIN",
                merit_defaults.ocean_to_shadow_positive_min,
            )?,
            shadow_to_titan_sample_min: var_i64(
                "MERIT_SHADOW_TO_TITAN_SAMPLE_MIN",
                merit_defaults.shadow_to_titan_sample_min,
            )?,
            shadow_to_titan_threshold: var_f64(
                "MERIT_SHADOW_TO_TITAN_THRESHOLD",
                merit_defaults.shadow_to_titan_threshold,
            )?,
            integrity_min: var_f64("MERIT_INTEGRITY_MIN", merit_defaults.integrity_min)?,
            seed_decay_min_outcomes: var_i64(
                "MERIT_SEED_DECAY_MIN_OUTCOMES",
                merit_defaults.seed_decay_min_outcomes,
            )?,
            seed_decay_threshold: var_f64(
                "MERIT_SEED_DECAY_THRESHOLD",
                merit_defaults.seed_decay_threshold,
            )?,
            seed_decay_target_tier: var("MERIT_SEED_DECAY_TARGET_TIER")
                .as_deref()
                .map(Tier::parse)
                .transpose()?
                .unwrap_or(merit_defaults.seed_decay_target_tier),
        };

        let netev_defaults = NetEvSettings::default();
        let netev = NetEvSettings {
            expected_move_eth: var_f64("NETEV_EXPECTED_MOVE_ETH", netev_defaults.expected_move_eth)?,
            expected_move_bsc: var_f64("NETEV_EXPECTED_MOVE_BSC", netev_defaults.expected_move_bsc)?,
            min_usd_profit_eth: var_f64(
                "NETEV_MIN_USD_PROFIT_ETH",
                netev_defaults.min_usd_profit_eth,
            )?,
            min_usd_profit_bsc: var_f64(
                "NETEV_MIN_USD_PROFIT_BSC",
                netev_defaults.min_usd_profit_bsc,
            )?,
            min_roi_eth: var_f64("NETEV_MIN_ROI_ETH", netev_defaults.min_roi_eth)?,
            min_roi_bsc: var_f64("NETEV_MIN_ROI_BSC", netev_defaults.min_roi_bsc)?,
            gas_cost_usd_eth: var_f64("NETEV_GAS_COST_USD_ETH", netev_defaults.gas_cost_usd_eth)?,
            gas_cost_usd_bsc: var_f64("NETEV_GAS_COST_USD_BSC", netev_defaults.gas_cost_usd_bsc)?,
            default_slippage: var_f64("NETEV_DEFAULT_SLIPPAGE", netev_defaults.default_slippage)?,
        };

        let ap_defaults = AutopilotSettings::default();
        let autopilot = AutopilotSettings {
            liquidity_floor_eth: var_f64(
                "AUTOPILOT_LIQUIDITY_FLOOR_ETH",
                ap_defaults.liquidity_floor_eth,
            )?,
            liquidity_floor_bsc: var_f64(
                "AUTOPILOT_LIQUIDITY_FLOOR_BSC",
                ap_defaults.liquidity_floor_bsc,
            )?,
            volume_floor_24h: var_f64("AUTOPILOT_VOLUME_FLOOR_24H", ap_defaults.volume_floor_24h)?,
            min_age_hours: var_f64("AUTOPILOT_MIN_AGE_HOURS", ap_defaults.min_age_hours)?,
            age_fallback_multiplier: var_f64(
                "AUTOPILOT_AGE_FALLBACK_MULTIPLIER",
                ap_defaults.age_fallback_multiplier,
            )?,
            max_pairs_per_chain: var_i64(
                "AUTOPILOT_MAX_PAIRS_PER_CHAIN",
                ap_defaults.max_pairs_per_chain,
            )?,
            min_sleep_seconds: var_u64(
                "AUTOPILOT_MIN_SLEEP_SECONDS",
                ap_defaults.min_sleep_seconds,
            )?,
            max_sleep_seconds: var_u64(
                "AUTOPILOT_MAX_SLEEP_SECONDS",
                ap_defaults.max_sleep_seconds,
            )?,
        };

        Ok(Self {
            database_url,
            redis_url,
            ollama_url: var_or("OLLAMA_URL", "http://ollama:11434"),
            ollama_model: var_or("OLLAMA_MODEL", "llama3.1"),
            dexscreener_base_url: var_or(
                "DEXSCREENER_BASE_URL",
                "https://api.dexscreener.com/latest/dex",
            ),
            goplus_base_url: var_or("GOPLUS_BASE_URL", "https://api.gopluslabs.io/api/v1"),
            log_level: var_or("LOG_LEVEL", "info"),
            api_bind: var_or("API_BIND", "0.0.0.0:8000"),
            chain_config,
            watched_addresses_eth,
            watched_addresses_bsc,
            tiers,
            merit,
            netev,
            autopilot,
        })
    }

    /// Fatal-startup check: both required chains present, each reachable.
    pub fn validate_chain_config(&self) -> Result<(), TitanError> {
        if self.chain_config.is_empty() {
            return Err(TitanError::Config(
                "CHAIN_CONFIG is required and must include ethereum and bsc".into(),
            ));
        }
        let missing: Vec<&str> = REQUIRED_CHAINS
            .iter()
            .copied()
            .filter(|chain| !self.chain_config.contains_key(*chain))
            .collect();
        if !missing.is_empty() {
            return Err(TitanError::Config(format!(
                "CHAIN_CONFIG missing chains: {}",
                missing.join(", ")
            )));
        }
        for (chain, cfg) in &self.chain_config {
            if cfg.rpc_http.is_none() && cfg.rpc_ws.is_none() {
                return Err(TitanError::Config(format!(
                    "CHAIN_CONFIG for {chain} must include rpc_http or rpc_ws"
                )));
            }
        }
        Ok(())
    }

    pub fn chain(&self, chain: &str) -> Option<&ChainConfig> {
        self.chain_config.get(chain)
    }

    pub fn rpc_http(&self, chain: &str) -> Option<&str> {
        self.chain(chain).and_then(|c| c.rpc_http.as_deref())
    }

    pub fn rpc_ws(&self, chain: &str) -> Option<&str> {
        self.chain(chain).and_then(|c| c.rpc_ws.as_deref())
    }

    pub fn watched_addresses(&self, chain: &str) -> &[String] {
        match chain {
            CHAIN_ETHEREUM => &self.watched_addresses_eth,
            CHAIN_BSC => &self.watched_addresses_bsc,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_chains(raw: &str) -> Settings {
        Settings {
            database_url: "postgres://localhost/titan".into(),
            redis_url: "redis://localhost".into(),
            ollama_url: String::new(),
            ollama_model: String::new(),
            dexscreener_base_url: String::new(),
            goplus_base_url: String::new(),
            log_level: "info".into(),
            api_bind: String::new(),
            chain_config: parse_chain_config(raw).unwrap(),
            watched_addresses_eth: vec![],
            watched_addresses_bsc: vec![],
            tiers: TierThresholds::default(),
            merit: MeritSettings::default(),
            netev: NetEvSettings::default(),
            autopilot: AutopilotSettings::default(),
        }
    }

    #[test]
    fn address_list_accepts_json_and_csv() {
        let json = parse_address_list(r#"["0xAbC", "0xdef"]"#).unwrap();
        assert_eq!(json, vec!["0xabc", "0xdef"]);
        let csv = parse_address_list("0xAbC, 0xdef ,").unwrap();
        assert_eq!(csv, vec!["0xabc", "0xdef"]);
        assert!(parse_address_list("").unwrap().is_empty());
    }

    #[test]
    fn chain_config_requires_both_chains() {
        let only_eth = settings_with_chains(
            r#"{"ethereum": {"chain_id": 1, "rpc_http": "http://node"}}"#,
        );
        let err = only_eth.validate_chain_config().unwrap_err();
        assert!(err.to_string().contains("bsc"));

        let both = settings_with_chains(
            r#"{"ethereum": {"chain_id": 1, "rpc_http": "http://a"},
                "bsc": {"chain_id": 56, "rpc_ws": "ws://b"}}"#,
        );
        both.validate_chain_config().unwrap();
    }

    #[test]
    fn chain_config_rejects_endpointless_chain() {
        let cfg = settings_with_chains(
            r#"{"ethereum": {"chain_id": 1, "rpc_http": "http://a"},
                "bsc": {"chain_id": 56}}"#,
        );
        assert!(cfg.validate_chain_config().is_err());
    }

    #[test]
    fn netev_constants_switch_on_chain() {
        let netev = NetEvSettings::default();
        assert_eq!(netev.expected_move("ethereum"), 0.08);
        assert_eq!(netev.expected_move("bsc"), 0.05);
        assert_eq!(netev.min_usd_profit("bsc"), 6.0);
        assert_eq!(netev.default_gas_cost_usd("ethereum"), 14.0);
    }

    #[test]
    fn tier_thresholds_bucket_values() {
        let tiers = TierThresholds::default();
        assert_eq!(tiers.tier_for_value(2_000_000.0), Tier::Ocean);
        assert_eq!(tiers.tier_for_value(150_000.0), Tier::Shadow);
        assert_eq!(tiers.tier_for_value(20_000.0), Tier::Titan);
        assert_eq!(tiers.tier_for_value(500.0), Tier::Ignore);
    }
}
