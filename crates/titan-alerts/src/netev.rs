//! The NetEV gate: is this buy worth alerting on after gas and slippage?
//!
//! `netev_usd = size · expected_move − gas − size · slippage`, passing only
//! when both the chain's minimum USD profit and minimum ROI hold. Every
//! rejection carries a structured payload for the debug log.

use serde_json::json;

use titan_core::config::Settings;
use titan_storage::models::TokenRisk;

use crate::cost::GasCostBreakdown;

pub const FAIL_MISSING_SIZE: &str = "missing_trade_size_usd";
pub const FAIL_BELOW_THRESHOLD: &str = "netev_below_threshold";

/// The derived expected move is clamped to this band even when a chain
/// default would exceed it.
pub const EXPECTED_MOVE_CLAMP: (f64, f64) = (0.0, 0.2);

#[derive(Debug, Clone)]
pub struct GateDecision {
    pub passed: bool,
    pub failure_reason: Option<&'static str>,
    pub netev_usd: f64,
    pub netev_roi: f64,
    pub debug: serde_json::Value,
}

/// Mean valid net return for the token when history exists, else the chain
/// constant; always clamped to [0, 0.2].
pub fn expected_move(settings: &Settings, chain: &str, avg_net_return: Option<f64>) -> f64 {
    let raw = avg_net_return.unwrap_or_else(|| settings.netev.expected_move(chain));
    raw.clamp(EXPECTED_MOVE_CLAMP.0, EXPECTED_MOVE_CLAMP.1)
}

/// Per-token slippage from the risk components, defaulting to the configured
/// slippage when the estimate is absent.
pub fn slippage_estimate(settings: &Settings, token_risk: Option<&TokenRisk>) -> f64 {
    token_risk
        .and_then(|risk| risk.component_f64("estimated_slippage"))
        .unwrap_or(settings.netev.default_slippage)
}

pub fn evaluate(
    settings: &Settings,
    chain: &str,
    size_usd: Option<f64>,
    expected_move: f64,
    slippage: f64,
    gas: &GasCostBreakdown,
) -> GateDecision {
    let min_usd_profit = settings.netev.min_usd_profit(chain);
    let min_roi = settings.netev.min_roi(chain);

    let base_debug = json!({
        "expected_move": expected_move,
        "slippage": slippage,
        "gas_cost_usd": gas.gas_cost_usd,
        "gas_cost_source": gas.source,
        "min_usd_profit": min_usd_profit,
        "min_roi_after_costs": min_roi,
    });

    let Some(size_usd) = size_usd.filter(|v| *v > 0.0) else {
        let mut debug = base_debug;
        debug["gate_failure_reason"] = json!(FAIL_MISSING_SIZE);
        return GateDecision {
            passed: false,
            failure_reason: Some(FAIL_MISSING_SIZE),
            netev_usd: 0.0,
            netev_roi: 0.0,
            debug,
        };
    };

    let netev_usd = size_usd * expected_move - gas.gas_cost_usd - size_usd * slippage;
    let netev_roi = netev_usd / size_usd;
    let passed = netev_usd >= min_usd_profit && netev_roi >= min_roi;

    let mut debug = base_debug;
    debug["size_usd"] = json!(size_usd);
    debug["netev_usd"] = json!(netev_usd);
    debug["netev_roi"] = json!(netev_roi);
    if !passed {
        debug["gate_failure_reason"] = json!(FAIL_BELOW_THRESHOLD);
    }

    GateDecision {
        passed,
        failure_reason: (!passed).then_some(FAIL_BELOW_THRESHOLD),
        netev_usd,
        netev_roi,
        debug,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{GasCostBreakdown, SOURCE_CHAIN_DEFAULT};
    use titan_core::config::{
        AutopilotSettings, MeritSettings, NetEvSettings, TierThresholds,
    };

    fn settings() -> Settings {
        Settings {
            database_url: String::new(),
            redis_url: String::new(),
            ollama_url: String::new(),
            ollama_model: String::new(),
            dexscreener_base_url: String::new(),
            goplus_base_url: String::new(),
            log_level: String::new(),
            api_bind: String::new(),
            chain_config: Default::default(),
            watched_addresses_eth: vec![],
            watched_addresses_bsc: vec![],
            tiers: TierThresholds::default(),
            merit: MeritSettings::default(),
            netev: NetEvSettings::default(),
            autopilot: AutopilotSettings::default(),
        }
    }

    fn gas(cost: f64) -> GasCostBreakdown {
        GasCostBreakdown {
            gas_cost_usd: cost,
            source: SOURCE_CHAIN_DEFAULT,
            native_price_usd: None,
            gas_used: None,
            effective_gas_price_wei: None,
            avg_gas_usd_1h: None,
            p95_gas_usd_1h: None,
        }
    }

    #[test]
    fn high_gas_rejects_the_trade() {
        // 500 * 0.08 - 80 - 500 * 0.02 = -50.
        let decision = evaluate(&settings(), "ethereum", Some(500.0), 0.08, 0.02, &gas(80.0));
        assert!(!decision.passed);
        assert_eq!(decision.failure_reason, Some(FAIL_BELOW_THRESHOLD));
        assert!((decision.netev_usd + 50.0).abs() < 1e-9);
        assert_eq!(decision.debug["gate_failure_reason"], FAIL_BELOW_THRESHOLD);
    }

    #[test]
    fn low_gas_passes_with_margin() {
        // 500 * 0.08 - 5 - 500 * 0.02 = 25; roi = 0.05.
        let mut cfg = settings();
        cfg.netev.min_roi_eth = 0.05;
        let decision = evaluate(&cfg, "ethereum", Some(500.0), 0.08, 0.02, &gas(5.0));
        assert!(decision.passed);
        assert!((decision.netev_usd - 25.0).abs() < 1e-9);
        assert!((decision.netev_roi - 0.05).abs() < 1e-9);
        assert_eq!(decision.debug["gas_cost_source"], SOURCE_CHAIN_DEFAULT);
    }

    #[test]
    fn missing_size_fails_with_its_own_reason() {
        let decision = evaluate(&settings(), "ethereum", None, 0.08, 0.02, &gas(5.0));
        assert_eq!(decision.failure_reason, Some(FAIL_MISSING_SIZE));
        let zero = evaluate(&settings(), "ethereum", Some(0.0), 0.08, 0.02, &gas(5.0));
        assert_eq!(zero.failure_reason, Some(FAIL_MISSING_SIZE));
    }

    #[test]
    fn expected_move_prefers_history_and_clamps() {
        let cfg = settings();
        assert_eq!(expected_move(&cfg, "ethereum", Some(0.5)), 0.2);
        assert_eq!(expected_move(&cfg, "ethereum", Some(-0.3)), 0.0);
        assert_eq!(expected_move(&cfg, "bsc", None), 0.05);
        assert_eq!(expected_move(&cfg, "ethereum", None), 0.08);
    }

    #[test]
    fn roi_floor_rejects_thin_margins() {
        // Positive but below the 8% ETH ROI floor:
        // 1000 * 0.08 - 5 - 1000 * 0.05 = 25, roi 0.025.
        let decision = evaluate(&settings(), "ethereum", Some(1000.0), 0.08, 0.05, &gas(5.0));
        assert!(!decision.passed);
    }
}
