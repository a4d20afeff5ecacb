//! Autopilot candidate filtering and churn selection. Everything that can
//! be judged without I/O lives here; the worker handles fetching and
//! persistence.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use titan_core::config::AutopilotSettings;
use titan_storage::models::WatchPair;
use titan_storage::repos::watch_pairs::SEED_PACK_SOURCE;

pub const CRITICAL_GOPLUS_FLAGS: [&str; 2] = ["is_honeypot", "is_blacklisted"];

#[derive(Debug, Clone)]
pub struct CandidatePair {
    pub chain: String,
    pub pair_address: String,
    pub dex: Option<String>,
    pub token0_symbol: Option<String>,
    pub token0_address: Option<String>,
    pub token1_symbol: Option<String>,
    pub token1_address: Option<String>,
    pub liquidity_usd: f64,
    pub volume_24h: f64,
    pub age_hours: Option<f64>,
}

fn lower_opt(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
}

fn str_opt(value: Option<&Value>) -> Option<String> {
    value
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// DexScreener reports `pairCreatedAt` in epoch millis (sometimes seconds);
/// anything smaller is unusable.
pub fn pair_age_hours(created_at: Option<&Value>, now: DateTime<Utc>) -> Option<f64> {
    let raw = created_at?.as_f64()?;
    let seconds = if raw > 1_000_000_000_000.0 {
        raw / 1000.0
    } else if raw > 1_000_000_000.0 {
        raw
    } else {
        return None;
    };
    let created = Utc.timestamp_opt(seconds as i64, 0).single()?;
    Some(((now - created).num_seconds() as f64 / 3600.0).max(0.0))
}

/// Parses one DexScreener search result for the given chain; `None` when it
/// belongs to another chain or has no usable pair address.
pub fn parse_pair(chain: &str, pair: &Value, now: DateTime<Utc>) -> Option<CandidatePair> {
    let pair_chain = pair.get("chainId").and_then(|v| v.as_str())?.to_lowercase();
    if pair_chain != chain {
        return None;
    }
    let pair_address = lower_opt(pair.get("pairAddress"))?;
    let base = pair.get("baseToken");
    let quote = pair.get("quoteToken");
    Some(CandidatePair {
        chain: chain.to_string(),
        pair_address,
        dex: str_opt(pair.get("dexId")),
        token0_symbol: str_opt(base.and_then(|t| t.get("symbol"))),
        token0_address: lower_opt(base.and_then(|t| t.get("address"))),
        token1_symbol: str_opt(quote.and_then(|t| t.get("symbol"))),
        token1_address: lower_opt(quote.and_then(|t| t.get("address"))),
        liquidity_usd: pair
            .pointer("/liquidity/usd")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        volume_24h: pair
            .pointer("/volume/h24")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        age_hours: pair_age_hours(pair.get("pairCreatedAt"), now),
    })
}

/// Quality gate: liquidity and volume floors, plus the age minimum. A pair
/// of unknown age must clear both floors at the fallback multiplier
/// instead.
pub fn passes_quality(settings: &AutopilotSettings, candidate: &CandidatePair) -> bool {
    let liquidity_floor = settings.liquidity_floor(&candidate.chain);
    let volume_floor = settings.volume_floor_24h;
    if candidate.liquidity_usd < liquidity_floor || candidate.volume_24h < volume_floor {
        return false;
    }
    match candidate.age_hours {
        Some(age) => age >= settings.min_age_hours,
        None => {
            candidate.liquidity_usd >= liquidity_floor * settings.age_fallback_multiplier
                && candidate.volume_24h >= volume_floor * settings.age_fallback_multiplier
        }
    }
}

pub fn priority_score(liquidity_usd: f64, volume_24h: f64) -> i32 {
    (liquidity_usd / 1000.0 + volume_24h / 500.0).min(10_000.0) as i32
}

/// GoPlus critical-flag check on the payload for one token.
pub fn has_critical_goplus_flags(payload: &Value, token_address: &str) -> bool {
    let Some(result) = payload.get("result").and_then(|v| v.as_object()) else {
        return false;
    };
    let info = result
        .get(&token_address.to_lowercase())
        .or_else(|| result.get(token_address));
    let Some(info) = info else {
        return false;
    };
    CRITICAL_GOPLUS_FLAGS.iter().any(|flag| match info.get(*flag) {
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        _ => false,
    })
}

/// Churn: the total active set is capped, seed-pack rows are untouchable,
/// and the cap is filled best-first. Input must be sorted best-first;
/// returns the pair addresses to demote.
pub fn select_for_demotion(active: &[WatchPair], cap: usize) -> Vec<String> {
    let protected = active
        .iter()
        .filter(|p| p.source == SEED_PACK_SOURCE)
        .count();
    let keep = cap.saturating_sub(protected);
    active
        .iter()
        .filter(|p| p.source != SEED_PACK_SOURCE)
        .skip(keep)
        .map(|p| p.pair_address.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn settings() -> AutopilotSettings {
        AutopilotSettings::default()
    }

    fn candidate(liquidity: f64, volume: f64, age_hours: Option<f64>) -> CandidatePair {
        CandidatePair {
            chain: "ethereum".into(),
            pair_address: "0xpair".into(),
            dex: Some("uniswap".into()),
            token0_symbol: None,
            token0_address: None,
            token1_symbol: None,
            token1_address: None,
            liquidity_usd: liquidity,
            volume_24h: volume,
            age_hours,
        }
    }

    fn pair(address: &str, source: &str, priority: i32) -> WatchPair {
        WatchPair {
            chain: "ethereum".into(),
            pair_address: address.into(),
            dex: None,
            token0_symbol: None,
            token0_address: None,
            token1_symbol: None,
            token1_address: None,
            source: source.into(),
            priority,
            score: Decimal::ZERO,
            reason: None,
            expires_at: Utc::now() + Duration::hours(6),
            last_seen: Some(Utc::now()),
        }
    }

    #[test]
    fn quality_floors_apply() {
        assert!(passes_quality(&settings(), &candidate(60_000.0, 60_000.0, Some(2.0))));
        assert!(!passes_quality(&settings(), &candidate(10_000.0, 60_000.0, Some(2.0))));
        assert!(!passes_quality(&settings(), &candidate(60_000.0, 10_000.0, Some(2.0))));
        assert!(!passes_quality(&settings(), &candidate(60_000.0, 60_000.0, Some(0.2))));
    }

    #[test]
    fn unknown_age_requires_multiplied_floors() {
        // 1.5x floors: 75k liquidity, 75k volume.
        assert!(!passes_quality(&settings(), &candidate(60_000.0, 60_000.0, None)));
        assert!(passes_quality(&settings(), &candidate(80_000.0, 80_000.0, None)));
    }

    #[test]
    fn priority_formula_caps() {
        assert_eq!(priority_score(100_000.0, 50_000.0), 200);
        assert_eq!(priority_score(1e9, 1e9), 10_000);
    }

    #[test]
    fn goplus_flags_detect_stringly_truth() {
        let payload = json!({"result": {"0xtoken": {"is_honeypot": "1"}}});
        assert!(has_critical_goplus_flags(&payload, "0xTOKEN"));
        let clean = json!({"result": {"0xtoken": {"is_honeypot": "0", "is_blacklisted": ""}}});
        assert!(!has_critical_goplus_flags(&clean, "0xtoken"));
        assert!(!has_critical_goplus_flags(&json!({}), "0xtoken"));
    }

    #[test]
    fn churn_respects_cap_and_preserves_seed_pack() {
        // One seed anchor plus ten autopilot pairs, cap five: six autopilot
        // pairs must go, the seed anchor never.
        let mut active = vec![pair("0xseed", "seed_pack", 100)];
        for i in 0..10 {
            active.push(pair(&format!("0xap{i}"), "autopilot", 50 - i));
        }
        active.sort_by(|a, b| b.priority.cmp(&a.priority));

        let demoted = select_for_demotion(&active, 5);
        assert_eq!(demoted.len(), 6);
        assert!(!demoted.iter().any(|p| p == "0xseed"));
        // The best autopilot pairs survive.
        assert!(!demoted.contains(&"0xap0".to_string()));
        assert!(demoted.contains(&"0xap9".to_string()));
    }

    #[test]
    fn churn_with_room_demotes_nothing() {
        let active = vec![pair("0xa", "autopilot", 10), pair("0xb", "seed_pack", 5)];
        assert!(select_for_demotion(&active, 5).is_empty());
    }

    #[test]
    fn parse_pair_filters_other_chains() {
        let now = Utc::now();
        let payload = json!({
            "chainId": "bsc",
            "pairAddress": "0xPAIR",
            "baseToken": {"symbol": "AAA", "address": "0xAAA0000000000000000000000000000000000000"},
            "liquidity": {"usd": 80_000.0},
            "volume": {"h24": 90_000.0},
        });
        assert!(parse_pair("ethereum", &payload, now).is_none());
        let parsed = parse_pair("bsc", &payload, now).unwrap();
        assert_eq!(parsed.pair_address, "0xpair");
        assert_eq!(parsed.liquidity_usd, 80_000.0);
        assert!(parsed.age_hours.is_none());
    }

    #[test]
    fn age_parses_millis_and_seconds() {
        let now = Utc.timestamp_opt(1_700_003_600, 0).single().unwrap();
        let millis = json!(1_700_000_000_000i64);
        let seconds = json!(1_700_000_000);
        assert_eq!(pair_age_hours(Some(&millis), now), Some(1.0));
        assert_eq!(pair_age_hours(Some(&seconds), now), Some(1.0));
        assert_eq!(pair_age_hours(Some(&json!(12345)), now), None);
        assert_eq!(pair_age_hours(None, now), None);
    }
}
