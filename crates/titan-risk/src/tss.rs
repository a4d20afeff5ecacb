//! TSS composition. Starts at 100 and subtracts: 30 when DexScreener shows
//! no pairs, 15 for each of honeypot / blacklisted / proxy / mintable /
//! low-liquidity, floored at 0. The full sub-score breakdown is kept in
//! `components.tss` and a bounded snapshot history feeds the outcome
//! evaluator's risk windows.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

pub const FLAG_DATA_UNAVAILABLE: &str = "data_unavailable";
pub const FLAG_NO_PAIRS: &str = "no_pairs";
pub const FLAG_HONEYPOT: &str = "honeypot";
pub const FLAG_BLACKLISTED: &str = "blacklisted";
pub const FLAG_PROXY: &str = "proxy";
pub const FLAG_MINTABLE: &str = "mintable";
pub const FLAG_LOW_LIQUIDITY: &str = "low_liquidity";

pub const LOW_LIQUIDITY_FLOOR_USD: f64 = 10_000.0;
const HISTORY_LIMIT: usize = 48;

#[derive(Debug, Clone)]
pub struct RiskAssessment {
    pub score: f64,
    pub tss: f64,
    pub flags: Vec<String>,
    pub components: Value,
    pub max_suggested_size_usd: Option<f64>,
    pub sellable: bool,
}

fn pairs_of(dexscreener: &Value) -> Vec<&Value> {
    match dexscreener.get("pairs") {
        Some(Value::Array(pairs)) => pairs.iter().collect(),
        _ => Vec::new(),
    }
}

fn pair_liquidity_usd(pair: &Value) -> Option<f64> {
    pair.get("liquidity")?.get("usd")?.as_f64()
}

/// GoPlus keys its result object by contract address, not always in the
/// caller's casing.
pub fn goplus_token_info<'a>(payload: &'a Value, token_address: &str) -> Option<&'a Value> {
    let result = payload.get("result")?.as_object()?;
    result
        .get(&token_address.to_lowercase())
        .or_else(|| result.get(token_address))
        .or_else(|| result.values().next())
}

fn goplus_flag_set(info: &Value, key: &str) -> bool {
    match info.get(key) {
        Some(Value::String(s)) => s == "1",
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64() == Some(1),
        _ => false,
    }
}

pub fn assess(
    token_address: &str,
    dexscreener: Option<&Value>,
    goplus: Option<&Value>,
) -> RiskAssessment {
    let mut tss = 100.0_f64;
    let mut flags: Vec<String> = Vec::new();

    let pairs = dexscreener.map(pairs_of).unwrap_or_default();
    let max_liquidity = pairs
        .iter()
        .filter_map(|p| pair_liquidity_usd(p))
        .fold(None::<f64>, |acc, liq| {
            Some(acc.map_or(liq, |best| best.max(liq)))
        });

    if pairs.is_empty() {
        tss -= 30.0;
        flags.push(FLAG_NO_PAIRS.into());
    } else if max_liquidity.unwrap_or(0.0) < LOW_LIQUIDITY_FLOOR_USD {
        tss -= 15.0;
        flags.push(FLAG_LOW_LIQUIDITY.into());
    }

    let info = goplus.and_then(|payload| goplus_token_info(payload, token_address));
    let mut goplus_breakdown = serde_json::Map::new();
    if let Some(info) = info {
        for (source_key, flag) in [
            ("is_honeypot", FLAG_HONEYPOT),
            ("is_blacklisted", FLAG_BLACKLISTED),
            ("is_proxy", FLAG_PROXY),
            ("is_mintable", FLAG_MINTABLE),
        ] {
            let set = goplus_flag_set(info, source_key);
            goplus_breakdown.insert(source_key.to_string(), Value::Bool(set));
            if set {
                tss -= 15.0;
                flags.push(flag.into());
            }
        }
    }

    let tss = tss.max(0.0);
    let sellable = !flags.iter().any(|f| f == FLAG_HONEYPOT);
    // Conservative exit sizing: 2% of the deepest pair.
    let max_suggested_size_usd = max_liquidity.map(|liq| liq * 0.02);

    let components = json!({
        "tss": {
            "score": tss,
            "dexscreener": {
                "pair_count": pairs.len(),
                "max_liquidity_usd": max_liquidity,
            },
            "goplus": Value::Object(goplus_breakdown),
        },
        "max_suggested_size_usd": max_suggested_size_usd,
        "sellable": sellable,
        "flags": flags.clone(),
    });

    RiskAssessment {
        score: tss,
        tss,
        flags,
        components,
        max_suggested_size_usd,
        sellable,
    }
}

/// Degraded record written when both upstreams are unreachable; downstream
/// consumers see a scored row rather than a gap.
pub fn unavailable() -> RiskAssessment {
    let flags = vec![FLAG_DATA_UNAVAILABLE.to_string()];
    RiskAssessment {
        score: 0.0,
        tss: 0.0,
        flags: flags.clone(),
        components: json!({
            "tss": {"score": 0.0},
            "flags": flags,
            "sellable": false,
        }),
        max_suggested_size_usd: None,
        sellable: false,
    }
}

/// Carries the previous row's history forward and appends this assessment as
/// a snapshot, bounded to the newest entries.
pub fn attach_history(
    assessment: &mut RiskAssessment,
    previous_components: Option<&Value>,
    now: DateTime<Utc>,
) {
    let mut history: Vec<Value> = previous_components
        .and_then(|c| c.get("history"))
        .and_then(|h| h.as_array())
        .cloned()
        .unwrap_or_default();
    history.push(json!({
        "updated_at": now.to_rfc3339(),
        "flags": assessment.flags,
        "max_suggested_size_usd": assessment.max_suggested_size_usd,
        "sellable": assessment.sellable,
        "liquidity_usd": assessment
            .components
            .pointer("/tss/dexscreener/max_liquidity_usd")
            .cloned()
            .unwrap_or(Value::Null),
    }));
    if history.len() > HISTORY_LIMIT {
        let drop = history.len() - HISTORY_LIMIT;
        history.drain(..drop);
    }
    if let Some(obj) = assessment.components.as_object_mut() {
        obj.insert("history".into(), Value::Array(history));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn dex_with_liquidity(usd: f64) -> Value {
        json!({"pairs": [{"liquidity": {"usd": usd}}]})
    }

    fn goplus_with(flags: &[&str]) -> Value {
        let mut info = serde_json::Map::new();
        for flag in flags {
            info.insert(flag.to_string(), Value::String("1".into()));
        }
        json!({"result": {TOKEN: Value::Object(info)}})
    }

    #[test]
    fn clean_token_scores_full_marks() {
        let assessment = assess(
            TOKEN,
            Some(&dex_with_liquidity(500_000.0)),
            Some(&goplus_with(&[])),
        );
        assert_eq!(assessment.tss, 100.0);
        assert!(assessment.flags.is_empty());
        assert!(assessment.sellable);
        assert_eq!(assessment.max_suggested_size_usd, Some(10_000.0));
    }

    #[test]
    fn no_pairs_costs_thirty() {
        let assessment = assess(TOKEN, Some(&json!({"pairs": []})), None);
        assert_eq!(assessment.tss, 70.0);
        assert_eq!(assessment.flags, vec![FLAG_NO_PAIRS]);
    }

    #[test]
    fn each_goplus_flag_costs_fifteen() {
        let assessment = assess(
            TOKEN,
            Some(&dex_with_liquidity(500_000.0)),
            Some(&goplus_with(&["is_honeypot", "is_proxy"])),
        );
        assert_eq!(assessment.tss, 70.0);
        assert!(assessment.flags.contains(&FLAG_HONEYPOT.to_string()));
        assert!(assessment.flags.contains(&FLAG_PROXY.to_string()));
        assert!(!assessment.sellable);
    }

    #[test]
    fn low_liquidity_penalized_and_score_floors_at_zero() {
        let assessment = assess(
            TOKEN,
            Some(&dex_with_liquidity(5_000.0)),
            Some(&goplus_with(&[
                "is_honeypot",
                "is_blacklisted",
                "is_proxy",
                "is_mintable",
            ])),
        );
        // 100 - 15 (low liquidity) - 4*15 = 25; well above zero, so also
        // check the floor with no pairs at all.
        assert_eq!(assessment.tss, 25.0);

        let floored = assess(
            TOKEN,
            Some(&json!({"pairs": []})),
            Some(&goplus_with(&[
                "is_honeypot",
                "is_blacklisted",
                "is_proxy",
                "is_mintable",
            ])),
        );
        assert_eq!(floored.tss, 10.0);
    }

    #[test]
    fn unavailable_record_is_flagged_not_dropped() {
        let degraded = unavailable();
        assert_eq!(degraded.score, 0.0);
        assert_eq!(degraded.flags, vec![FLAG_DATA_UNAVAILABLE]);
    }

    #[test]
    fn history_appends_and_stays_bounded() {
        let now = Utc::now();
        let mut previous = assess(TOKEN, Some(&dex_with_liquidity(100_000.0)), None);
        attach_history(&mut previous, None, now);
        assert_eq!(
            previous.components["history"].as_array().unwrap().len(),
            1
        );

        let mut next = assess(TOKEN, Some(&dex_with_liquidity(90_000.0)), None);
        attach_history(&mut next, Some(&previous.components), now);
        assert_eq!(next.components["history"].as_array().unwrap().len(), 2);
    }
}
