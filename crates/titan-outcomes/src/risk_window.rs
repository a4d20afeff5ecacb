//! Risk snapshots inside an alert's horizon window. Snapshots are the
//! loosely-shaped JSON documents the risk worker appends to
//! `components.history`; every read tolerates missing keys.

use std::collections::HashSet;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use titan_storage::models::TokenRisk;

pub const CRITICAL_RISK_FLAGS: [&str; 4] = [
    "honeypot",
    "cannot_sell",
    "liquidity_floor_breach",
    "liquidity_pull",
];

/// Exit-feasibility size floor for the $1k reference position.
pub const EXIT_FEASIBLE_MIN_SIZE_USD: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct WindowAssessment {
    pub sellable: Option<bool>,
    pub trap_flag: bool,
    pub risk_insufficient: bool,
    pub in_window: Vec<Value>,
}

/// History snapshots from a token_risk row; a row without history still
/// yields one synthetic snapshot from its top-level fields.
pub fn extract_snapshots(token_risk: &TokenRisk) -> Vec<Value> {
    if let Some(Value::Array(history)) = token_risk.components.get("history") {
        let snapshots: Vec<Value> = history
            .iter()
            .filter(|item| item.is_object())
            .cloned()
            .collect();
        if !snapshots.is_empty() {
            return snapshots;
        }
    }
    vec![json!({
        "updated_at": token_risk.updated_at.to_rfc3339(),
        "flags": token_risk.flags.clone().unwrap_or(Value::Null),
        "max_suggested_size_usd": token_risk.components.get("max_suggested_size_usd"),
        "liquidity_usd": token_risk
            .components
            .pointer("/tss/dexscreener/max_liquidity_usd"),
    })]
}

pub fn parse_snapshot_time(snapshot: &Value) -> Option<DateTime<Utc>> {
    let raw = snapshot
        .get("updated_at")
        .or_else(|| snapshot.get("timestamp"))
        .or_else(|| snapshot.get("ts"))?;
    match raw {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Number(number) => {
            let mut seconds = number.as_f64()?;
            if seconds > 1_000_000_000_000.0 {
                seconds /= 1000.0;
            }
            Utc.timestamp_opt(seconds as i64, 0).single()
        }
        _ => None,
    }
}

pub fn normalize_flags(value: Option<&Value>) -> HashSet<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.trim().to_lowercase())
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(_, v)| match v {
                Value::Bool(b) => *b,
                Value::Null => false,
                Value::String(s) => !s.is_empty() && s.as_str() != "0",
                Value::Number(n) => n.as_f64() != Some(0.0),
                _ => true,
            })
            .map(|(k, _)| k.trim().to_lowercase())
            .collect(),
        _ => HashSet::new(),
    }
}

fn has_critical_flags(snapshot: &Value) -> bool {
    let flags = normalize_flags(snapshot.get("flags"));
    CRITICAL_RISK_FLAGS.iter().any(|f| flags.contains(*f))
}

/// Fewer than two in-window snapshots means the window cannot be judged;
/// any critical flag inside it makes the window a trap.
pub fn assess_window(
    snapshots: &[Value],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> WindowAssessment {
    let in_window: Vec<Value> = snapshots
        .iter()
        .filter(|snapshot| {
            parse_snapshot_time(snapshot)
                .map(|t| t >= start && t <= end)
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    if in_window.len() < 2 {
        return WindowAssessment {
            sellable: None,
            trap_flag: false,
            risk_insufficient: true,
            in_window,
        };
    }

    if in_window.iter().any(has_critical_flags) {
        return WindowAssessment {
            sellable: Some(false),
            trap_flag: true,
            risk_insufficient: false,
            in_window,
        };
    }

    WindowAssessment {
        sellable: Some(true),
        trap_flag: false,
        risk_insufficient: false,
        in_window,
    }
}

pub fn snapshot_sellable(snapshot: &Value) -> bool {
    for key in ["sellability", "sellable", "can_sell"] {
        if let Some(Value::Bool(flag)) = snapshot.get(key) {
            return *flag;
        }
    }
    !has_critical_flags(snapshot)
}

pub fn snapshot_max_size(snapshot: &Value) -> Option<f64> {
    if let Some(size) = snapshot.get("max_suggested_size_usd").and_then(|v| v.as_f64()) {
        return Some(size);
    }
    snapshot
        .pointer("/components/max_suggested_size_usd")
        .and_then(|v| v.as_f64())
}

/// A snapshot supports exiting a $1k position when it is sellable at size.
pub fn is_exit_feasible(snapshot: &Value) -> bool {
    match snapshot_max_size(snapshot) {
        Some(size) if size >= EXIT_FEASIBLE_MIN_SIZE_USD => snapshot_sellable(snapshot),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(base: DateTime<Utc>, minutes: i64) -> String {
        (base + Duration::minutes(minutes)).to_rfc3339()
    }

    #[test]
    fn single_snapshot_is_insufficient() {
        let base = Utc::now();
        let snapshots = vec![json!({"updated_at": at(base, 5)})];
        let assessment = assess_window(&snapshots, base, base + Duration::hours(1));
        assert_eq!(assessment.sellable, None);
        assert!(assessment.risk_insufficient);
        assert!(!assessment.trap_flag);
    }

    #[test]
    fn critical_flag_marks_trap() {
        let base = Utc::now();
        let snapshots = vec![
            json!({"updated_at": at(base, 5), "flags": ["honeypot"]}),
            json!({"updated_at": at(base, 30), "flags": []}),
        ];
        let assessment = assess_window(&snapshots, base, base + Duration::hours(1));
        assert_eq!(assessment.sellable, Some(false));
        assert!(assessment.trap_flag);
    }

    #[test]
    fn clean_window_is_sellable() {
        let base = Utc::now();
        let snapshots = vec![
            json!({"updated_at": at(base, 5), "flags": []}),
            json!({"updated_at": at(base, 30), "flags": ["low_liquidity"]}),
        ];
        let assessment = assess_window(&snapshots, base, base + Duration::hours(1));
        assert_eq!(assessment.sellable, Some(true));
        assert!(!assessment.trap_flag);
    }

    #[test]
    fn out_of_window_snapshots_are_excluded() {
        let base = Utc::now();
        let snapshots = vec![
            json!({"updated_at": at(base, -10)}),
            json!({"updated_at": at(base, 5)}),
            json!({"updated_at": at(base, 90)}),
        ];
        let assessment = assess_window(&snapshots, base, base + Duration::hours(1));
        assert_eq!(assessment.in_window.len(), 1);
        assert!(assessment.risk_insufficient);
    }

    #[test]
    fn flag_maps_count_truthy_keys_only() {
        let flags = normalize_flags(Some(&json!({
            "honeypot": "1",
            "proxy": "0",
            "mintable": false,
            "blacklisted": true,
        })));
        assert!(flags.contains("honeypot"));
        assert!(flags.contains("blacklisted"));
        assert!(!flags.contains("proxy"));
        assert!(!flags.contains("mintable"));
    }

    #[test]
    fn exit_feasibility_needs_size_and_sellability() {
        assert!(is_exit_feasible(&json!({
            "max_suggested_size_usd": 1500, "sellable": true
        })));
        assert!(!is_exit_feasible(&json!({
            "max_suggested_size_usd": 400, "sellable": true
        })));
        assert!(!is_exit_feasible(&json!({
            "max_suggested_size_usd": 1500, "sellable": false
        })));
        assert!(!is_exit_feasible(&json!({"sellable": true})));
    }

    #[test]
    fn epoch_timestamps_parse_in_seconds_and_millis() {
        let seconds = json!({"updated_at": 1_700_000_000});
        let millis = json!({"updated_at": 1_700_000_000_000i64});
        assert_eq!(
            parse_snapshot_time(&seconds),
            parse_snapshot_time(&millis)
        );
    }
}
