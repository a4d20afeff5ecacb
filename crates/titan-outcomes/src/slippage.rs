//! Exit-slippage bounds for a $1k position, from direct estimates when the
//! snapshots carry them, otherwise derived from suggested size or liquidity.

use serde_json::Value;

use crate::risk_window::snapshot_max_size;

pub const USD_NOTIONAL: f64 = 1_000.0;
pub const SLIPPAGE_FLOOR: f64 = 0.0025;
pub const SLIPPAGE_CEILING: f64 = 0.40;

fn snapshot_slippage(snapshot: &Value) -> Option<f64> {
    if let Some(direct) = snapshot
        .pointer("/slippage/exit_slippage_1k")
        .and_then(|v| v.as_f64())
    {
        return Some(direct.max(0.0));
    }

    let max_size = snapshot_max_size(snapshot).or_else(|| {
        snapshot
            .get("liquidity_usd")
            .and_then(|v| v.as_f64())
            .map(|liquidity| liquidity * 0.02)
    })?;
    if max_size <= 0.0 {
        return None;
    }
    let ratio = USD_NOTIONAL / max_size;
    Some((0.02 * ratio).clamp(SLIPPAGE_FLOOR, SLIPPAGE_CEILING))
}

/// Min and max slippage over the in-window snapshots; `(None, None)` when no
/// snapshot offers an estimate.
pub fn estimate_slippage(snapshots: &[Value]) -> (Option<f64>, Option<f64>) {
    let candidates: Vec<f64> = snapshots.iter().filter_map(snapshot_slippage).collect();
    if candidates.is_empty() {
        return (None, None);
    }
    let min = candidates.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = candidates.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    (Some(min), Some(max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn direct_estimate_wins() {
        let snapshots = vec![json!({
            "slippage": {"exit_slippage_1k": 0.013},
            "max_suggested_size_usd": 100.0,
        })];
        assert_eq!(estimate_slippage(&snapshots), (Some(0.013), Some(0.013)));
    }

    #[test]
    fn derivation_from_max_size_clamps_both_ends() {
        // Deep book: 0.02 * 1000 / 1_000_000 = 0.00002, floored.
        let deep = vec![json!({"max_suggested_size_usd": 1_000_000.0})];
        assert_eq!(estimate_slippage(&deep).0, Some(SLIPPAGE_FLOOR));

        // Thin book: 0.02 * 1000 / 10 = 2.0, capped.
        let thin = vec![json!({"max_suggested_size_usd": 10.0})];
        assert_eq!(estimate_slippage(&thin).1, Some(SLIPPAGE_CEILING));
    }

    #[test]
    fn liquidity_fallback_applies_two_percent_rule() {
        // liquidity 100k -> max size 2k -> 0.02 * 1000/2000 = 0.01.
        let snapshots = vec![json!({"liquidity_usd": 100_000.0})];
        let (min, max) = estimate_slippage(&snapshots);
        assert_eq!(min, Some(0.01));
        assert_eq!(max, Some(0.01));
    }

    #[test]
    fn min_and_max_span_the_window() {
        let snapshots = vec![
            json!({"max_suggested_size_usd": 4_000.0}),  // 0.005
            json!({"max_suggested_size_usd": 1_000.0}),  // 0.02
        ];
        let (min, max) = estimate_slippage(&snapshots);
        assert_eq!(min, Some(0.005));
        assert_eq!(max, Some(0.02));
    }

    #[test]
    fn unusable_snapshots_yield_nothing() {
        let snapshots = vec![json!({}), json!({"max_suggested_size_usd": 0.0})];
        assert_eq!(estimate_slippage(&snapshots), (None, None));
    }
}
