//! Peak math: raw peak and drawdown against the entry price, and the
//! exit-feasible peak that only counts price samples whose contemporaneous
//! risk snapshot would actually have let a $1k position out.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::risk_window::{is_exit_feasible, parse_snapshot_time};

pub const ASSUMED_GAS_FRACTION: f64 = 0.006;
pub const DEFAULT_SLIPPAGE_FRACTION: f64 = 0.02;
pub const TRAP_NET_CAP: f64 = -0.15;

pub type PricePoint = (DateTime<Utc>, f64);

/// Entry from the alert's reasons when present, else the first in-window
/// price.
pub fn entry_price(reasons: &Value, prices: &[PricePoint]) -> Option<f64> {
    if let Some(entry) = reasons.get("entry_price").and_then(|v| v.as_f64()) {
        if entry > 0.0 {
            return Some(entry);
        }
    }
    prices.first().map(|(_, price)| *price)
}

pub fn raw_peak_gain(prices: &[PricePoint], entry: f64) -> Option<f64> {
    let max = prices.iter().map(|(_, p)| *p).fold(f64::NEG_INFINITY, f64::max);
    (entry > 0.0 && max.is_finite()).then(|| max / entry - 1.0)
}

pub fn drawdown(prices: &[PricePoint], entry: f64) -> Option<f64> {
    let min = prices.iter().map(|(_, p)| *p).fold(f64::INFINITY, f64::min);
    (entry > 0.0 && min.is_finite()).then(|| min / entry - 1.0)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExitFeasiblePeak {
    pub gain: Option<f64>,
    pub at: Option<DateTime<Utc>>,
    pub was_sellable_entire_window: bool,
}

/// For each price sample, the governing snapshot is the nearest one at or
/// before it; the sample only counts when that snapshot is exit-feasible.
pub fn exit_feasible_peak(
    prices: &[PricePoint],
    in_window_snapshots: &[Value],
    entry: f64,
) -> ExitFeasiblePeak {
    let infeasible = ExitFeasiblePeak {
        gain: None,
        at: None,
        was_sellable_entire_window: false,
    };
    if prices.is_empty() || entry <= 0.0 {
        return infeasible;
    }

    let mut timeline: Vec<(DateTime<Utc>, bool)> = in_window_snapshots
        .iter()
        .filter_map(|snapshot| {
            parse_snapshot_time(snapshot).map(|t| (t, is_exit_feasible(snapshot)))
        })
        .collect();
    timeline.sort_by_key(|(t, _)| *t);
    if timeline.is_empty() || !timeline.iter().any(|(_, feasible)| *feasible) {
        return infeasible;
    }

    let mut best: Option<(f64, DateTime<Utc>)> = None;
    for (price_time, price) in prices {
        let governing = timeline.partition_point(|(t, _)| t <= price_time);
        if governing == 0 {
            continue;
        }
        let (_, feasible) = timeline[governing - 1];
        if !feasible {
            continue;
        }
        let gain = price / entry - 1.0;
        if best.map(|(g, _)| gain > g).unwrap_or(true) {
            best = Some((gain, *price_time));
        }
    }

    let Some((gain, at)) = best else {
        return infeasible;
    };
    ExitFeasiblePeak {
        gain: Some(gain),
        at: Some(at),
        was_sellable_entire_window: timeline.iter().all(|(_, feasible)| *feasible),
    }
}

/// Net return after assumed gas and the worst observed slippage. Traps and
/// unsellable windows are capped hard negative.
pub fn net_return(
    peak_gain: Option<f64>,
    max_slippage: Option<f64>,
    trap_flag: bool,
    sellable: Option<bool>,
) -> Option<f64> {
    let peak = peak_gain?;
    let net = peak - ASSUMED_GAS_FRACTION - max_slippage.unwrap_or(DEFAULT_SLIPPAGE_FRACTION);
    if trap_flag || sellable == Some(false) {
        Some(net.min(TRAP_NET_CAP))
    } else {
        Some(net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn series(base: DateTime<Utc>, values: &[(i64, f64)]) -> Vec<PricePoint> {
        values
            .iter()
            .map(|(minutes, price)| (base + Duration::minutes(*minutes), *price))
            .collect()
    }

    #[test]
    fn raw_peak_and_drawdown() {
        let base = Utc::now();
        let prices = series(base, &[(0, 1.05), (10, 1.60), (20, 1.80), (30, 1.20)]);
        assert!((raw_peak_gain(&prices, 1.0).unwrap() - 0.80).abs() < 1e-9);
        assert!((drawdown(&prices, 1.0).unwrap() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn exit_feasibility_suppresses_untouchable_peaks() {
        // Spec scenario: only the first snapshot can actually exit $1k, so
        // the 80% raw peak collapses to the 5% sample it governs.
        let base = Utc::now();
        let prices = series(base, &[(30, 1.05), (80, 1.60), (140, 1.80), (220, 1.20)]);
        let snapshots = vec![
            json!({"updated_at": (base + Duration::minutes(30)).to_rfc3339(),
                   "max_suggested_size_usd": 1500, "sellable": true}),
            json!({"updated_at": (base + Duration::minutes(80)).to_rfc3339(),
                   "max_suggested_size_usd": 400, "sellable": true}),
            json!({"updated_at": (base + Duration::minutes(140)).to_rfc3339(),
                   "max_suggested_size_usd": 6000, "sellable": false}),
            json!({"updated_at": (base + Duration::minutes(220)).to_rfc3339(),
                   "max_suggested_size_usd": 3000, "sellable": true}),
        ];

        let raw = raw_peak_gain(&prices, 1.0).unwrap();
        assert!((raw - 0.80).abs() < 1e-9);

        let peak = exit_feasible_peak(&prices, &snapshots, 1.0);
        // Feasible samples: t=30 (5%) under the first snapshot, and t=220
        // (20%) under the last; the 80% peak at t=140 is unreachable.
        assert!(peak.gain.unwrap() < raw);
        assert!(!peak.was_sellable_entire_window);
    }

    #[test]
    fn lone_feasible_snapshot_limits_peak_to_its_samples() {
        let base = Utc::now();
        let prices = series(base, &[(30, 1.05), (80, 1.60), (140, 1.80)]);
        let snapshots = vec![
            json!({"updated_at": (base + Duration::minutes(30)).to_rfc3339(),
                   "max_suggested_size_usd": 1500, "sellable": true}),
            json!({"updated_at": (base + Duration::minutes(60)).to_rfc3339(),
                   "max_suggested_size_usd": 100, "sellable": true}),
        ];
        let peak = exit_feasible_peak(&prices, &snapshots, 1.0);
        assert!((peak.gain.unwrap() - 0.05).abs() < 1e-9);
        assert_eq!(peak.at, Some(base + Duration::minutes(30)));
        assert!(!peak.was_sellable_entire_window);
    }

    #[test]
    fn no_feasible_snapshot_means_no_peak() {
        let base = Utc::now();
        let prices = series(base, &[(10, 2.0)]);
        let snapshots = vec![json!({
            "updated_at": base.to_rfc3339(),
            "max_suggested_size_usd": 100,
        })];
        let peak = exit_feasible_peak(&prices, &snapshots, 1.0);
        assert_eq!(peak.gain, None);
        assert!(!peak.was_sellable_entire_window);
    }

    #[test]
    fn entry_prefers_alert_reasons() {
        let base = Utc::now();
        let prices = series(base, &[(0, 2.0)]);
        assert_eq!(entry_price(&json!({"entry_price": 1.5}), &prices), Some(1.5));
        assert_eq!(entry_price(&json!({}), &prices), Some(2.0));
        assert_eq!(entry_price(&json!({"entry_price": 0.0}), &prices), Some(2.0));
        assert_eq!(entry_price(&json!({}), &[]), None);
    }

    #[test]
    fn net_return_costs_and_trap_cap() {
        // 0.10 peak - 0.006 gas - 0.03 slippage.
        let net = net_return(Some(0.10), Some(0.03), false, Some(true)).unwrap();
        assert!((net - 0.064).abs() < 1e-9);

        // Default slippage when the window had no estimate.
        let default_slip = net_return(Some(0.10), None, false, Some(true)).unwrap();
        assert!((default_slip - 0.074).abs() < 1e-9);

        // A trap caps the net hard negative even with a big peak.
        let trapped = net_return(Some(0.50), Some(0.02), true, Some(false)).unwrap();
        assert_eq!(trapped, TRAP_NET_CAP);

        assert_eq!(net_return(None, Some(0.02), false, Some(true)), None);
    }
}
