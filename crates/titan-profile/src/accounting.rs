//! Position accounting: weighted-average buys, clamped sells, and the fold
//! over the full trade history. Pure, so replays and idempotence are plain
//! unit tests.

use std::collections::BTreeMap;

use titan_core::types::Side;
use titan_storage::models::Trade;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionState {
    pub quantity: f64,
    pub average_price: Option<f64>,
}

/// Positions per wallet, keyed `(chain, wallet) -> token -> state`.
/// BTreeMaps keep iteration deterministic across runs.
pub type WalletPositions = BTreeMap<(String, String), BTreeMap<String, PositionState>>;

pub fn effective_price(trade: &Trade) -> Option<f64> {
    if let Some(price) = trade.price.filter(|p| p.is_finite()) {
        return Some(price);
    }
    match (trade.usd_value, trade.amount) {
        (Some(usd), Some(amount)) if amount > 0.0 => Some(usd / amount),
        _ => None,
    }
}

pub fn apply_trade(position: &mut PositionState, trade: &Trade) {
    let side = trade.side.as_deref().and_then(Side::parse);
    let amount = trade.amount.filter(|a| a.is_finite() && *a > 0.0);
    let (Some(side), Some(amount)) = (side, amount) else {
        return;
    };

    match side {
        Side::Buy => {
            let Some(price) = effective_price(trade) else {
                return;
            };
            let total_cost =
                position.average_price.unwrap_or(0.0) * position.quantity + amount * price;
            position.quantity += amount;
            position.average_price = if position.quantity > 0.0 {
                Some(total_cost / position.quantity)
            } else {
                None
            };
        }
        Side::Sell => {
            if position.quantity <= 0.0 {
                return;
            }
            let sell_qty = position.quantity.min(amount);
            position.quantity -= sell_qty;
            if position.quantity <= 0.0 {
                position.quantity = 0.0;
                position.average_price = None;
            }
        }
    }
}

/// Folds attributed trades (already in replay order) into per-wallet
/// positions.
pub fn fold_positions(trades: &[Trade]) -> WalletPositions {
    let mut positions: WalletPositions = BTreeMap::new();
    for trade in trades {
        let (Some(wallet), Some(token)) = (&trade.wallet_address, &trade.token_address) else {
            continue;
        };
        let state = positions
            .entry((trade.chain.clone(), wallet.clone()))
            .or_default()
            .entry(token.clone())
            .or_default();
        apply_trade(state, trade);
    }
    positions
}

/// Mark-at-cost wallet value: Σ qty · avg.
pub fn total_value(positions: &BTreeMap<String, PositionState>) -> f64 {
    positions
        .values()
        .map(|p| p.quantity * p.average_price.unwrap_or(0.0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn trade(
        wallet: &str,
        token: &str,
        side: &str,
        amount: f64,
        price: Option<f64>,
        usd_value: Option<f64>,
    ) -> Trade {
        Trade {
            chain: "ethereum".into(),
            tx_hash: format!("0x{side}{amount}"),
            log_index: 0,
            block_number: None,
            wallet_address: Some(wallet.into()),
            token_address: Some(token.into()),
            side: Some(side.into()),
            amount: Some(amount),
            price,
            usd_value,
            block_time: None,
            dex: None,
            pair_address: None,
            decode_confidence: 0.9,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn buys_average_in_cost() {
        let trades = vec![
            trade("0xw", "0xt", "buy", 10.0, Some(1.0), None),
            trade("0xw", "0xt", "buy", 10.0, Some(3.0), None),
        ];
        let folded = fold_positions(&trades);
        let state = &folded[&("ethereum".into(), "0xw".into())]["0xt"];
        assert_eq!(state.quantity, 20.0);
        assert_eq!(state.average_price, Some(2.0));
    }

    #[test]
    fn sells_clamp_to_held_quantity_and_clear_average() {
        let trades = vec![
            trade("0xw", "0xt", "buy", 10.0, Some(2.0), None),
            trade("0xw", "0xt", "sell", 25.0, None, None),
        ];
        let folded = fold_positions(&trades);
        let state = &folded[&("ethereum".into(), "0xw".into())]["0xt"];
        assert_eq!(state.quantity, 0.0);
        assert_eq!(state.average_price, None);
    }

    #[test]
    fn sell_into_empty_position_is_a_noop() {
        let trades = vec![trade("0xw", "0xt", "sell", 5.0, Some(1.0), None)];
        let folded = fold_positions(&trades);
        let state = &folded[&("ethereum".into(), "0xw".into())]["0xt"];
        assert_eq!(*state, PositionState::default());
    }

    #[test]
    fn price_falls_back_to_usd_value_over_amount() {
        let trades = vec![trade("0xw", "0xt", "buy", 4.0, None, Some(8.0))];
        let folded = fold_positions(&trades);
        let state = &folded[&("ethereum".into(), "0xw".into())]["0xt"];
        assert_eq!(state.average_price, Some(2.0));
    }

    #[test]
    fn priceless_buys_are_skipped() {
        let trades = vec![trade("0xw", "0xt", "buy", 4.0, None, None)];
        let folded = fold_positions(&trades);
        let state = &folded[&("ethereum".into(), "0xw".into())]["0xt"];
        assert_eq!(*state, PositionState::default());
    }

    #[test]
    fn fold_is_idempotent_over_the_same_history() {
        let trades = vec![
            trade("0xw", "0xt", "buy", 10.0, Some(1.5), None),
            trade("0xw", "0xt", "sell", 4.0, None, None),
            trade("0xw", "0xother", "buy", 2.0, Some(10.0), None),
        ];
        let first = fold_positions(&trades);
        let second = fold_positions(&trades);
        assert_eq!(first, second);

        let wallet = &first[&("ethereum".into(), "0xw".into())];
        assert_eq!(wallet["0xt"].quantity, 6.0);
        assert!((total_value(wallet) - (6.0 * 1.5 + 2.0 * 10.0)).abs() < 1e-9);
    }
}
