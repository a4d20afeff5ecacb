//! Conviction: 60% token security, 40% capital behind the wallet (or trade
//! size for pool alerts), rounded to two decimals.

pub fn conviction_score(tss: f64, value_ratio_basis: f64, titan_threshold: f64) -> f64 {
    let ratio = if titan_threshold > 0.0 {
        (value_ratio_basis / titan_threshold).min(1.0)
    } else {
        0.0
    };
    let raw = (tss / 100.0) * 60.0 + ratio * 40.0;
    (raw * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_sixty_forty() {
        // Full TSS, wallet at the titan threshold.
        assert_eq!(conviction_score(100.0, 10_000.0, 10_000.0), 100.0);
        // Full TSS, no wallet value.
        assert_eq!(conviction_score(100.0, 0.0, 10_000.0), 60.0);
        // No TSS, deep wallet.
        assert_eq!(conviction_score(0.0, 1_000_000.0, 10_000.0), 40.0);
    }

    #[test]
    fn wallet_ratio_saturates() {
        assert_eq!(
            conviction_score(50.0, 1_000_000.0, 10_000.0),
            conviction_score(50.0, 10_000.0, 10_000.0)
        );
    }

    #[test]
    fn rounds_to_two_decimals() {
        let score = conviction_score(85.0, 5_000.0, 10_000.0);
        // 0.85*60 + 0.5*40 = 71.
        assert_eq!(score, 71.0);
        let uneven = conviction_score(33.333, 1_234.0, 10_000.0);
        assert_eq!(uneven, (uneven * 100.0).round() / 100.0);
    }
}
