//! The pure arithmetic of merit: weighting factors and the score step.

pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// First-seen rank among high-merit wallets on the token: the first mover
/// keeps full weight, the second most of it, everyone later half.
pub fn early_factor(rank: usize) -> f64 {
    match rank {
        0 | 1 => 1.0,
        2 => 0.7,
        _ => 0.5,
    }
}

/// `k` distinct high-merit wallets alerting on the token within ±10 min.
pub fn crowding_penalty(high_merit_count: i64) -> f64 {
    if high_merit_count <= 1 {
        return 0.0;
    }
    clamp01((high_merit_count - 1) as f64 * 0.15)
}

/// Derived from burst density when the wallet's tier_reason carries no
/// `copycat_burst_score`: `d` distinct wallets within ±5 s.
pub fn derived_copycat_penalty(burst_wallet_count: i64) -> f64 {
    clamp01(((burst_wallet_count - 1).max(0)) as f64 * 0.12)
}

pub fn contribution_weight(early: f64, crowding: f64, copycat: f64) -> f64 {
    early * (1.0 - crowding) * (1.0 - copycat)
}

/// One merit cycle: decay toward the prior baseline, then (when the wallet
/// has valid outcomes) toward the clamped average contribution.
pub fn score_step(
    old_merit: f64,
    baseline_prior: f64,
    decay: f64,
    observed_contribution: Option<f64>,
) -> f64 {
    let mut merit = old_merit * decay + baseline_prior * (1.0 - decay);
    if let Some(observed) = observed_contribution {
        merit = merit * decay + observed * (1.0 - decay);
    }
    merit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn early_factors_by_rank() {
        assert_eq!(early_factor(1), 1.0);
        assert_eq!(early_factor(2), 0.7);
        assert_eq!(early_factor(3), 0.5);
        assert_eq!(early_factor(9), 0.5);
    }

    #[test]
    fn crowding_scales_and_clamps() {
        assert_eq!(crowding_penalty(1), 0.0);
        assert!((crowding_penalty(3) - 0.30).abs() < 1e-9);
        assert_eq!(crowding_penalty(20), 1.0);
    }

    #[test]
    fn copycat_derivation() {
        assert_eq!(derived_copycat_penalty(1), 0.0);
        assert!((derived_copycat_penalty(3) - 0.24).abs() < 1e-9);
        assert_eq!(derived_copycat_penalty(0), 0.0);
    }

    #[test]
    fn earliness_orders_identical_outcomes() {
        // Three high-merit wallets on the same token, identical outcomes
        // (net 0.20, sellable, not a trap), two minutes apart. All three sit
        // inside each other's crowding window, so only earliness separates
        // them.
        let net_return = 0.20;
        let crowding = crowding_penalty(3);
        let copycat = 0.0;
        let contributions: Vec<f64> = (1..=3)
            .map(|rank| {
                net_return * contribution_weight(early_factor(rank), crowding, copycat)
            })
            .collect();

        let decay = 0.85;
        let merits: Vec<f64> = contributions
            .iter()
            .map(|c| score_step(0.0, 0.0, decay, Some(*c)))
            .collect();

        assert!(merits[0] > merits[1]);
        assert!(merits[1] > merits[2]);
    }

    #[test]
    fn score_step_is_monotone_in_observation() {
        let low = score_step(0.05, 0.01, 0.85, Some(-0.1));
        let mid = score_step(0.05, 0.01, 0.85, Some(0.0));
        let high = score_step(0.05, 0.01, 0.85, Some(0.1));
        assert!(low < mid && mid < high);
    }

    #[test]
    fn score_step_without_samples_only_decays_toward_prior() {
        let merit = score_step(0.10, 0.015, 0.85, None);
        assert!((merit - (0.10 * 0.85 + 0.015 * 0.15)).abs() < 1e-12);
    }
}
