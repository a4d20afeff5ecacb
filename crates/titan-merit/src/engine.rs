//! The DB-coupled merit cycle: gather each wallet's valid outcomes, weight
//! them, step the score, decide one tier transition, and persist the
//! rationale.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Row};

use titan_core::config::Settings;
use titan_core::types::Tier;
use titan_storage::models::Wallet;
use titan_storage::repos::{outcomes, wallets};

use crate::contribution::{
    clamp01, contribution_weight, crowding_penalty, derived_copycat_penalty, early_factor,
    score_step,
};

#[derive(Debug, Clone)]
pub struct WalletOutcomeStats {
    pub sample_size: i64,
    pub positive_count: i64,
    pub avg_return: f64,
    pub avg_contribution: f64,
}

#[derive(Debug, Clone)]
pub struct OutcomeContribution {
    pub alert_id: String,
    pub token_address: String,
    pub net_return: f64,
    pub early_factor: f64,
    pub crowding_penalty: f64,
    pub copycat_penalty: f64,
    pub contribution: f64,
}

/// Wallets considered high-merit for earliness/crowding purposes.
const HIGH_MERIT_SQL: &str =
    "(w.tier IN ('shadow', 'titan') OR w.merit_score::float8 >= $3)";

async fn first_seen_rank(
    conn: &mut PgConnection,
    chain: &str,
    token_address: &str,
    wallet_address: &str,
    merit_threshold: f64,
) -> Result<usize> {
    let rows = sqlx::query(&format!(
        "SELECT a.wallet_address, MIN(a.created_at) AS first_seen
         FROM alerts a
         JOIN wallets w ON w.chain = a.chain AND w.address = a.wallet_address
         WHERE a.chain = $1 AND a.token_address = $2 AND {HIGH_MERIT_SQL}
         GROUP BY a.wallet_address
         ORDER BY MIN(a.created_at) ASC"
    ))
    .bind(chain)
    .bind(token_address)
    .bind(merit_threshold)
    .fetch_all(&mut *conn)
    .await?;

    for (index, row) in rows.iter().enumerate() {
        let address: String = row.try_get("wallet_address")?;
        if address == wallet_address {
            return Ok(index + 1);
        }
    }
    Ok(rows.len() + 1)
}

async fn high_merit_crowd_count(
    conn: &mut PgConnection,
    chain: &str,
    token_address: &str,
    at: DateTime<Utc>,
    merit_threshold: f64,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(DISTINCT a.wallet_address)
         FROM alerts a
         JOIN wallets w ON w.chain = a.chain AND w.address = a.wallet_address
         WHERE a.chain = $1 AND a.token_address = $2
           AND a.created_at BETWEEN $4 AND $5
           AND {HIGH_MERIT_SQL}"
    ))
    .bind(chain)
    .bind(token_address)
    .bind(merit_threshold)
    .bind(at - Duration::minutes(10))
    .bind(at + Duration::minutes(10))
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

async fn burst_wallet_count(
    conn: &mut PgConnection,
    chain: &str,
    token_address: &str,
    at: DateTime<Utc>,
) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT wallet_address)
         FROM alerts
         WHERE chain = $1 AND token_address = $2
           AND created_at BETWEEN $3 AND $4",
    )
    .bind(chain)
    .bind(token_address)
    .bind(at - Duration::seconds(5))
    .bind(at + Duration::seconds(5))
    .fetch_one(&mut *conn)
    .await?;
    Ok(count)
}

fn copycat_from_reason(wallet: &Wallet) -> Option<f64> {
    wallet.reason_f64("copycat_burst_score").map(clamp01)
}

pub async fn build_contributions(
    settings: &Settings,
    conn: &mut PgConnection,
    wallet: &Wallet,
) -> Result<Vec<OutcomeContribution>> {
    let rows = outcomes::valid_outcomes_for_wallet(&mut *conn, &wallet.chain, &wallet.address)
        .await?;
    let known_copycat = copycat_from_reason(wallet);
    let threshold = settings.merit.shadow_to_titan_threshold;

    let mut contributions = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(token_address) = row.token_address else {
            continue;
        };

        let rank = first_seen_rank(
            &mut *conn,
            &wallet.chain,
            &token_address,
            &wallet.address,
            threshold,
        )
        .await?;
        let early = early_factor(rank);

        let crowd =
            high_merit_crowd_count(&mut *conn, &wallet.chain, &token_address, row.created_at, threshold)
                .await?;
        let crowding = crowding_penalty(crowd);

        let copycat = match known_copycat {
            Some(value) => value,
            None => {
                let burst =
                    burst_wallet_count(&mut *conn, &wallet.chain, &token_address, row.created_at)
                        .await?;
                derived_copycat_penalty(burst)
            }
        };

        let weight = contribution_weight(early, crowding, copycat);
        contributions.push(OutcomeContribution {
            alert_id: row.alert_id.to_string(),
            token_address,
            net_return: row.net_return,
            early_factor: early,
            crowding_penalty: crowding,
            copycat_penalty: copycat,
            contribution: row.net_return * weight,
        });
    }
    Ok(contributions)
}

fn round6(value: f64) -> f64 {
    (value * 1e6).round() / 1e6
}

/// One tier transition per cycle, first match wins. Returns the next tier
/// and the rationale document persisted to `tier_reason`.
pub fn next_tier(
    settings: &Settings,
    wallet: &Wallet,
    merit_score: f64,
    stats: &WalletOutcomeStats,
) -> (Option<String>, serde_json::Value) {
    let current = wallet.tier.clone();
    let bot_suspect = wallet.reason_flag("bot_suspect");
    let copycat_dominant = wallet.reason_flag("copycat_dominant");
    let integrity_score = wallet.reason_f64("integrity_score").unwrap_or(1.0);
    let merit = &settings.merit;

    let mut rationale = serde_json::json!({
        "updated_at": Utc::now().to_rfc3339(),
        "from_tier": current,
        "sample_size": stats.sample_size,
        "positive_outcomes": stats.positive_count,
        "avg_valid_return": round6(stats.avg_return),
        "avg_contribution": round6(stats.avg_contribution),
        "merit_score": round6(merit_score),
        "bot_suspect": bot_suspect,
        "copycat_dominant": copycat_dominant,
        "integrity_score": integrity_score,
        "learning_filter": {
            "was_sellable_entire_window": true,
            "trap_flag": false,
            "net_tradeable_return_est_not_null": true,
        },
    });
    let fields = rationale.as_object_mut().expect("rationale object");

    if current.as_deref() == Some(Tier::Ocean.as_str())
        && stats.positive_count >= merit.ocean_to_shadow_positive_min
        && !bot_suspect
        && !copycat_dominant
    {
        fields.insert("event".into(), "promotion".into());
        fields.insert("rule".into(), "ocean_to_shadow".into());
        fields.insert("last_promotion_reason".into(), "ocean_to_shadow".into());
        return (Some(Tier::Shadow.as_str().to_string()), rationale);
    }

    if current.as_deref() == Some(Tier::Shadow.as_str())
        && stats.sample_size >= merit.shadow_to_titan_sample_min
        && merit_score >= merit.shadow_to_titan_threshold
        && integrity_score >= merit.integrity_min
    {
        fields.insert("event".into(), "promotion".into());
        fields.insert("rule".into(), "shadow_to_titan".into());
        fields.insert("last_promotion_reason".into(), "shadow_to_titan".into());
        return (Some(Tier::Titan.as_str().to_string()), rationale);
    }

    if wallet.source == "seed_pack"
        && stats.sample_size >= merit.seed_decay_min_outcomes
        && merit_score <= merit.seed_decay_threshold
    {
        let target = merit.seed_decay_target_tier.as_str().to_string();
        fields.insert("event".into(), "demotion".into());
        fields.insert("rule".into(), "seed_decay_low_merit".into());
        fields.insert("target_tier".into(), target.clone().into());
        fields.insert("last_demotion_reason".into(), "seed_decay_low_merit".into());
        return (Some(target), rationale);
    }

    fields.insert("event".into(), "score_update".into());
    fields.insert("rule".into(), "none".into());
    (current, rationale)
}

fn contribution_summary(
    stats: &WalletOutcomeStats,
    contributions: &[OutcomeContribution],
) -> serde_json::Value {
    let mut summary = serde_json::json!({
        "sample_size": contributions.len(),
        "avg_contribution": round6(stats.avg_contribution),
    });
    if let Some(latest) = contributions.last() {
        summary["latest"] = serde_json::json!({
            "alert_id": latest.alert_id,
            "token_address": latest.token_address,
            "net_tradeable_return_est": round6(latest.net_return),
            "early_factor": latest.early_factor,
            "crowding_penalty": latest.crowding_penalty,
            "copycat_penalty": latest.copycat_penalty,
            "contribution": round6(latest.contribution),
        });
    }
    summary
}

/// Full merit pass over every wallet. Runs inside the caller's transaction
/// so the profiler commits accounting and merit together.
pub async fn run_merit_update_once(
    settings: &Settings,
    conn: &mut PgConnection,
) -> Result<usize> {
    let wallet_list = wallets::list_all(&mut *conn).await?;
    let mut updated = 0;

    for wallet in wallet_list {
        let aggregate =
            outcomes::wallet_outcome_aggregate(&mut *conn, &wallet.chain, &wallet.address)
                .await?;
        let contributions = build_contributions(settings, conn, &wallet).await?;

        let avg_contribution = if contributions.is_empty() {
            0.0
        } else {
            contributions.iter().map(|c| c.contribution).sum::<f64>()
                / contributions.len() as f64
        };
        let stats = WalletOutcomeStats {
            sample_size: aggregate.sample_size,
            positive_count: aggregate.positive_count,
            avg_return: aggregate.avg_return.unwrap_or(0.0),
            avg_contribution,
        };

        let old_merit = wallet.merit_score.to_f64().unwrap_or(0.0);
        let prior_weight = wallet.prior_weight.to_f64().unwrap_or(0.0);
        let baseline = prior_weight.max(0.0) * settings.merit.prior_constant;
        let observed = (stats.sample_size > 0).then(|| {
            stats
                .avg_contribution
                .clamp(settings.merit.return_clamp_min, settings.merit.return_clamp_max)
        });
        let merit_score = score_step(old_merit, baseline, settings.merit.decay, observed);

        let (tier, mut rationale) = next_tier(settings, &wallet, merit_score, &stats);

        // Promotion/demotion provenance survives score-only cycles.
        if let Some(existing) = wallet.tier_reason.as_ref().and_then(|r| r.as_object()) {
            let fields = rationale.as_object_mut().expect("rationale object");
            for key in ["last_promotion_reason", "last_demotion_reason"] {
                if !fields.contains_key(key) {
                    if let Some(carried) = existing.get(key) {
                        fields.insert(key.into(), carried.clone());
                    }
                }
            }
        }
        rationale["last_merit_update_at"] = serde_json::json!(Utc::now().to_rfc3339());
        rationale["last_contribution_summary"] = contribution_summary(&stats, &contributions);

        let merit_decimal = Decimal::from_f64(round6(merit_score)).unwrap_or(Decimal::ZERO);
        wallets::update_score_and_tier(
            &mut *conn,
            &wallet.chain,
            &wallet.address,
            merit_decimal,
            tier.as_deref(),
            &rationale,
        )
        .await?;
        updated += 1;
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_core::config::{
        AutopilotSettings, MeritSettings, NetEvSettings, TierThresholds,
    };

    fn test_settings() -> Settings {
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

    fn wallet(tier: &str, source: &str, reason: Option<serde_json::Value>) -> Wallet {
        Wallet {
            chain: "ethereum".into(),
            address: "0xwallet".into(),
            source: source.into(),
            prior_weight: Decimal::ZERO,
            merit_score: Decimal::ZERO,
            tier: Some(tier.into()),
            tier_reason: reason,
            ignore_reason: None,
            created_at: Utc::now(),
        }
    }

    fn stats(sample: i64, positives: i64) -> WalletOutcomeStats {
        WalletOutcomeStats {
            sample_size: sample,
            positive_count: positives,
            avg_return: 0.1,
            avg_contribution: 0.1,
        }
    }

    #[test]
    fn ocean_promotes_to_shadow_on_positive_outcomes() {
        let settings = test_settings();
        let (tier, rationale) =
            next_tier(&settings, &wallet("ocean", "autopilot", None), 0.0, &stats(5, 3));
        assert_eq!(tier.as_deref(), Some("shadow"));
        assert_eq!(rationale["rule"], "ocean_to_shadow");
    }

    #[test]
    fn bot_suspects_never_promote() {
        let settings = test_settings();
        let suspect = wallet(
            "ocean",
            "autopilot",
            Some(serde_json::json!({"bot_suspect": true})),
        );
        let (tier, rationale) = next_tier(&settings, &suspect, 0.0, &stats(5, 5));
        assert_eq!(tier.as_deref(), Some("ocean"));
        assert_eq!(rationale["rule"], "none");
    }

    #[test]
    fn shadow_promotes_to_titan_with_sample_merit_and_integrity() {
        let settings = test_settings();
        let clean = wallet("shadow", "autopilot", None);
        let (tier, _) = next_tier(&settings, &clean, 0.09, &stats(25, 20));
        assert_eq!(tier.as_deref(), Some("titan"));

        // Low integrity blocks it.
        let shaky = wallet(
            "shadow",
            "autopilot",
            Some(serde_json::json!({"integrity_score": 0.5})),
        );
        let (tier, _) = next_tier(&settings, &shaky, 0.09, &stats(25, 20));
        assert_eq!(tier.as_deref(), Some("shadow"));
    }

    #[test]
    fn seed_pack_decays_on_sustained_negative_merit() {
        let settings = test_settings();
        let seed = wallet("shadow", "seed_pack", None);
        let (tier, rationale) = next_tier(&settings, &seed, -0.05, &stats(15, 2));
        assert_eq!(tier.as_deref(), Some("ocean"));
        assert_eq!(rationale["rule"], "seed_decay_low_merit");
        assert_eq!(rationale["last_demotion_reason"], "seed_decay_low_merit");
    }

    #[test]
    fn small_samples_leave_tier_alone() {
        let settings = test_settings();
        let seed = wallet("shadow", "seed_pack", None);
        let (tier, rationale) = next_tier(&settings, &seed, -0.05, &stats(5, 1));
        assert_eq!(tier.as_deref(), Some("shadow"));
        assert_eq!(rationale["event"], "score_update");
    }
}
