//! Seed-pack import: operator-curated CSVs of pools to watch, wallets to
//! warm-start, and wallets to ignore. Seed provenance protects these rows
//! from autopilot churn and merit warm-start gives the wallets a prior.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use titan_core::address::normalize_evm_address;
use titan_storage::repos::{wallets, watch_pairs};

pub const SEED_WALLET_PRIOR_WEIGHT: &str = "0.3";
const SEED_PAIR_TTL_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct SeedPackPaths {
    pub watched_pools: PathBuf,
    pub seed_wallets: PathBuf,
    pub ignore_list: PathBuf,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct SeedImportSummary {
    pub watched_pools: usize,
    pub seed_wallets: usize,
    pub ignore_list: usize,
}

/// Looks for the three CSVs in `base_dir` and `base_dir/seed_pack`.
pub fn resolve_seed_pack_paths(base_dir: &Path) -> Result<SeedPackPaths> {
    let candidates = [base_dir.to_path_buf(), base_dir.join("seed_pack")];
    let find = |filename: &str| {
        candidates
            .iter()
            .map(|candidate| candidate.join(filename))
            .find(|path| path.exists())
    };

    let watched_pools = find("watched_pools.csv");
    let seed_wallets = find("seed_wallets.csv");
    let ignore_list = find("ignore_list.csv");

    let missing: Vec<&str> = [
        ("watched_pools.csv", watched_pools.is_none()),
        ("seed_wallets.csv", seed_wallets.is_none()),
        ("ignore_list.csv", ignore_list.is_none()),
    ]
    .iter()
    .filter(|(_, absent)| *absent)
    .map(|(name, _)| *name)
    .collect();
    if !missing.is_empty() {
        bail!(
            "missing seed pack CSVs ({}) under {} or {}",
            missing.join(", "),
            candidates[0].display(),
            candidates[1].display()
        );
    }

    Ok(SeedPackPaths {
        watched_pools: watched_pools.expect("checked above"),
        seed_wallets: seed_wallets.expect("checked above"),
        ignore_list: ignore_list.expect("checked above"),
    })
}

fn read_rows(path: &Path) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("open seed csv {}", path.display()))?;
    let mut rows = Vec::new();
    for record in reader.deserialize::<HashMap<String, String>>() {
        rows.push(record?);
    }
    Ok(rows)
}

fn clean(row: &HashMap<String, String>, key: &str) -> Option<String> {
    row.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn row_chain(row: &HashMap<String, String>) -> String {
    clean(row, "chain").unwrap_or_else(|| "ethereum".into()).to_lowercase()
}

pub async fn import_watch_pairs(pool: &PgPool, path: &Path) -> Result<usize> {
    let expires_at = Utc::now() + Duration::days(SEED_PAIR_TTL_DAYS);
    let mut imported = 0;
    for row in read_rows(path)? {
        let chain = row_chain(&row);
        let pair_address = clean(&row, "pool_address")
            .or_else(|| clean(&row, "pair_address"))
            .and_then(|a| normalize_evm_address(&a));
        let Some(pair_address) = pair_address else {
            continue;
        };
        watch_pairs::upsert_seed_pair(
            pool,
            &chain,
            &pair_address,
            clean(&row, "dex").as_deref(),
            clean(&row, "token0_symbol").as_deref(),
            clean(&row, "token0_address")
                .and_then(|a| normalize_evm_address(&a))
                .as_deref(),
            clean(&row, "token1_symbol").as_deref(),
            clean(&row, "token1_address")
                .and_then(|a| normalize_evm_address(&a))
                .as_deref(),
            expires_at,
        )
        .await?;
        imported += 1;
    }
    Ok(imported)
}

pub async fn import_seed_wallets(pool: &PgPool, path: &Path) -> Result<usize> {
    let mut imported = 0;
    for row in read_rows(path)? {
        let chain = row_chain(&row);
        let Some(address) = clean(&row, "address").and_then(|a| normalize_evm_address(&a)) else {
            continue;
        };
        // An operator-ignored wallet stays ignored.
        if let Some(existing) = wallets::get(pool, &chain, &address).await? {
            if existing.is_ignored() {
                info!(chain = %chain, address = %address, "seed wallet skip: ignored");
                continue;
            }
        }
        let tier_reason = json!({
            "source": "seed_pack",
            "type": "warm_start",
            "label": clean(&row, "label_or_category_guess"),
            "why_included": clean(&row, "why_included"),
            "evidence_sources": clean(&row, "evidence_sources"),
            "date_observed": clean(&row, "date_observed"),
        });
        wallets::upsert_seed_wallet(
            pool,
            &chain,
            &address,
            SEED_WALLET_PRIOR_WEIGHT.parse::<Decimal>().expect("prior weight"),
            &tier_reason,
        )
        .await?;
        imported += 1;
    }
    Ok(imported)
}

pub async fn import_ignore_list(pool: &PgPool, path: &Path) -> Result<usize> {
    let mut imported = 0;
    for row in read_rows(path)? {
        let chain = row_chain(&row);
        let Some(address) = clean(&row, "address").and_then(|a| normalize_evm_address(&a)) else {
            continue;
        };
        let ignore_type = clean(&row, "type");
        let notes = clean(&row, "notes");
        let ignore_reason = match (&ignore_type, &notes) {
            (Some(t), Some(n)) => Some(format!("{t}: {n}")),
            (Some(t), None) => Some(t.clone()),
            (None, Some(n)) => Some(n.clone()),
            (None, None) => None,
        };
        let tier_reason = json!({
            "source": "seed_pack",
            "type": "ignore",
            "ignore_type": ignore_type,
            "sources": clean(&row, "sources"),
            "date_observed": clean(&row, "date_observed"),
            "notes": notes,
        });
        wallets::upsert_ignored_wallet(
            pool,
            &chain,
            &address,
            ignore_reason.as_deref(),
            &tier_reason,
        )
        .await?;
        imported += 1;
    }
    Ok(imported)
}

pub async fn run_seed_import(pool: &PgPool, base_dir: &Path) -> Result<SeedImportSummary> {
    let paths = resolve_seed_pack_paths(base_dir)?;
    info!(pools = %paths.watched_pools.display(), "seed import starting");
    let summary = SeedImportSummary {
        watched_pools: import_watch_pairs(pool, &paths.watched_pools).await?,
        seed_wallets: import_seed_wallets(pool, &paths.seed_wallets).await?,
        ignore_list: import_ignore_list(pool, &paths.ignore_list).await?,
    };
    info!(
        watched_pools = summary.watched_pools,
        seed_wallets = summary.seed_wallets,
        ignore_list = summary.ignore_list,
        "seed import complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_resolution_reports_missing_files() {
        let dir = std::env::temp_dir().join(format!("seedpack-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let err = resolve_seed_pack_paths(&dir).unwrap_err();
        assert!(err.to_string().contains("watched_pools.csv"));

        for name in ["watched_pools.csv", "seed_wallets.csv", "ignore_list.csv"] {
            std::fs::write(dir.join(name), "chain,address\n").unwrap();
        }
        let paths = resolve_seed_pack_paths(&dir).unwrap();
        assert!(paths.ignore_list.ends_with("ignore_list.csv"));
        std::fs::remove_dir_all(&dir).ok();
    }
}
