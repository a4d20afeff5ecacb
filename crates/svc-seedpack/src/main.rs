use std::path::PathBuf;

use clap::Parser;

use titan_core::config::Settings;
use titan_watchlist::seed::run_seed_import;

/// Imports the operator seed pack (watched pools, seed wallets, ignore
/// list) into the database.
#[derive(Parser, Debug)]
#[command(name = "svc-seedpack")]
struct Args {
    /// Directory containing the seed pack CSVs (or a seed_pack/ subdir).
    #[arg(long, default_value = ".")]
    dir: PathBuf,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let settings = Settings::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_level.clone())
        .json()
        .init();

    let pool = titan_storage::connect_pg(&settings.database_url)
        .await
        .map_err(|e| eyre::eyre!("{e:#}"))?;

    let summary = run_seed_import(&pool, &args.dir)
        .await
        .map_err(|e| eyre::eyre!("{e:#}"))?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
