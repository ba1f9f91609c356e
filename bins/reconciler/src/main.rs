//! Tally balance reconciler.
//!
//! Recomputes every account balance from journal history and compares it
//! with the stored running balance and any cash/bank subledger mirror.
//!
//! Usage:
//!   tally-reconciler            - Report drift, exit 1 if any is found
//!   tally-reconciler --repair   - Correct drifted balances (run while no postings are in flight)

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use tally_core::posting::{BalanceAuditor, BalanceDiscrepancy};
use tally_db::{PgLedgerStore, connect_with};
use tally_shared::AppConfig;
use tally_shared::config::LoggingConfig;

#[derive(Parser)]
#[command(name = "tally-reconciler")]
#[command(about = "Check ledger balances against journal history", long_about = None)]
struct Cli {
    /// Correct drifted balances instead of only reporting them.
    ///
    /// Run only while nothing is posting: a journal committed but not yet
    /// applied during the audit would be counted twice.
    #[arg(long)]
    repair: bool,

    /// Print each discrepancy as a JSON line
    #[arg(long)]
    json: bool,

    /// Database URL, overriding configuration
    #[arg(long)]
    database_url: Option<String>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    if logging.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn print_discrepancy(discrepancy: &BalanceDiscrepancy, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(discrepancy)?);
        return Ok(());
    }

    match discrepancy {
        BalanceDiscrepancy::Account {
            code,
            recorded,
            expected,
            ..
        } => println!("account {code}: recorded {recorded}, expected {expected}"),
        BalanceDiscrepancy::Subledger {
            subledger_id,
            mirrored,
            expected,
            ..
        } => println!("subledger {subledger_id}: mirrored {mirrored}, expected {expected}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    if let Some(url) = cli.database_url {
        config.database.url = Some(url);
    }
    let db = connect_with(&config.database)
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");

    let auditor = BalanceAuditor::new(Arc::new(PgLedgerStore::new(db)));

    let found = if cli.repair {
        auditor.repair().await?
    } else {
        auditor.audit().await?
    };

    for discrepancy in &found {
        print_discrepancy(discrepancy, cli.json)?;
    }

    if cli.repair {
        info!(repaired = found.len(), "reconciliation finished");
        return Ok(ExitCode::SUCCESS);
    }

    Ok(if found.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
