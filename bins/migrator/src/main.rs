//! Database migration runner for Tally.
//!
//! Usage:
//!   tally-migrator up      - Create the ledger schema
//!   tally-migrator down    - Drop the ledger schema
//!   tally-migrator status  - Show migration status
//!   tally-migrator fresh   - Drop everything and re-create the schema
//!
//! Reads `DATABASE_URL` (a `.env` file is honoured).

use sea_orm_migration::prelude::*;
use tally_db::migration::Migrator;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // The migrator CLI sets up its own tracing
    cli::run_cli(Migrator).await;
}
