//! Ledger schema migration.
//!
//! Creates the chart of accounts, journal tables, sequence counters and the
//! cash/bank subledger together with the constraints the posting engine
//! relies on for idempotency and numbering.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: CHART OF ACCOUNTS
        // ============================================================
        db.execute_unprepared(ACCOUNTS_SQL).await?;

        // ============================================================
        // PART 3: JOURNALS
        // ============================================================
        db.execute_unprepared(JOURNAL_ENTRIES_SQL).await?;
        db.execute_unprepared(JOURNAL_LINES_SQL).await?;

        // ============================================================
        // PART 4: NUMBERING
        // ============================================================
        db.execute_unprepared(SEQUENCE_COUNTERS_SQL).await?;

        // ============================================================
        // PART 5: SUBLEDGERS
        // ============================================================
        db.execute_unprepared(CASH_BANK_SUBLEDGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE account_type AS ENUM (
    'ASSET',
    'LIABILITY',
    'EQUITY',
    'REVENUE',
    'EXPENSE'
);

CREATE TYPE journal_status AS ENUM (
    'DRAFT',
    'POSTED',
    'REVERSED'
);
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    code VARCHAR(20) NOT NULL,
    name VARCHAR(255) NOT NULL,
    account_type account_type NOT NULL,
    running_balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_accounts_code UNIQUE (code)
);
";

const JOURNAL_ENTRIES_SQL: &str = r"
CREATE TABLE journal_entries (
    id UUID PRIMARY KEY,
    code VARCHAR(40) NOT NULL,
    source_type VARCHAR(50) NOT NULL,
    source_id VARCHAR(100) NOT NULL,
    entry_date DATE NOT NULL,
    description TEXT NOT NULL,
    reference VARCHAR(100),
    status journal_status NOT NULL DEFAULT 'POSTED',
    total_debit NUMERIC(20, 4) NOT NULL,
    total_credit NUMERIC(20, 4) NOT NULL,
    reversal_id UUID REFERENCES journal_entries(id),
    reversed_entry_id UUID REFERENCES journal_entries(id),
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    posted_at TIMESTAMPTZ,
    reversed_at TIMESTAMPTZ,
    reversed_by UUID,
    reversal_reason TEXT,
    CONSTRAINT chk_journal_balanced CHECK (
        status = 'DRAFT' OR total_debit = total_credit
    ),
    CONSTRAINT chk_reversed_has_link CHECK (
        status <> 'REVERSED' OR reversal_id IS NOT NULL
    )
);

-- Unique journal codes
CREATE UNIQUE INDEX uq_journal_entries_code ON journal_entries(code);

-- At most one non-reversed journal per source document
CREATE UNIQUE INDEX uq_journal_entries_active_source
    ON journal_entries(source_type, source_id)
    WHERE status <> 'REVERSED';

CREATE INDEX idx_je_source ON journal_entries(source_type, source_id);
CREATE INDEX idx_je_entry_date ON journal_entries(entry_date);
";

const JOURNAL_LINES_SQL: &str = r"
CREATE TABLE journal_lines (
    id UUID PRIMARY KEY,
    entry_id UUID NOT NULL REFERENCES journal_entries(id) ON DELETE CASCADE,
    line_number INTEGER NOT NULL,
    account_id UUID NOT NULL REFERENCES accounts(id),
    description TEXT NOT NULL DEFAULT '',
    debit NUMERIC(20, 4) NOT NULL DEFAULT 0,
    credit NUMERIC(20, 4) NOT NULL DEFAULT 0,
    CONSTRAINT chk_line_one_sided CHECK (
        (debit > 0 AND credit = 0) OR (debit = 0 AND credit > 0)
    ),
    CONSTRAINT uq_journal_lines_number UNIQUE (entry_id, line_number)
);

CREATE INDEX idx_jl_account ON journal_lines(account_id);
";

const SEQUENCE_COUNTERS_SQL: &str = r"
CREATE TABLE sequence_counters (
    prefix VARCHAR(20) NOT NULL,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    last_value BIGINT NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    PRIMARY KEY (prefix, year, month),
    CONSTRAINT chk_counter_month CHECK (month BETWEEN 1 AND 12),
    CONSTRAINT chk_counter_non_negative CHECK (last_value >= 0)
);
";

const CASH_BANK_SUBLEDGERS_SQL: &str = r"
CREATE TABLE cash_bank_subledgers (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    account_id UUID NOT NULL REFERENCES accounts(id),
    name VARCHAR(255) NOT NULL,
    mirrored_balance NUMERIC(20, 4) NOT NULL DEFAULT 0,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_cash_bank_subledgers_account UNIQUE (account_id)
);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS cash_bank_subledgers CASCADE;
DROP TABLE IF EXISTS sequence_counters CASCADE;
DROP TABLE IF EXISTS journal_lines CASCADE;
DROP TABLE IF EXISTS journal_entries CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;

DROP TYPE IF EXISTS journal_status CASCADE;
DROP TYPE IF EXISTS account_type CASCADE;
";
