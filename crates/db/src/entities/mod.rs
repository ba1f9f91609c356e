//! `SeaORM` entities for the ledger schema.

pub mod prelude;

pub mod accounts;
pub mod cash_bank_subledgers;
pub mod journal_entries;
pub mod journal_lines;
pub mod sea_orm_active_enums;
pub mod sequence_counters;
