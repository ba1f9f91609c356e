//! Entity re-exports.

pub use super::accounts::Entity as Accounts;
pub use super::cash_bank_subledgers::Entity as CashBankSubledgers;
pub use super::journal_entries::Entity as JournalEntries;
pub use super::journal_lines::Entity as JournalLines;
pub use super::sequence_counters::Entity as SequenceCounters;
