//! Double-entry bookkeeping logic with no I/O.
//!
//! - Domain types (accounts, journals, subledgers)
//! - Balance polarity
//! - Line validation
//! - Journal code numbering
//! - Reversing-entry construction
//! - Error types

pub mod balance;
pub mod error;
pub mod reversal;
pub mod sequence;
pub mod types;
pub mod validation;

#[cfg(test)]
mod reversal_props;
#[cfg(test)]
mod validation_props;

pub use balance::NormalBalance;
pub use error::LedgerError;
pub use sequence::{SequenceKey, SequenceNumber};
pub use types::{
    Account, AccountType, CandidateLine, CashBankSubledger, EntryTotals, JournalDraft,
    JournalEntry, JournalLine, JournalStatus, SourceRef, SourceType,
};
pub use validation::{MONEY_SCALE, round_money, validate_lines};
