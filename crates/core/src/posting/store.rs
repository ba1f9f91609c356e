//! Storage seam for the posting engine.
//!
//! Implementations must provide these guarantees:
//! - `next_sequence` increments under exclusive access to the counter row and
//!   commits independently, so a value is never handed out twice.
//! - `insert_entry` writes header and lines all-or-nothing and enforces
//!   uniqueness of the active source slot and of the code itself.
//! - `record_reversal` re-checks the original's status under a lock, inserts
//!   the reversal, links both entries, and flips the original to REVERSED as
//!   one unit.
//! - `apply_balance_delta` is an atomic increment, never load-then-save.
//! - `sync_subledger` reads the running balance and writes the mirror while
//!   no increment on that account can run in between.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, JournalEntryId, UserId};
use thiserror::Error;

use crate::ledger::{
    Account, CashBankSubledger, JournalEntry, JournalStatus, LedgerError, SequenceKey, SourceRef,
};

/// Errors raised by a [`LedgerStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another active journal already occupies this source slot.
    #[error("An active journal already exists for {0}")]
    DuplicateSource(SourceRef),

    /// The journal code is already taken.
    #[error("Journal code {0} is already taken")]
    DuplicateCode(String),

    /// Account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Journal entry does not exist.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(JournalEntryId),

    /// Journal entry was not in the status the operation requires.
    #[error("Journal entry {id} is {status}")]
    InvalidStatus {
        /// Entry ID.
        id: JournalEntryId,
        /// Status found under lock.
        status: JournalStatus,
    },

    /// Backend failure (connection, constraint, serialization).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(id) => Self::AccountNotFound {
                attempted: vec![id.to_string()],
            },
            StoreError::EntryNotFound(id) => Self::EntryNotFound(id),
            StoreError::InvalidStatus {
                id,
                status: JournalStatus::Reversed,
            } => Self::AlreadyReversed(id),
            StoreError::InvalidStatus { id, status } => Self::NotPosted { id, status },
            StoreError::DuplicateSource(_) | StoreError::DuplicateCode(_) | StoreError::Backend(_) => {
                Self::StorageFailure(err.to_string())
            }
        }
    }
}

/// Lifetime debit and credit totals of one account over non-draft journals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountActivity {
    /// Account ID.
    pub account_id: AccountId,
    /// Sum of debits.
    pub debit_total: Decimal,
    /// Sum of credits.
    pub credit_total: Decimal,
}

/// What [`LedgerStore::sync_subledger`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No subledger references the account.
    NoSubledger,
    /// Mirror already matched.
    InSync,
    /// Mirror was rewritten.
    Updated {
        /// Previous mirrored balance.
        from: Decimal,
        /// New mirrored balance.
        to: Decimal,
    },
}

/// Reversal bookkeeping written onto the original entry.
#[derive(Debug, Clone)]
pub struct ReversalStamp {
    /// Who reversed it.
    pub reversed_by: UserId,
    /// Why.
    pub reason: String,
    /// When.
    pub reversed_at: DateTime<Utc>,
}

/// Persistence operations the posting engine relies on.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // ========== Accounts ==========

    /// Looks up an account by business code.
    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, StoreError>;

    /// Looks up an account by ID.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Lists every account.
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Atomically adds `delta` to the running balance and returns the new balance.
    async fn apply_balance_delta(&self, id: AccountId, delta: Decimal)
    -> Result<Decimal, StoreError>;

    // ========== Sequences ==========

    /// Increments the counter for `key` (creating it at zero first) and returns the new value.
    async fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError>;

    // ========== Journals ==========

    /// Returns the non-reversed entry for `source`, if any.
    async fn find_active_entry(&self, source: &SourceRef)
    -> Result<Option<JournalEntry>, StoreError>;

    /// Returns an entry with its lines.
    async fn get_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, StoreError>;

    /// Persists header and lines atomically.
    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), StoreError>;

    /// Persists `reversal` and marks `original_id` REVERSED, linked both ways.
    ///
    /// Fails with `InvalidStatus` if the original is not POSTED under lock.
    async fn record_reversal(
        &self,
        original_id: JournalEntryId,
        reversal: &JournalEntry,
        stamp: &ReversalStamp,
    ) -> Result<(), StoreError>;

    /// Debit and credit totals per account over every non-draft entry.
    async fn account_activity(&self) -> Result<Vec<AccountActivity>, StoreError>;

    // ========== Subledgers ==========

    /// Lists every subledger.
    async fn list_subledgers(&self) -> Result<Vec<CashBankSubledger>, StoreError>;

    /// Copies the account's running balance onto its linked subledger, if any.
    ///
    /// Balance increments on the account are held off between the read and
    /// the write, so the last sync to finish always mirrors the latest balance.
    async fn sync_subledger(&self, account_id: AccountId) -> Result<SyncOutcome, StoreError>;
}
