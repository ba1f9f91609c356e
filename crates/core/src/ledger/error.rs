//! Ledger error types.
//!
//! Validation and lookup errors are raised before anything is written.
//! `StorageFailure` means the unit of work was rolled back and may be retried.

use rust_decimal::Decimal;
use tally_shared::AppError;
use tally_shared::types::JournalEntryId;
use thiserror::Error;

use super::types::JournalStatus;

/// Message shown to an operator when a transaction can never be recorded as-is.
pub const CANNOT_RECORD_MESSAGE: &str =
    "This transaction cannot be recorded. Please contact an administrator.";

/// Message shown to an operator when the same action can simply be repeated.
pub const TRY_AGAIN_MESSAGE: &str =
    "The ledger is busy and the transaction was not recorded. Please try again.";

/// Errors that can occur while posting or reversing journals.
#[derive(Debug, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// A journal needs at least one debit and one credit line.
    #[error("Journal must have at least 2 lines, got {0}")]
    InsufficientLines(usize),

    /// Debits and credits differ.
    #[error("Journal is not balanced. Debit: {debit}, Credit: {credit}, Difference: {}", .debit - .credit)]
    UnbalancedEntry {
        /// Total debit.
        debit: Decimal,
        /// Total credit.
        credit: Decimal,
    },

    /// A single line is malformed.
    #[error("Line {line} is invalid: {reason}")]
    InvalidLine {
        /// 1-based line number.
        line: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// Payment method tag not recognised at the call boundary.
    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),

    // ========== Lookup Errors ==========
    /// None of the codes tried resolved to an account.
    #[error("Account not found, tried: {}", .attempted.join(", "))]
    AccountNotFound {
        /// Every code (or id) tried, in order.
        attempted: Vec<String>,
    },

    /// Journal entry does not exist.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(JournalEntryId),

    // ========== State Errors ==========
    /// The entry has already been reversed.
    #[error("Journal entry {0} is already reversed")]
    AlreadyReversed(JournalEntryId),

    /// Only POSTED entries can be reversed.
    #[error("Journal entry {id} is {status}, only POSTED entries can be reversed")]
    NotPosted {
        /// Entry ID.
        id: JournalEntryId,
        /// Its current status.
        status: JournalStatus,
    },

    // ========== Storage Errors ==========
    /// Storage failed or the time budget ran out; nothing was committed.
    #[error("Storage failure: {0}")]
    StorageFailure(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientLines(_) => "INSUFFICIENT_LINES",
            Self::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            Self::InvalidLine { .. } => "INVALID_LINE",
            Self::UnknownPaymentMethod(_) => "UNKNOWN_PAYMENT_METHOD",
            Self::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::NotPosted { .. } => "NOT_POSTED",
            Self::StorageFailure(_) => "STORAGE_FAILURE",
        }
    }

    /// Returns true if repeating the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageFailure(_))
    }

    /// Operator-facing text. Only retryable failures invite a retry.
    #[must_use]
    pub fn operator_message(&self) -> String {
        match self {
            Self::InsufficientLines(_)
            | Self::UnbalancedEntry { .. }
            | Self::InvalidLine { .. }
            | Self::AccountNotFound { .. } => CANNOT_RECORD_MESSAGE.to_string(),
            Self::StorageFailure(_) => TRY_AGAIN_MESSAGE.to_string(),
            Self::UnknownPaymentMethod(_)
            | Self::EntryNotFound(_)
            | Self::AlreadyReversed(_)
            | Self::NotPosted { .. } => self.to_string(),
        }
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientLines(_)
            | LedgerError::UnbalancedEntry { .. }
            | LedgerError::InvalidLine { .. }
            | LedgerError::AccountNotFound { .. } => Self::BusinessRule(err.to_string()),
            LedgerError::UnknownPaymentMethod(_) => Self::Validation(err.to_string()),
            LedgerError::EntryNotFound(_) => Self::NotFound(err.to_string()),
            LedgerError::AlreadyReversed(_) | LedgerError::NotPosted { .. } => {
                Self::Conflict(err.to_string())
            }
            LedgerError::StorageFailure(_) => Self::Database(err.to_string()),
        }
    }
}
