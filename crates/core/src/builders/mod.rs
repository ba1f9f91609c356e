//! Line builders for business events.
//!
//! A builder turns one event into a [`JournalDraft`]; the poster validates,
//! numbers and persists it. Builders resolve accounts through the
//! [`AccountResolver`] they are given and never emit zero-amount lines.

pub mod adjustment;
pub mod cash_bank;
pub mod payment;
pub mod purchase;
pub mod sale;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tally_shared::ChartConfig;

use crate::ledger::{JournalDraft, LedgerError};
use crate::posting::{AccountRef, AccountResolver};

pub use adjustment::{AdjustmentBuilder, AdjustmentLine};
pub use cash_bank::{CashBankBuilder, CashBankEvent, CashBankMovement};
pub use payment::{PaymentBuilder, PaymentDirection, PaymentEvent};
pub use purchase::{
    PurchaseBuilder, PurchaseEvent, PurchaseTerms, PurchaseWithholding, PurchasedItem,
    WithholdingKind,
};
pub use sale::{SaleBuilder, SaleEvent, SaleTax, SoldItem, TaxKind};

/// Produces the candidate journal for one business event.
#[async_trait]
pub trait JournalBuilder: Send + Sync {
    /// Builds header metadata and candidate lines.
    async fn build(&self, accounts: &AccountResolver) -> Result<JournalDraft, LedgerError>;
}

/// A ready-made draft posts as-is.
#[async_trait]
impl JournalBuilder for JournalDraft {
    async fn build(&self, _accounts: &AccountResolver) -> Result<JournalDraft, LedgerError> {
        Ok(self.clone())
    }
}

/// How a document was settled.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Cash on hand.
    Cash,
    /// Bank transfer or card.
    Bank,
    /// On credit; settled later against receivables.
    Receivable,
    /// A specific account code, used verbatim.
    Other(String),
}

impl PaymentMethod {
    /// Cash, bank or named account the money moves through.
    #[must_use]
    pub fn settlement_account(&self, chart: &ChartConfig) -> AccountRef {
        match self {
            Self::Cash => AccountRef::from(&chart.cash),
            Self::Bank => AccountRef::from(&chart.bank),
            Self::Receivable => AccountRef::from(&chart.receivable),
            Self::Other(code) => AccountRef::code(code.clone()),
        }
    }

    /// Parses a free-text payment tag.
    ///
    /// # Errors
    ///
    /// `UnknownPaymentMethod` for tags that name no known method.
    pub fn parse(tag: &str) -> Result<Self, LedgerError> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "CASH" | "TUNAI" => Ok(Self::Cash),
            "BANK" | "TRANSFER" | "CREDIT_CARD" | "DEBIT_CARD" => Ok(Self::Bank),
            "CREDIT" | "PIUTANG" | "RECEIVABLE" => Ok(Self::Receivable),
            _ => Err(LedgerError::UnknownPaymentMethod(tag.to_string())),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cash => f.write_str("CASH"),
            Self::Bank => f.write_str("BANK"),
            Self::Receivable => f.write_str("RECEIVABLE"),
            Self::Other(code) => write!(f, "ACCOUNT {code}"),
        }
    }
}
