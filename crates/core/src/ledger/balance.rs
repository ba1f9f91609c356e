//! Balance polarity.
//!
//! Every balance change in the ledger goes through [`NormalBalance::balance_delta`],
//! at posting, at reversal, and when recomputing a balance from history:
//!
//! - net change = debit - credit
//! - Asset/Expense (debit-normal): balance += net change
//! - Liability/Equity/Revenue (credit-normal): balance -= net change

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The side on which an account type's balance grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormalBalance {
    /// Assets and expenses.
    Debit,
    /// Liabilities, equity, and revenue.
    Credit,
}

impl NormalBalance {
    /// Signed change to a running balance for one line.
    #[must_use]
    pub fn balance_delta(self, debit: Decimal, credit: Decimal) -> Decimal {
        let net_change = debit - credit;
        match self {
            Self::Debit => net_change,
            Self::Credit => -net_change,
        }
    }

    /// Balance implied by lifetime debit and credit totals, starting from zero.
    #[must_use]
    pub fn balance_from_totals(self, debit_total: Decimal, credit_total: Decimal) -> Decimal {
        self.balance_delta(debit_total, credit_total)
    }
}
