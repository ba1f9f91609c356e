//! Manual journals with caller-chosen accounts.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::UserId;

use super::JournalBuilder;
use crate::ledger::{CandidateLine, JournalDraft, LedgerError};
use crate::posting::{AccountRef, AccountResolver};

/// One manual line addressed by account code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentLine {
    /// Account to post to.
    pub account: AccountRef,
    /// Debit amount.
    #[serde(default)]
    pub debit: Decimal,
    /// Credit amount.
    #[serde(default)]
    pub credit: Decimal,
    /// Line memo.
    #[serde(default)]
    pub description: String,
}

impl AdjustmentLine {
    /// A debit line.
    pub fn debit(account: AccountRef, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account,
            debit: amount,
            credit: Decimal::ZERO,
            description: description.into(),
        }
    }

    /// A credit line.
    pub fn credit(account: AccountRef, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account,
            debit: Decimal::ZERO,
            credit: amount,
            description: description.into(),
        }
    }
}

/// Builds a manual adjustment journal.
///
/// Lines with neither a debit nor a credit are dropped. Everything else goes
/// to validation as given, so a dual-sided or negative line is rejected there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentBuilder {
    /// Entry date.
    pub date: NaiveDate,
    /// Header description.
    pub description: String,
    /// External reference.
    #[serde(default)]
    pub reference: Option<String>,
    /// Who made the adjustment.
    pub created_by: UserId,
    /// Manual lines.
    pub lines: Vec<AdjustmentLine>,
}

#[async_trait]
impl JournalBuilder for AdjustmentBuilder {
    async fn build(&self, accounts: &AccountResolver) -> Result<JournalDraft, LedgerError> {
        let mut lines = Vec::with_capacity(self.lines.len());

        for line in &self.lines {
            if line.debit.is_zero() && line.credit.is_zero() {
                continue;
            }
            let account = accounts.resolve_ref(&line.account).await?;
            lines.push(CandidateLine {
                account_id: account.id,
                debit: line.debit,
                credit: line.credit,
                description: line.description.clone(),
            });
        }

        Ok(JournalDraft {
            entry_date: self.date,
            description: self.description.clone(),
            reference: self.reference.clone(),
            created_by: self.created_by,
            lines,
        })
    }
}
