//! Cash and bank account movements.
//!
//! | Kind            | Debit       | Credit      | Reference                 |
//! |-----------------|-------------|-------------|---------------------------|
//! | Deposit         | cash/bank   | counter     | `DEP-{code}-{id}`         |
//! | Withdrawal      | counter     | cash/bank   | `WTH-{code}-{id}`         |
//! | Transfer        | destination | source      | `TRF-{from}-TO-{to}-{id}` |
//! | Opening balance | cash/bank   | owner equity| `OPN-{code}-{id}`         |
//!
//! The deposit counter account defaults to owner equity, the withdrawal one
//! to general expense.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::ChartConfig;
use tally_shared::types::UserId;

use super::JournalBuilder;
use crate::ledger::{Account, CandidateLine, JournalDraft, LedgerError, SourceRef, SourceType};
use crate::posting::{AccountRef, AccountResolver};

/// What happened to the cash or bank account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CashBankMovement {
    /// Money put in. `counter_code` overrides the owner-equity default.
    Deposit {
        /// Credited account code.
        #[serde(default)]
        counter_code: Option<String>,
    },
    /// Money taken out. `counter_code` overrides the general-expense default.
    Withdrawal {
        /// Debited account code.
        #[serde(default)]
        counter_code: Option<String>,
    },
    /// Money moved to another cash or bank account.
    Transfer {
        /// Destination account code.
        to_code: String,
    },
    /// Balance carried in when the account is first set up.
    OpeningBalance,
}

/// A cash or bank transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashBankEvent {
    /// Transaction ID.
    pub transaction_id: String,
    /// Code of the cash or bank account; the source account of a transfer.
    pub account_code: String,
    /// Kind of movement.
    #[serde(flatten)]
    pub movement: CashBankMovement,
    /// Amount moved.
    pub amount: Decimal,
    /// Transaction date; becomes the entry date.
    pub date: NaiveDate,
    /// Free-text note appended to the entry description.
    #[serde(default)]
    pub note: String,
    /// Who recorded the transaction.
    pub created_by: UserId,
}

impl CashBankEvent {
    /// Printed reference of the journal.
    #[must_use]
    pub fn reference(&self) -> String {
        let (code, id) = (&self.account_code, &self.transaction_id);
        match &self.movement {
            CashBankMovement::Deposit { .. } => format!("DEP-{code}-{id}"),
            CashBankMovement::Withdrawal { .. } => format!("WTH-{code}-{id}"),
            CashBankMovement::Transfer { to_code } => format!("TRF-{code}-TO-{to_code}-{id}"),
            CashBankMovement::OpeningBalance => format!("OPN-{code}-{id}"),
        }
    }

    /// Idempotency key of this transaction's journal.
    #[must_use]
    pub fn source(&self) -> SourceRef {
        SourceRef::new(SourceType::CashBank, self.transaction_id.clone())
    }
}

/// Builds the journal of a [`CashBankEvent`].
#[derive(Debug, Clone)]
pub struct CashBankBuilder {
    chart: ChartConfig,
    event: CashBankEvent,
}

impl CashBankBuilder {
    /// Creates a builder for `event` posting to `chart`.
    #[must_use]
    pub fn new(chart: ChartConfig, event: CashBankEvent) -> Self {
        Self { chart, event }
    }

    /// The event being posted.
    #[must_use]
    pub fn event(&self) -> &CashBankEvent {
        &self.event
    }

    /// Debited and credited accounts plus their memos.
    async fn sides(
        &self,
        accounts: &AccountResolver,
        own: &Account,
    ) -> Result<((Account, String), (Account, String)), LedgerError> {
        let event = &self.event;
        let sides = match &event.movement {
            CashBankMovement::Deposit { counter_code } => {
                let counter = accounts
                    .resolve_ref(&counter_account(
                        counter_code.as_ref(),
                        AccountRef::from(&self.chart.owner_equity),
                    ))
                    .await?;
                (
                    (own.clone(), format!("Deposit to {}", own.name)),
                    (counter, format!("Capital deposit to {}", own.name)),
                )
            }
            CashBankMovement::Withdrawal { counter_code } => {
                let counter = accounts
                    .resolve_ref(&counter_account(
                        counter_code.as_ref(),
                        AccountRef::from(&self.chart.general_expense),
                    ))
                    .await?;
                (
                    (counter, format!("Expense from {} withdrawal", own.name)),
                    (own.clone(), format!("Withdrawal from {}", own.name)),
                )
            }
            CashBankMovement::Transfer { to_code } => {
                let destination = accounts
                    .resolve_ref(&AccountRef::code(to_code.clone()))
                    .await?;
                if destination.id == own.id {
                    return Err(LedgerError::InvalidLine {
                        line: 2,
                        reason: "transfer source and destination are the same account",
                    });
                }
                let memo = format!("Transfer from {} to {}", own.name, destination.name);
                ((destination, memo.clone()), (own.clone(), memo))
            }
            CashBankMovement::OpeningBalance => {
                let equity = accounts
                    .resolve_ref(&AccountRef::from(&self.chart.owner_equity))
                    .await?;
                (
                    (own.clone(), format!("Opening balance for {}", own.name)),
                    (equity, format!("Owner equity - Opening balance {}", own.name)),
                )
            }
        };
        Ok(sides)
    }
}

fn counter_account(override_code: Option<&String>, default: AccountRef) -> AccountRef {
    override_code.map_or(default, |code| AccountRef::code(code.clone()))
}

#[async_trait]
impl JournalBuilder for CashBankBuilder {
    async fn build(&self, accounts: &AccountResolver) -> Result<JournalDraft, LedgerError> {
        let event = &self.event;
        let own = accounts
            .resolve_ref(&AccountRef::code(event.account_code.clone()))
            .await?;

        let mut lines = Vec::with_capacity(2);
        if !event.amount.is_zero() {
            let ((debited, debit_memo), (credited, credit_memo)) =
                self.sides(accounts, &own).await?;
            lines.push(CandidateLine::debit(debited.id, event.amount, debit_memo));
            lines.push(CandidateLine::credit(credited.id, event.amount, credit_memo));
        }

        let title = match &event.movement {
            CashBankMovement::Deposit { .. } => format!("Capital Deposit - {}", own.name),
            CashBankMovement::Withdrawal { .. } => format!("Cash/Bank Withdrawal - {}", own.name),
            CashBankMovement::Transfer { to_code } => {
                format!("Cash/Bank Transfer - From {} to {to_code}", own.name)
            }
            CashBankMovement::OpeningBalance => format!("Opening Balance - {}", own.name),
        };
        let description = if event.note.is_empty() {
            title
        } else {
            format!("{title}: {}", event.note)
        };

        Ok(JournalDraft {
            entry_date: event.date,
            description,
            reference: Some(event.reference()),
            created_by: event.created_by,
            lines,
        })
    }
}
