//! Balance reconciliation against journal history.
//!
//! A running balance must always equal the polarity rule applied to the
//! account's lifetime debits and credits over non-draft journals. Reversed
//! originals stay in history because their reversals cancel them.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tally_shared::types::{AccountId, SubledgerId};
use tracing::{info, warn};

use super::store::LedgerStore;
use crate::ledger::{Account, LedgerError};

/// A balance that disagrees with what history implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceDiscrepancy {
    /// GL running balance drifted from journal history.
    Account {
        /// Account ID.
        account_id: AccountId,
        /// Account code.
        code: String,
        /// Stored running balance.
        recorded: Decimal,
        /// Balance recomputed from journal lines.
        expected: Decimal,
    },
    /// Subledger mirror drifted from its GL account.
    Subledger {
        /// Subledger ID.
        subledger_id: SubledgerId,
        /// Linked account.
        account_id: AccountId,
        /// Stored mirror.
        mirrored: Decimal,
        /// Account balance it should mirror.
        expected: Decimal,
    },
}

/// Audits and repairs balances.
#[derive(Clone)]
pub struct BalanceAuditor {
    store: Arc<dyn LedgerStore>,
}

impl BalanceAuditor {
    /// Creates an auditor over `store`.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Balance `account` should have according to journal history.
    pub async fn recompute(&self, account: &Account) -> Result<Decimal, LedgerError> {
        let activity = self.store.account_activity().await?;
        Ok(activity
            .iter()
            .find(|a| a.account_id == account.id)
            .map_or(Decimal::ZERO, |a| {
                account
                    .account_type
                    .normal_balance()
                    .balance_from_totals(a.debit_total, a.credit_total)
            }))
    }

    /// Lists every drifted account and subledger without changing anything.
    ///
    /// Subledgers are compared with what their account's balance should be,
    /// so a drifted account does not hide a drifted mirror.
    pub async fn audit(&self) -> Result<Vec<BalanceDiscrepancy>, LedgerError> {
        let expected = self.expected_balances().await?;
        let mut found = Vec::new();

        for account in self.store.list_accounts().await? {
            let should_be = expected.get(&account.id).copied().unwrap_or_default();
            if account.running_balance != should_be {
                found.push(BalanceDiscrepancy::Account {
                    account_id: account.id,
                    code: account.code.clone(),
                    recorded: account.running_balance,
                    expected: should_be,
                });
            }
        }

        for subledger in self.store.list_subledgers().await? {
            let should_be = expected
                .get(&subledger.account_id)
                .copied()
                .unwrap_or_default();
            if subledger.mirrored_balance != should_be {
                found.push(BalanceDiscrepancy::Subledger {
                    subledger_id: subledger.id,
                    account_id: subledger.account_id,
                    mirrored: subledger.mirrored_balance,
                    expected: should_be,
                });
            }
        }

        if found.is_empty() {
            info!("ledger balances reconcile with journal history");
        } else {
            warn!(discrepancies = found.len(), "ledger balances drifted from journal history");
        }
        Ok(found)
    }

    /// Corrects every drifted balance and returns what was changed.
    ///
    /// Needs a quiet ledger: a journal committed but not yet applied when the
    /// audit runs is counted by the audit and again when its own update lands.
    pub async fn repair(&self) -> Result<Vec<BalanceDiscrepancy>, LedgerError> {
        let drifted = self.audit().await?;
        self.repair_discrepancies(&drifted).await?;
        Ok(drifted)
    }

    /// Corrects the given discrepancies.
    ///
    /// Accounts receive the difference as an atomic increment, so balance
    /// updates that land after the audit are kept. Subledgers are re-synced
    /// from their account.
    pub async fn repair_discrepancies(
        &self,
        drifted: &[BalanceDiscrepancy],
    ) -> Result<(), LedgerError> {
        for discrepancy in drifted {
            match discrepancy {
                BalanceDiscrepancy::Account {
                    account_id,
                    code,
                    recorded,
                    expected,
                } => {
                    let now = self
                        .store
                        .apply_balance_delta(*account_id, *expected - *recorded)
                        .await?;
                    info!(%account_id, %code, from = %recorded, to = %now, "running balance repaired");
                }
                BalanceDiscrepancy::Subledger {
                    subledger_id,
                    account_id,
                    mirrored,
                    ..
                } => {
                    let outcome = self.store.sync_subledger(*account_id).await?;
                    info!(%subledger_id, from = %mirrored, ?outcome, "subledger mirror repaired");
                }
            }
        }
        Ok(())
    }

    async fn expected_balances(&self) -> Result<HashMap<AccountId, Decimal>, LedgerError> {
        let types: HashMap<AccountId, _> = self
            .store
            .list_accounts()
            .await?
            .into_iter()
            .map(|a| (a.id, a.account_type.normal_balance()))
            .collect();

        Ok(self
            .store
            .account_activity()
            .await?
            .into_iter()
            .filter_map(|activity| {
                types.get(&activity.account_id).map(|normal| {
                    (
                        activity.account_id,
                        normal.balance_from_totals(activity.debit_total, activity.credit_total),
                    )
                })
            })
            .collect())
    }
}
