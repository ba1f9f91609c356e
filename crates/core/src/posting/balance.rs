//! Running-balance updates and the cash/bank subledger mirror.

use std::sync::Arc;

use rust_decimal::Decimal;
use tally_shared::types::AccountId;
use tracing::{debug, error, info};

use super::store::{LedgerStore, StoreError, SyncOutcome};
use crate::ledger::{JournalEntry, LedgerError};

/// Keeps cash/bank subledger balances equal to their GL accounts.
#[derive(Clone)]
pub struct SubledgerSynchronizer {
    store: Arc<dyn LedgerStore>,
}

impl SubledgerSynchronizer {
    /// Creates a synchronizer over `store`.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Copies the account's running balance onto its subledger, writing only on change.
    pub async fn sync(&self, account_id: AccountId) -> Result<SyncOutcome, LedgerError> {
        let outcome = self.store.sync_subledger(account_id).await?;
        if let SyncOutcome::Updated { from, to } = outcome {
            debug!(%account_id, %from, %to, "subledger balance synced");
        }
        Ok(outcome)
    }
}

/// Applies line amounts to running balances using the account's polarity.
#[derive(Clone)]
pub struct BalancePolarityUpdater {
    store: Arc<dyn LedgerStore>,
    subledgers: SubledgerSynchronizer,
}

impl BalancePolarityUpdater {
    /// Creates an updater over `store`.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            subledgers: SubledgerSynchronizer::new(Arc::clone(&store)),
            store,
        }
    }

    /// Applies one line and returns the account's new balance.
    ///
    /// The linked subledger is synced afterwards; a sync failure is logged
    /// and does not undo the balance change.
    pub async fn apply(
        &self,
        account_id: AccountId,
        debit: Decimal,
        credit: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let account = self
            .store
            .get_account(account_id)
            .await?
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let delta = account
            .account_type
            .normal_balance()
            .balance_delta(debit, credit);
        let new_balance = self.store.apply_balance_delta(account_id, delta).await?;

        debug!(
            %account_id,
            code = %account.code,
            %delta,
            %new_balance,
            "running balance updated"
        );

        if let Err(err) = self.subledgers.sync(account_id).await {
            error!(%account_id, error = %err, "subledger sync failed after balance update");
        }

        Ok(new_balance)
    }

    /// Applies every line of a committed entry, best effort.
    ///
    /// Failures are logged per line and counted; the entry stays committed and
    /// the drift is left for reconciliation.
    pub async fn apply_entry(&self, entry: &JournalEntry) -> usize {
        let mut failures = 0;

        for line in &entry.lines {
            if let Err(err) = self.apply(line.account_id, line.debit, line.credit).await {
                failures += 1;
                error!(
                    entry_id = %entry.id,
                    code = %entry.code,
                    line = line.line_number,
                    account_id = %line.account_id,
                    error = %err,
                    "balance update failed; journal stays committed"
                );
            }
        }

        if failures > 0 {
            info!(
                entry_id = %entry.id,
                failures,
                "entry committed with unapplied balance updates, run reconciliation"
            );
        }

        failures
    }
}
