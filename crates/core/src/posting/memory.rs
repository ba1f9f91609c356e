//! In-process [`LedgerStore`].
//!
//! Counters and balances are `DashMap` entries, so each increment runs under
//! that key's shard lock; a subledger sync holds its account's entry while it
//! writes the mirror. Journals sit behind one `RwLock` together with the
//! active-source and code indexes, which makes check-and-insert atomic.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, JournalEntryId, SubledgerId};
use tokio::sync::RwLock;

use super::store::{AccountActivity, LedgerStore, ReversalStamp, StoreError, SyncOutcome};
use crate::ledger::{
    Account, AccountType, CashBankSubledger, JournalEntry, JournalStatus, SequenceKey, SourceRef,
};

#[derive(Default)]
struct JournalBook {
    entries: HashMap<JournalEntryId, JournalEntry>,
    active_sources: HashMap<SourceRef, JournalEntryId>,
    codes: HashSet<String>,
}

impl JournalBook {
    fn check_insertable(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        if entry.status.is_active() && self.active_sources.contains_key(&entry.source) {
            return Err(StoreError::DuplicateSource(entry.source.clone()));
        }
        if self.codes.contains(&entry.code) {
            return Err(StoreError::DuplicateCode(entry.code.clone()));
        }
        Ok(())
    }

    fn insert(&mut self, entry: JournalEntry) {
        if entry.status.is_active() {
            self.active_sources.insert(entry.source.clone(), entry.id);
        }
        self.codes.insert(entry.code.clone());
        self.entries.insert(entry.id, entry);
    }
}

/// Ledger storage held entirely in memory.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    accounts: DashMap<AccountId, Account>,
    account_codes: DashMap<String, AccountId>,
    counters: DashMap<SequenceKey, u64>,
    subledgers: DashMap<SubledgerId, CashBankSubledger>,
    journals: RwLock<JournalBook>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account with a zero balance.
    pub fn add_account(&self, code: &str, name: &str, account_type: AccountType) -> Account {
        let account = Account {
            id: AccountId::new(),
            code: code.to_string(),
            name: name.to_string(),
            account_type,
            running_balance: Decimal::ZERO,
        };
        self.account_codes.insert(account.code.clone(), account.id);
        self.accounts.insert(account.id, account.clone());
        account
    }

    /// Links a cash/bank subledger to `account_id`, mirroring its current balance.
    pub fn add_subledger(&self, account_id: AccountId, name: &str) -> CashBankSubledger {
        let mirrored_balance = self
            .accounts
            .get(&account_id)
            .map_or(Decimal::ZERO, |a| a.running_balance);
        let subledger = CashBankSubledger {
            id: SubledgerId::new(),
            account_id,
            name: name.to_string(),
            mirrored_balance,
        };
        self.subledgers.insert(subledger.id, subledger.clone());
        subledger
    }

    /// Snapshot of one account.
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.accounts.get(&id).map(|a| a.clone())
    }

    /// Snapshot of one subledger.
    pub fn subledger(&self, id: SubledgerId) -> Option<CashBankSubledger> {
        self.subledgers.get(&id).map(|s| s.clone())
    }

    /// Every journal entry, ordered by code.
    pub async fn entries(&self) -> Vec<JournalEntry> {
        let book = self.journals.read().await;
        let mut entries: Vec<JournalEntry> = book.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.code.cmp(&b.code));
        entries
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        Ok(self
            .account_codes
            .get(code)
            .and_then(|id| self.account(*id)))
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.account(id))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let mut accounts: Vec<Account> = self.accounts.iter().map(|a| a.clone()).collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn apply_balance_delta(
        &self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let mut account = self
            .accounts
            .get_mut(&id)
            .ok_or(StoreError::AccountNotFound(id))?;
        account.running_balance += delta;
        Ok(account.running_balance)
    }

    async fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        let mut counter = self.counters.entry(key.clone()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn find_active_entry(
        &self,
        source: &SourceRef,
    ) -> Result<Option<JournalEntry>, StoreError> {
        let book = self.journals.read().await;
        Ok(book
            .active_sources
            .get(source)
            .and_then(|id| book.entries.get(id))
            .cloned())
    }

    async fn get_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, StoreError> {
        Ok(self.journals.read().await.entries.get(&id).cloned())
    }

    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        if let Some(line) = entry
            .lines
            .iter()
            .find(|l| !self.accounts.contains_key(&l.account_id))
        {
            return Err(StoreError::AccountNotFound(line.account_id));
        }

        let mut book = self.journals.write().await;
        book.check_insertable(entry)?;
        book.insert(entry.clone());
        Ok(())
    }

    async fn record_reversal(
        &self,
        original_id: JournalEntryId,
        reversal: &JournalEntry,
        stamp: &ReversalStamp,
    ) -> Result<(), StoreError> {
        let mut book = self.journals.write().await;

        let original = book
            .entries
            .get(&original_id)
            .ok_or(StoreError::EntryNotFound(original_id))?;
        if original.status != JournalStatus::Posted {
            return Err(StoreError::InvalidStatus {
                id: original_id,
                status: original.status,
            });
        }
        let original_source = original.source.clone();
        book.check_insertable(reversal)?;

        book.insert(reversal.clone());
        book.active_sources.remove(&original_source);
        if let Some(original) = book.entries.get_mut(&original_id) {
            original.status = JournalStatus::Reversed;
            original.reversal_id = Some(reversal.id);
            original.reversed_at = Some(stamp.reversed_at);
            original.reversed_by = Some(stamp.reversed_by);
            original.reversal_reason = Some(stamp.reason.clone());
        }
        Ok(())
    }

    async fn account_activity(&self) -> Result<Vec<AccountActivity>, StoreError> {
        let book = self.journals.read().await;
        let mut totals: HashMap<AccountId, (Decimal, Decimal)> = HashMap::new();

        for entry in book.entries.values().filter(|e| e.status.affects_balances()) {
            for line in &entry.lines {
                let slot = totals.entry(line.account_id).or_default();
                slot.0 += line.debit;
                slot.1 += line.credit;
            }
        }

        Ok(totals
            .into_iter()
            .map(|(account_id, (debit_total, credit_total))| AccountActivity {
                account_id,
                debit_total,
                credit_total,
            })
            .collect())
    }

    async fn list_subledgers(&self) -> Result<Vec<CashBankSubledger>, StoreError> {
        Ok(self.subledgers.iter().map(|s| s.clone()).collect())
    }

    async fn sync_subledger(&self, account_id: AccountId) -> Result<SyncOutcome, StoreError> {
        // The account guard blocks `apply_balance_delta` until the mirror is written.
        let account = self
            .accounts
            .get(&account_id)
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let Some(mut subledger) = self
            .subledgers
            .iter_mut()
            .find(|s| s.account_id == account_id)
        else {
            return Ok(SyncOutcome::NoSubledger);
        };

        if subledger.mirrored_balance == account.running_balance {
            return Ok(SyncOutcome::InSync);
        }

        let from = subledger.mirrored_balance;
        subledger.mirrored_balance = account.running_balance;
        Ok(SyncOutcome::Updated {
            from,
            to: account.running_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{CandidateLine, EntryTotals, JournalDraft, SourceType};
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use tally_shared::types::UserId;

    fn entry(store: &InMemoryLedgerStore, source_id: &str, code: &str) -> JournalEntry {
        let cash = store
            .account_codes
            .get("1101")
            .map(|id| *id)
            .unwrap_or_else(|| store.add_account("1101", "Cash", AccountType::Asset).id);
        let sales = store
            .account_codes
            .get("4101")
            .map(|id| *id)
            .unwrap_or_else(|| store.add_account("4101", "Sales", AccountType::Revenue).id);
        let lines = vec![
            CandidateLine::debit(cash, dec!(10), "cash"),
            CandidateLine::credit(sales, dec!(10), "sales"),
        ];
        let totals = EntryTotals::of(&lines);
        JournalEntry::posted(
            code.to_string(),
            SourceRef::new(SourceType::Sale, source_id),
            JournalDraft {
                entry_date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
                description: "sale".to_string(),
                reference: None,
                created_by: UserId::new(),
                lines,
            },
            totals,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_enforces_active_source_and_code() {
        let store = InMemoryLedgerStore::new();
        let first = entry(&store, "1", "JE-202610-0001");
        store.insert_entry(&first).await.unwrap();

        let same_source = entry(&store, "1", "JE-202610-0002");
        assert!(matches!(
            store.insert_entry(&same_source).await,
            Err(StoreError::DuplicateSource(_))
        ));

        let same_code = entry(&store, "2", "JE-202610-0001");
        assert!(matches!(
            store.insert_entry(&same_code).await,
            Err(StoreError::DuplicateCode(_))
        ));

        let found = store
            .find_active_entry(&SourceRef::new(SourceType::Sale, "1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_spelled_out_source_type_shares_slot() {
        let store = InMemoryLedgerStore::new();
        store.insert_entry(&entry(&store, "5", "JE-202610-0001")).await.unwrap();

        let mut spelled = entry(&store, "5", "JE-202610-0002");
        spelled.source = SourceRef::new(SourceType::Other("SALE".to_string()), "5");
        assert!(matches!(
            store.insert_entry(&spelled).await,
            Err(StoreError::DuplicateSource(_))
        ));
        assert!(store.find_active_entry(&spelled.source).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_record_reversal_frees_source_slot() {
        let store = InMemoryLedgerStore::new();
        let original = entry(&store, "7", "JE-202610-0001");
        store.insert_entry(&original).await.unwrap();

        let mut reversal = entry(&store, &original.id.to_string(), "RV-202610-0001");
        reversal.source = SourceRef::reversal_of(original.id);
        let stamp = ReversalStamp {
            reversed_by: UserId::new(),
            reason: "typo".to_string(),
            reversed_at: Utc::now(),
        };
        store
            .record_reversal(original.id, &reversal, &stamp)
            .await
            .unwrap();

        let stored = store.get_entry(original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JournalStatus::Reversed);
        assert_eq!(stored.reversal_id, Some(reversal.id));
        assert!(
            store
                .find_active_entry(&original.source)
                .await
                .unwrap()
                .is_none()
        );

        let again = store.record_reversal(original.id, &reversal, &stamp).await;
        assert!(matches!(
            again,
            Err(StoreError::InvalidStatus {
                status: JournalStatus::Reversed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_account() {
        let store = InMemoryLedgerStore::new();
        let mut bad = entry(&store, "9", "JE-202610-0009");
        bad.lines[0].account_id = AccountId::new();
        assert!(matches!(
            store.insert_entry(&bad).await,
            Err(StoreError::AccountNotFound(_))
        ));
    }
}
