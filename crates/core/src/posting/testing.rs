//! Fault injection around [`InMemoryLedgerStore`] for engine tests.

use std::ops::Deref;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tally_shared::types::{AccountId, JournalEntryId};
use tokio::sync::oneshot;

use super::memory::InMemoryLedgerStore;
use super::store::{AccountActivity, LedgerStore, ReversalStamp, StoreError, SyncOutcome};
use crate::ledger::{Account, CashBankSubledger, JournalEntry, SequenceKey, SourceRef};

struct SyncGate {
    parked: oneshot::Sender<()>,
    release: oneshot::Receiver<()>,
}

/// Delegates to an in-memory store, failing or stalling selected operations.
pub struct FlakyStore {
    inner: InMemoryLedgerStore,
    fail_sequences: AtomicBool,
    fail_balances: AtomicBool,
    fail_subledgers: AtomicBool,
    code_collisions: AtomicU32,
    insert_delay_ms: AtomicU64,
    stall_after_insert_ms: AtomicU64,
    sync_gate: Mutex<Option<SyncGate>>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryLedgerStore) -> Self {
        Self {
            inner,
            fail_sequences: AtomicBool::new(false),
            fail_balances: AtomicBool::new(false),
            fail_subledgers: AtomicBool::new(false),
            code_collisions: AtomicU32::new(0),
            insert_delay_ms: AtomicU64::new(0),
            stall_after_insert_ms: AtomicU64::new(0),
            sync_gate: Mutex::new(None),
        }
    }

    pub fn fail_sequences(&self, on: bool) {
        self.fail_sequences.store(on, Ordering::SeqCst);
    }

    pub fn fail_balances(&self, on: bool) {
        self.fail_balances.store(on, Ordering::SeqCst);
    }

    pub fn fail_subledgers(&self, on: bool) {
        self.fail_subledgers.store(on, Ordering::SeqCst);
    }

    /// The next `n` journal inserts report a code collision.
    pub fn collide_codes(&self, n: u32) {
        self.code_collisions.store(n, Ordering::SeqCst);
    }

    /// Stalls every journal insert before it touches storage.
    pub fn delay_inserts(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.insert_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Stalls every journal insert after it has been committed.
    pub fn stall_after_insert(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.stall_after_insert_ms.store(millis, Ordering::SeqCst);
    }

    /// Parks the next subledger sync before it reaches storage.
    ///
    /// The first receiver fires once the sync is parked; sending on the
    /// returned sender lets it continue.
    pub fn hold_next_subledger_sync(&self) -> (oneshot::Receiver<()>, oneshot::Sender<()>) {
        let (parked_tx, parked_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        *self.sync_gate.lock().unwrap() = Some(SyncGate {
            parked: parked_tx,
            release: release_rx,
        });
        (parked_rx, release_tx)
    }

    async fn after_insert(&self) {
        let stall = self.stall_after_insert_ms.load(Ordering::SeqCst);
        if stall > 0 {
            tokio::time::sleep(Duration::from_millis(stall)).await;
        }
    }

    async fn before_insert(&self, code: &str) -> Result<(), StoreError> {
        let delay = self.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        let collided = self
            .code_collisions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if collided {
            return Err(StoreError::DuplicateCode(code.to_string()));
        }
        Ok(())
    }

    fn backend_down() -> StoreError {
        StoreError::Backend("injected failure".to_string())
    }
}

impl Deref for FlakyStore {
    type Target = InMemoryLedgerStore;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        self.inner.find_account_by_code(code).await
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.inner.get_account(id).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.inner.list_accounts().await
    }

    async fn apply_balance_delta(
        &self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        if self.fail_balances.load(Ordering::SeqCst) {
            return Err(Self::backend_down());
        }
        self.inner.apply_balance_delta(id, delta).await
    }

    async fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        if self.fail_sequences.load(Ordering::SeqCst) {
            return Err(Self::backend_down());
        }
        self.inner.next_sequence(key).await
    }

    async fn find_active_entry(
        &self,
        source: &SourceRef,
    ) -> Result<Option<JournalEntry>, StoreError> {
        self.inner.find_active_entry(source).await
    }

    async fn get_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, StoreError> {
        self.inner.get_entry(id).await
    }

    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        self.before_insert(&entry.code).await?;
        self.inner.insert_entry(entry).await?;
        self.after_insert().await;
        Ok(())
    }

    async fn record_reversal(
        &self,
        original_id: JournalEntryId,
        reversal: &JournalEntry,
        stamp: &ReversalStamp,
    ) -> Result<(), StoreError> {
        self.before_insert(&reversal.code).await?;
        self.inner.record_reversal(original_id, reversal, stamp).await?;
        self.after_insert().await;
        Ok(())
    }

    async fn account_activity(&self) -> Result<Vec<AccountActivity>, StoreError> {
        self.inner.account_activity().await
    }

    async fn list_subledgers(&self) -> Result<Vec<CashBankSubledger>, StoreError> {
        self.inner.list_subledgers().await
    }

    async fn sync_subledger(&self, account_id: AccountId) -> Result<SyncOutcome, StoreError> {
        if self.fail_subledgers.load(Ordering::SeqCst) {
            return Err(Self::backend_down());
        }
        let gate = self.sync_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.parked.send(());
            let _ = gate.release.await;
        }
        self.inner.sync_subledger(account_id).await
    }
}
