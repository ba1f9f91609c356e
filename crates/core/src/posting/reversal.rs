//! Compensating reversal of posted journals.

use std::sync::Arc;

use chrono::Utc;
use tally_shared::types::{JournalEntryId, UserId};
use tracing::{info, instrument, warn};

use super::balance::BalancePolarityUpdater;
use super::poster::PostingSettings;
use super::sequence::SequenceAllocator;
use super::store::{LedgerStore, ReversalStamp, StoreError};
use crate::ledger::reversal::{reversal_draft, swapped_totals};
use crate::ledger::{JournalEntry, JournalStatus, LedgerError, SourceRef, validate_lines};

/// Reverses posted entries with sign-swapped mirror entries.
#[derive(Clone)]
pub struct ReversalEngine {
    store: Arc<dyn LedgerStore>,
    sequences: SequenceAllocator,
    balances: BalancePolarityUpdater,
    settings: PostingSettings,
}

impl ReversalEngine {
    /// Creates a reversal engine over `store`.
    pub fn new(store: Arc<dyn LedgerStore>, settings: PostingSettings) -> Self {
        Self {
            sequences: SequenceAllocator::new(Arc::clone(&store)),
            balances: BalancePolarityUpdater::new(Arc::clone(&store)),
            store,
            settings,
        }
    }

    /// Reverses `entry_id` and returns the new reversing entry.
    ///
    /// The original must be POSTED. The reversal is dated now, carries the
    /// original's lines with debit and credit swapped, and is linked both
    /// ways; the original becomes REVERSED. Balances and subledgers are then
    /// updated exactly as for a posting.
    #[instrument(skip_all, fields(%entry_id, %actor))]
    pub async fn reverse(
        &self,
        entry_id: JournalEntryId,
        reason: &str,
        actor: UserId,
    ) -> Result<JournalEntry, LedgerError> {
        let original = self
            .store
            .get_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;

        match original.status {
            JournalStatus::Posted => {}
            JournalStatus::Reversed => return Err(LedgerError::AlreadyReversed(entry_id)),
            status @ JournalStatus::Draft => {
                return Err(LedgerError::NotPosted {
                    id: entry_id,
                    status,
                });
            }
        }

        let now = Utc::now();
        let draft = reversal_draft(&original, reason, actor, now);
        let totals = validate_lines(&draft.lines)?;
        debug_assert_eq!(totals, swapped_totals(&original));

        let stamp = ReversalStamp {
            reversed_by: actor,
            reason: reason.to_string(),
            reversed_at: now,
        };
        let source = SourceRef::reversal_of(entry_id);
        let reversal_id = JournalEntryId::new();

        let persist = self.sequences.with_fresh_code(
            &self.settings.reversal_prefix,
            draft.entry_date,
            self.settings.retry,
            |code| {
                let mut reversal = JournalEntry::posted_with_id(
                    reversal_id,
                    code,
                    source.clone(),
                    draft.clone(),
                    totals,
                    now,
                );
                reversal.reversed_entry_id = Some(entry_id);
                let store = Arc::clone(&self.store);
                let stamp = stamp.clone();
                async move {
                    store
                        .record_reversal(entry_id, &reversal, &stamp)
                        .await
                        .map(|()| reversal)
                }
            },
        );

        let Ok(persisted) = tokio::time::timeout(self.settings.timeout, persist).await else {
            return self.timed_out(reversal_id).await;
        };
        let reversal = persisted.map_err(|err| match err {
            // The REVERSAL slot for this entry is already taken.
            StoreError::DuplicateSource(_) => LedgerError::AlreadyReversed(entry_id),
            other => other.into(),
        })?;

        info!(
            reversal_id = %reversal.id,
            code = %reversal.code,
            original_code = %original.code,
            "journal reversed"
        );

        self.balances.apply_entry(&reversal).await;
        Ok(reversal)
    }

    /// The time budget ran out, possibly after the reversal had committed.
    async fn timed_out(&self, reversal_id: JournalEntryId) -> Result<JournalEntry, LedgerError> {
        let Some(reversal) = self.store.get_entry(reversal_id).await? else {
            return Err(LedgerError::StorageFailure(format!(
                "reversal exceeded its time budget of {} ms",
                self.settings.timeout.as_millis()
            )));
        };

        warn!(
            reversal_id = %reversal.id,
            code = %reversal.code,
            "reversal committed after the time budget ran out, applying balances"
        );
        self.balances.apply_entry(&reversal).await;
        Ok(reversal)
    }

    /// Reverses the active entry of `source`, if it has one.
    ///
    /// Used when a document leaves a posted state (a sale is cancelled).
    /// Returns `None` when there is nothing to reverse.
    pub async fn reverse_source(
        &self,
        source: &SourceRef,
        reason: &str,
        actor: UserId,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let Some(active) = self.store.find_active_entry(source).await? else {
            return Ok(None);
        };
        if active.status != JournalStatus::Posted {
            return Ok(None);
        }
        self.reverse(active.id, reason, actor).await.map(Some)
    }
}
