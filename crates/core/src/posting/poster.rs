//! Journal posting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tally_shared::PostingConfig;
use tally_shared::types::JournalEntryId;
use tracing::{info, instrument, warn};

use super::balance::BalancePolarityUpdater;
use super::resolver::AccountResolver;
use super::sequence::{RetryPolicy, SequenceAllocator};
use super::store::{LedgerStore, StoreError};
use crate::builders::JournalBuilder;
use crate::ledger::{JournalEntry, LedgerError, SourceRef, validate_lines};

/// Posting tunables shared by the poster and the reversal engine.
#[derive(Debug, Clone)]
pub struct PostingSettings {
    /// Prefix of ordinary journal codes.
    pub journal_prefix: String,
    /// Prefix of reversing journal codes.
    pub reversal_prefix: String,
    /// Code-assignment retry policy.
    pub retry: RetryPolicy,
    /// Budget for code assignment plus persistence.
    pub timeout: Duration,
}

impl From<&PostingConfig> for PostingSettings {
    fn from(config: &PostingConfig) -> Self {
        Self {
            journal_prefix: config.journal_prefix.clone(),
            reversal_prefix: config.reversal_prefix.clone(),
            retry: RetryPolicy {
                max_retries: config.code_retry_attempts,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
            },
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }
}

impl Default for PostingSettings {
    fn default() -> Self {
        Self::from(&PostingConfig::default())
    }
}

/// Result of [`JournalPoster::post`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "entry", rename_all = "snake_case")]
pub enum PostOutcome {
    /// A new entry was written and balances were applied.
    Created(JournalEntry),
    /// The source already had an active entry; nothing was written.
    Existing(JournalEntry),
}

impl PostOutcome {
    /// The created or existing entry.
    #[must_use]
    pub fn entry(&self) -> &JournalEntry {
        match self {
            Self::Created(entry) | Self::Existing(entry) => entry,
        }
    }

    /// Consumes the outcome, returning the entry.
    #[must_use]
    pub fn into_entry(self) -> JournalEntry {
        match self {
            Self::Created(entry) | Self::Existing(entry) => entry,
        }
    }

    /// True when this call wrote the entry.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Turns business events into balanced, persisted journal entries.
#[derive(Clone)]
pub struct JournalPoster {
    store: Arc<dyn LedgerStore>,
    resolver: AccountResolver,
    sequences: SequenceAllocator,
    balances: BalancePolarityUpdater,
    settings: PostingSettings,
}

impl JournalPoster {
    /// Creates a poster over `store`.
    pub fn new(store: Arc<dyn LedgerStore>, settings: PostingSettings) -> Self {
        Self {
            resolver: AccountResolver::new(Arc::clone(&store)),
            sequences: SequenceAllocator::new(Arc::clone(&store)),
            balances: BalancePolarityUpdater::new(Arc::clone(&store)),
            store,
            settings,
        }
    }

    /// The resolver builders receive.
    #[must_use]
    pub fn resolver(&self) -> &AccountResolver {
        &self.resolver
    }

    /// Posts the journal for `source`, or returns the one already posted.
    ///
    /// Steps:
    /// 1. Return the active entry for `source` if there is one
    /// 2. Build candidate lines
    /// 3. Validate them (exact decimal balance)
    /// 4. Assign a code, retrying only on code collisions
    /// 5. Persist header and lines atomically
    /// 6. Apply balances and subledger mirrors per line, best effort
    ///
    /// Steps 4 and 5 run under the time budget. When it runs out the entry is
    /// looked up by ID: if the insert committed anyway its balances are
    /// applied and it is returned as created, otherwise nothing was written.
    #[instrument(skip_all, fields(source = %source))]
    pub async fn post<B>(&self, source: SourceRef, builder: &B) -> Result<PostOutcome, LedgerError>
    where
        B: JournalBuilder + ?Sized,
    {
        if let Some(existing) = self.store.find_active_entry(&source).await? {
            info!(code = %existing.code, "source already posted, returning existing entry");
            return Ok(PostOutcome::Existing(existing));
        }

        let draft = builder.build(&self.resolver).await?;
        let totals = validate_lines(&draft.lines)?;

        // One ID across code retries, so a commit that outlives the budget can be found.
        let entry_id = JournalEntryId::new();
        let persist = self.sequences.with_fresh_code(
            &self.settings.journal_prefix,
            draft.entry_date,
            self.settings.retry,
            |code| {
                let entry = JournalEntry::posted_with_id(
                    entry_id,
                    code,
                    source.clone(),
                    draft.clone(),
                    totals,
                    Utc::now(),
                );
                let store = Arc::clone(&self.store);
                async move { store.insert_entry(&entry).await.map(|()| entry) }
            },
        );

        let Ok(inserted) = tokio::time::timeout(self.settings.timeout, persist).await else {
            return self.timed_out(entry_id).await;
        };

        let entry = match inserted {
            Ok(entry) => entry,
            Err(StoreError::DuplicateSource(_)) => return self.lost_race(&source).await,
            Err(err) => return Err(err.into()),
        };

        info!(
            entry_id = %entry.id,
            code = %entry.code,
            total = %entry.total_debit,
            lines = entry.lines.len(),
            "journal posted"
        );

        self.balances.apply_entry(&entry).await;
        Ok(PostOutcome::Created(entry))
    }

    /// The time budget ran out, possibly after the insert had committed.
    async fn timed_out(&self, entry_id: JournalEntryId) -> Result<PostOutcome, LedgerError> {
        let Some(entry) = self.store.get_entry(entry_id).await? else {
            return Err(LedgerError::StorageFailure(format!(
                "posting exceeded its time budget of {} ms",
                self.settings.timeout.as_millis()
            )));
        };

        warn!(
            entry_id = %entry.id,
            code = %entry.code,
            "journal committed after the time budget ran out, applying balances"
        );
        self.balances.apply_entry(&entry).await;
        Ok(PostOutcome::Created(entry))
    }

    /// A concurrent caller claimed the source slot between our check and insert.
    async fn lost_race(&self, source: &SourceRef) -> Result<PostOutcome, LedgerError> {
        match self.store.find_active_entry(source).await? {
            Some(existing) => {
                warn!(code = %existing.code, "concurrent post won the source slot");
                Ok(PostOutcome::Existing(existing))
            }
            None => Err(LedgerError::StorageFailure(format!(
                "active journal for {source} changed while posting"
            ))),
        }
    }
}
