//! Sequence allocation and code-assignment retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rand::Rng;
use tracing::warn;

use super::store::{LedgerStore, StoreError};
use crate::ledger::{SequenceKey, SequenceNumber};

/// Bounded retry with jittered exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles each time, plus up to one base of jitter.
    pub base_delay: Duration,
}

impl RetryPolicy {
    fn delay_for(&self, retry: u32) -> Duration {
        let base = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let backoff = base.saturating_mul(1u64 << retry.saturating_sub(1).min(16));
        let jitter = if base == 0 {
            0
        } else {
            rand::rng().random_range(0..=base)
        };
        Duration::from_millis(backoff.saturating_add(jitter))
    }
}

/// Issues per-(prefix, year, month) sequence numbers.
#[derive(Clone)]
pub struct SequenceAllocator {
    store: Arc<dyn LedgerStore>,
}

impl SequenceAllocator {
    /// Creates an allocator over `store`.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Returns the next number for `(prefix, year, month)`.
    ///
    /// Never fails: if the counter cannot be incremented, a timestamp is
    /// returned instead and the degraded path is logged.
    pub async fn next_sequence(&self, prefix: &str, year: i32, month: u32) -> SequenceNumber {
        self.next_for_key(&SequenceKey::new(prefix, year, month)).await
    }

    /// Returns the next number for `key`.
    pub async fn next_for_key(&self, key: &SequenceKey) -> SequenceNumber {
        match self.store.next_sequence(key).await {
            Ok(n) => SequenceNumber::Counter(n),
            Err(err) => {
                let millis = Utc::now().timestamp_millis();
                warn!(
                    %key,
                    error = %err,
                    fallback = millis,
                    "sequence counter unavailable, issuing timestamp code (degraded mode)"
                );
                SequenceNumber::Fallback(millis)
            }
        }
    }

    /// Next human-readable code for the month containing `date`.
    pub async fn next_code(&self, prefix: &str, date: NaiveDate) -> String {
        let key = SequenceKey::for_date(prefix, date);
        let number = self.next_for_key(&key).await;
        key.format_code(number)
    }

    /// Runs `insert` with freshly allocated codes until it stops failing with
    /// `DuplicateCode`, at most `1 + policy.max_retries` times.
    ///
    /// Any other error is returned immediately.
    pub async fn with_fresh_code<T, F, Fut>(
        &self,
        prefix: &str,
        date: NaiveDate,
        policy: RetryPolicy,
        mut insert: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut retry = 0;
        loop {
            let code = self.next_code(prefix, date).await;
            match insert(code).await {
                Err(StoreError::DuplicateCode(code)) if retry < policy.max_retries => {
                    retry += 1;
                    let delay = policy.delay_for(retry);
                    warn!(%code, retry, ?delay, "journal code collision, retrying");
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
