//! Posting engine: turns business events into persisted, balanced journals.
//!
//! Storage sits behind [`LedgerStore`]; [`InMemoryLedgerStore`] is the
//! in-process implementation and the PostgreSQL one lives in `tally-db`.

pub mod balance;
pub mod memory;
pub mod poster;
pub mod reconcile;
pub mod resolver;
pub mod reversal;
pub mod sequence;
pub mod store;

#[cfg(test)]
mod testing;
#[cfg(test)]
mod tests;

pub use balance::{BalancePolarityUpdater, SubledgerSynchronizer};
pub use memory::InMemoryLedgerStore;
pub use poster::{JournalPoster, PostOutcome, PostingSettings};
pub use reconcile::{BalanceAuditor, BalanceDiscrepancy};
pub use resolver::{AccountRef, AccountResolver};
pub use reversal::ReversalEngine;
pub use sequence::{RetryPolicy, SequenceAllocator};
pub use store::{AccountActivity, LedgerStore, ReversalStamp, StoreError, SyncOutcome};
