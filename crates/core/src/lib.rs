//! Core ledger engine for Tally.
//!
//! This crate contains the double-entry posting engine with ZERO web or
//! database dependencies. Storage is reached through the
//! [`posting::LedgerStore`] trait.
//!
//! # Modules
//!
//! - `ledger` - Domain types, polarity, validation and reversal rules
//! - `posting` - Poster, reversal engine, sequences, balances and reconciliation
//! - `builders` - Line builders for sales, payments and manual adjustments

pub mod builders;
pub mod ledger;
pub mod posting;
