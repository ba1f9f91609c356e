//! Property-based tests for reversing-entry construction.

use chrono::{NaiveDate, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::HashMap;
use tally_shared::types::{AccountId, UserId};
use uuid::Uuid;

use super::balance::NormalBalance;
use super::reversal::{reversal_draft, swapped_totals};
use super::types::{CandidateLine, EntryTotals, JournalDraft, JournalEntry, SourceRef, SourceType};
use super::validation::validate_lines;

/// Strategy for generating random account IDs.
fn arb_account() -> impl Strategy<Value = AccountId> {
    any::<u128>().prop_map(|n| AccountId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating random positive Decimal amounts.
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..1_000_000i64).prop_map(|n| Decimal::new(n, 2))
}

fn arb_normal() -> impl Strategy<Value = NormalBalance> {
    prop_oneof![Just(NormalBalance::Debit), Just(NormalBalance::Credit)]
}

/// Balanced entries built from 1-3 debit/credit pairs.
fn arb_posted_entry() -> impl Strategy<Value = JournalEntry> {
    prop::collection::vec((arb_account(), arb_account(), arb_amount()), 1..=3).prop_map(|pairs| {
        let lines: Vec<CandidateLine> = pairs
            .into_iter()
            .flat_map(|(debit_account, credit_account, amount)| {
                [
                    CandidateLine::debit(debit_account, amount, "dr"),
                    CandidateLine::credit(credit_account, amount, "cr"),
                ]
            })
            .collect();
        let totals = EntryTotals::of(&lines);
        let draft = JournalDraft {
            entry_date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            description: "generated".to_string(),
            reference: None,
            created_by: UserId::new(),
            lines,
        };
        JournalEntry::posted(
            "JE-202610-0001".to_string(),
            SourceRef::new(SourceType::Manual, "gen"),
            draft,
            totals,
            Utc::now(),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property: the reversal of a balanced entry is balanced**
    #[test]
    fn prop_reversal_is_balanced(entry in arb_posted_entry()) {
        let draft = reversal_draft(&entry, "void", UserId::new(), Utc::now());
        let totals = validate_lines(&draft.lines);
        prop_assert!(totals.is_ok(), "reversal rejected: {:?}", totals);
        prop_assert_eq!(totals.unwrap(), swapped_totals(&entry));
    }

    /// **Property: original plus reversal nets to zero on every account**
    ///
    /// *For any* posted entry and any polarity assignment, summing the
    /// balance deltas of original and reversal per account gives zero.
    #[test]
    fn prop_round_trip_nets_to_zero(entry in arb_posted_entry(), normal in arb_normal()) {
        let draft = reversal_draft(&entry, "void", UserId::new(), Utc::now());
        let mut net: HashMap<AccountId, Decimal> = HashMap::new();

        for line in &entry.lines {
            *net.entry(line.account_id).or_default() += normal.balance_delta(line.debit, line.credit);
        }
        for line in &draft.lines {
            *net.entry(line.account_id).or_default() += normal.balance_delta(line.debit, line.credit);
        }

        prop_assert!(net.values().all(Decimal::is_zero));
    }

    /// **Property: reversal preserves accounts, amounts, and order**
    #[test]
    fn prop_reversal_preserves_shape(entry in arb_posted_entry()) {
        let draft = reversal_draft(&entry, "void", UserId::new(), Utc::now());
        prop_assert_eq!(draft.lines.len(), entry.lines.len());
        for (orig, rev) in entry.lines.iter().zip(&draft.lines) {
            prop_assert_eq!(rev.account_id, orig.account_id);
            prop_assert_eq!(rev.debit + rev.credit, orig.debit + orig.credit);
        }
    }
}
