//! Property-based tests for journal line validation.

use proptest::prelude::*;
use rust_decimal::Decimal;
use tally_shared::types::AccountId;

use super::error::LedgerError;
use super::types::CandidateLine;
use super::validation::validate_lines;

/// Strategy to generate a valid positive amount (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Balanced lines: each debit amount split into 1-3 credit lines.
fn balanced_lines() -> impl Strategy<Value = Vec<CandidateLine>> {
    prop::collection::vec((positive_amount(), 1usize..=3), 1..5).prop_map(|groups| {
        let mut lines = Vec::new();
        for (amount, parts) in groups {
            lines.push(CandidateLine::debit(AccountId::new(), amount, "debit"));
            let parts_dec = Decimal::from(parts);
            let share = (amount / parts_dec).round_dp(2);
            let mut remaining = amount;
            for i in 0..parts {
                let credit = if i + 1 == parts { remaining } else { share };
                remaining -= credit;
                if credit > Decimal::ZERO {
                    lines.push(CandidateLine::credit(AccountId::new(), credit, "credit"));
                }
            }
        }
        lines
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// **Property: balanced lines validate and report equal totals**
    #[test]
    fn prop_balanced_lines_accepted(lines in balanced_lines()) {
        let result = validate_lines(&lines);
        prop_assert!(result.is_ok(), "balanced lines rejected: {:?}", result);
        let totals = result.unwrap();
        prop_assert_eq!(totals.debit, totals.credit);
    }

    /// **Property: any nonzero skew is caught**
    ///
    /// *For any* balanced set, bumping one debit by any positive amount
    /// yields `UnbalancedEntry` whose totals differ by exactly that amount.
    #[test]
    fn prop_skew_detected(lines in balanced_lines(), skew in positive_amount()) {
        let mut lines = lines;
        lines[0].debit += skew;
        match validate_lines(&lines) {
            Err(LedgerError::UnbalancedEntry { debit, credit }) => {
                prop_assert_eq!(debit - credit, skew);
            }
            other => prop_assert!(false, "expected UnbalancedEntry, got {:?}", other),
        }
    }

    /// **Property: a zero line is rejected wherever it sits**
    #[test]
    fn prop_zero_line_rejected(lines in balanced_lines(), position in any::<prop::sample::Index>()) {
        let mut lines = lines;
        let at = position.index(lines.len() + 1);
        lines.insert(at, CandidateLine::debit(AccountId::new(), Decimal::ZERO, "empty"));
        let result = validate_lines(&lines);
        prop_assert!(
            matches!(result, Err(LedgerError::InvalidLine { line, .. }) if line == at + 1),
            "zero line at {} not reported: {:?}",
            at + 1,
            result
        );
    }
}
