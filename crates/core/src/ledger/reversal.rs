//! Reversing-entry construction.
//!
//! A reversal mirrors every line of the original with debit and credit
//! swapped, so each account's balance delta is exactly negated. Amounts,
//! accounts, and line order are preserved.

use chrono::{DateTime, Utc};
use tally_shared::types::UserId;

use super::types::{CandidateLine, EntryTotals, JournalDraft, JournalEntry, JournalLine};

/// Prefix marking reversing narratives.
pub const REVERSAL_PREFIX: &str = "Reversal: ";

/// Mirrors persisted lines with debit and credit swapped.
#[must_use]
pub fn mirror_lines(lines: &[JournalLine]) -> Vec<CandidateLine> {
    lines
        .iter()
        .map(|line| CandidateLine {
            account_id: line.account_id,
            debit: line.credit,
            credit: line.debit,
            description: format!("{REVERSAL_PREFIX}{}", line.description),
        })
        .collect()
}

/// Builds the draft of the entry that reverses `original`, dated at `at`.
#[must_use]
pub fn reversal_draft(
    original: &JournalEntry,
    reason: &str,
    actor: UserId,
    at: DateTime<Utc>,
) -> JournalDraft {
    JournalDraft {
        entry_date: at.date_naive(),
        description: format!(
            "{REVERSAL_PREFIX}{} ({}). Reason: {reason}",
            original.description, original.code
        ),
        reference: Some(format!("REV-{}", original.code)),
        created_by: actor,
        lines: mirror_lines(&original.lines),
    }
}

/// Totals a reversal of `original` must carry: the original's, swapped.
#[must_use]
pub fn swapped_totals(original: &JournalEntry) -> EntryTotals {
    EntryTotals {
        debit: original.total_credit,
        credit: original.total_debit,
    }
}
