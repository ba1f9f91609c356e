//! Journal line validation.
//!
//! Rules, checked in order:
//! 1. At least two lines
//! 2. Every line has exactly one positive side, at most [`MONEY_SCALE`]
//!    decimal places (line numbers are 1-based in errors)
//! 3. Total debits equal total credits exactly

use rust_decimal::{Decimal, RoundingStrategy};

use super::error::LedgerError;
use super::types::{CandidateLine, EntryTotals};

/// Decimal places stored for every money amount.
pub const MONEY_SCALE: u32 = 4;

/// Rounds `amount` to [`MONEY_SCALE`] places using banker's rounding.
#[must_use]
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointNearestEven)
}

/// Validates candidate lines and returns their totals.
pub fn validate_lines(lines: &[CandidateLine]) -> Result<EntryTotals, LedgerError> {
    if lines.len() < 2 {
        return Err(LedgerError::InsufficientLines(lines.len()));
    }

    for (idx, line) in lines.iter().enumerate() {
        check_line(line).map_err(|reason| LedgerError::InvalidLine {
            line: idx + 1,
            reason,
        })?;
    }

    let totals = EntryTotals::of(lines);
    if !totals.is_balanced() {
        return Err(LedgerError::UnbalancedEntry {
            debit: totals.debit,
            credit: totals.credit,
        });
    }

    Ok(totals)
}

fn check_line(line: &CandidateLine) -> Result<(), &'static str> {
    if line.debit.is_sign_negative() || line.credit.is_sign_negative() {
        return Err("amounts cannot be negative");
    }
    if round_money(line.debit) != line.debit || round_money(line.credit) != line.credit {
        return Err("amounts cannot have more than 4 decimal places");
    }
    match (line.debit.is_zero(), line.credit.is_zero()) {
        (true, true) => Err("debit or credit must be greater than zero"),
        (false, false) => Err("a line cannot carry both a debit and a credit"),
        _ => Ok(()),
    }
}
