//! Domain types for accounts, journals, and subledgers.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::types::{AccountId, JournalEntryId, JournalLineId, SubledgerId, UserId};

use super::balance::NormalBalance;

/// Chart-of-accounts classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    /// Things the business owns.
    Asset,
    /// Things the business owes.
    Liability,
    /// Owners' stake.
    Equity,
    /// Income earned.
    Revenue,
    /// Costs incurred.
    Expense,
}

impl AccountType {
    /// Which side increases a balance of this type.
    #[must_use]
    pub const fn normal_balance(self) -> NormalBalance {
        match self {
            Self::Asset | Self::Expense => NormalBalance::Debit,
            Self::Liability | Self::Equity | Self::Revenue => NormalBalance::Credit,
        }
    }

    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "ASSET",
            Self::Liability => "LIABILITY",
            Self::Equity => "EQUITY",
            Self::Revenue => "REVENUE",
            Self::Expense => "EXPENSE",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chart-of-accounts entry together with its running balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account ID.
    pub id: AccountId,
    /// Unique business code, e.g. `1101`.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Classification; decides balance polarity.
    pub account_type: AccountType,
    /// Balance in the account's normal direction.
    pub running_balance: Decimal,
}

/// Journal entry lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JournalStatus {
    /// Not yet posted; may be unbalanced.
    Draft,
    /// Posted and counted in balances.
    Posted,
    /// Undone by a later reversing entry.
    Reversed,
}

impl JournalStatus {
    /// Returns the storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Posted => "POSTED",
            Self::Reversed => "REVERSED",
        }
    }

    /// Whether the entry occupies its source document's single active slot.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Reversed)
    }

    /// Whether the entry's lines count towards account balances.
    #[must_use]
    pub const fn affects_balances(self) -> bool {
        !matches!(self, Self::Draft)
    }
}

impl fmt::Display for JournalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of business document a journal was posted for.
///
/// Equality and hashing go through [`SourceType::as_str`], so
/// `Other("SALE")` and `Sale` name the same idempotency slot, as they do in
/// storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SourceType {
    /// Completed sale.
    Sale,
    /// Customer payment.
    Payment,
    /// Payment to a supplier.
    SupplierPayment,
    /// Supplier purchase.
    Purchase,
    /// Cash or bank transaction.
    CashBank,
    /// Manual adjustment.
    Manual,
    /// Reversal of another journal; the source id is the original entry id.
    Reversal,
    /// Any other document kind.
    Other(String),
}

impl SourceType {
    /// Returns the storage representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sale => "SALE",
            Self::Payment => "PAYMENT",
            Self::SupplierPayment => "SUPPLIER_PAYMENT",
            Self::Purchase => "PURCHASE",
            Self::CashBank => "CASH_BANK",
            Self::Manual => "MANUAL",
            Self::Reversal => "REVERSAL",
            Self::Other(tag) => tag,
        }
    }
}

impl PartialEq for SourceType {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for SourceType {}

impl Hash for SourceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl From<String> for SourceType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "SALE" => Self::Sale,
            "PAYMENT" => Self::Payment,
            "SUPPLIER_PAYMENT" => Self::SupplierPayment,
            "PURCHASE" => Self::Purchase,
            "CASH_BANK" => Self::CashBank,
            "MANUAL" => Self::Manual,
            "REVERSAL" => Self::Reversal,
            _ => Self::Other(tag),
        }
    }
}

impl From<SourceType> for String {
    fn from(source_type: SourceType) -> Self {
        source_type.as_str().to_string()
    }
}

impl FromStr for SourceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_string()))
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The business document a journal belongs to. At most one active journal
/// exists per `SourceRef`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    /// Document kind.
    pub source_type: SourceType,
    /// Document identifier within its kind.
    pub source_id: String,
}

impl SourceRef {
    /// Creates a source reference.
    pub fn new(source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
        }
    }

    /// The source slot used by the reversal of `entry_id`.
    #[must_use]
    pub fn reversal_of(entry_id: JournalEntryId) -> Self {
        Self::new(SourceType::Reversal, entry_id.to_string())
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.source_type, self.source_id)
    }
}

/// A line proposed by a journal builder, before numbering and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateLine {
    /// Account to post to.
    pub account_id: AccountId,
    /// Debit amount (zero for a credit line).
    pub debit: Decimal,
    /// Credit amount (zero for a debit line).
    pub credit: Decimal,
    /// Line narrative.
    pub description: String,
}

impl CandidateLine {
    /// Creates a debit line.
    pub fn debit(account_id: AccountId, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Decimal::ZERO,
            description: description.into(),
        }
    }

    /// Creates a credit line.
    pub fn credit(account_id: AccountId, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account_id,
            debit: Decimal::ZERO,
            credit: amount,
            description: description.into(),
        }
    }
}

/// Everything a builder produces for one business event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Header narrative.
    pub description: String,
    /// External reference such as an invoice number.
    pub reference: Option<String>,
    /// User recording the event.
    pub created_by: UserId,
    /// Candidate lines in display order.
    pub lines: Vec<CandidateLine>,
}

/// Debit and credit totals of a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntryTotals {
    /// Sum of debits.
    pub debit: Decimal,
    /// Sum of credits.
    pub credit: Decimal,
}

impl EntryTotals {
    /// Sums the given lines.
    #[must_use]
    pub fn of(lines: &[CandidateLine]) -> Self {
        Self {
            debit: lines.iter().map(|l| l.debit).sum(),
            credit: lines.iter().map(|l| l.credit).sum(),
        }
    }

    /// Debits minus credits.
    #[must_use]
    pub fn difference(&self) -> Decimal {
        self.debit - self.credit
    }

    /// True when debits equal credits exactly.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.debit == self.credit
    }
}

/// A persisted journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Line ID.
    pub id: JournalLineId,
    /// Owning entry.
    pub entry_id: JournalEntryId,
    /// 1-based position within the entry.
    pub line_number: u32,
    /// Account posted to.
    pub account_id: AccountId,
    /// Line narrative.
    pub description: String,
    /// Debit amount.
    pub debit: Decimal,
    /// Credit amount.
    pub credit: Decimal,
}

/// A journal entry header with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Entry ID.
    pub id: JournalEntryId,
    /// Human-readable code, e.g. `JE-202610-0001`.
    pub code: String,
    /// Business document this entry records.
    pub source: SourceRef,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Header narrative.
    pub description: String,
    /// External reference.
    pub reference: Option<String>,
    /// Lifecycle status.
    pub status: JournalStatus,
    /// Sum of line debits.
    pub total_debit: Decimal,
    /// Sum of line credits.
    pub total_credit: Decimal,
    /// On an original: the entry that reversed it.
    pub reversal_id: Option<JournalEntryId>,
    /// On a reversing entry: the entry it reverses.
    pub reversed_entry_id: Option<JournalEntryId>,
    /// Creator.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Posting time.
    pub posted_at: Option<DateTime<Utc>>,
    /// When the entry was reversed.
    pub reversed_at: Option<DateTime<Utc>>,
    /// Who reversed the entry.
    pub reversed_by: Option<UserId>,
    /// Why the entry was reversed.
    pub reversal_reason: Option<String>,
    /// Lines ordered by `line_number`.
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Assembles a POSTED entry from a validated draft, numbering lines from 1.
    #[must_use]
    pub fn posted(
        code: String,
        source: SourceRef,
        draft: JournalDraft,
        totals: EntryTotals,
        now: DateTime<Utc>,
    ) -> Self {
        Self::posted_with_id(JournalEntryId::new(), code, source, draft, totals, now)
    }

    /// Like [`JournalEntry::posted`], with a caller-chosen entry ID.
    #[must_use]
    pub fn posted_with_id(
        id: JournalEntryId,
        code: String,
        source: SourceRef,
        draft: JournalDraft,
        totals: EntryTotals,
        now: DateTime<Utc>,
    ) -> Self {
        let lines = draft
            .lines
            .into_iter()
            .zip(1u32..)
            .map(|(line, line_number)| JournalLine {
                id: JournalLineId::new(),
                entry_id: id,
                line_number,
                account_id: line.account_id,
                description: line.description,
                debit: line.debit,
                credit: line.credit,
            })
            .collect();

        Self {
            id,
            code,
            source,
            entry_date: draft.entry_date,
            description: draft.description,
            reference: draft.reference,
            status: JournalStatus::Posted,
            total_debit: totals.debit,
            total_credit: totals.credit,
            reversal_id: None,
            reversed_entry_id: None,
            created_by: draft.created_by,
            created_at: now,
            posted_at: Some(now),
            reversed_at: None,
            reversed_by: None,
            reversal_reason: None,
            lines,
        }
    }

    /// Totals recomputed from the lines.
    #[must_use]
    pub fn line_totals(&self) -> EntryTotals {
        EntryTotals {
            debit: self.lines.iter().map(|l| l.debit).sum(),
            credit: self.lines.iter().map(|l| l.credit).sum(),
        }
    }
}

/// Cash/bank subsidiary record mirroring one GL account's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashBankSubledger {
    /// Subledger ID.
    pub id: SubledgerId,
    /// Linked GL account; at most one subledger per account.
    pub account_id: AccountId,
    /// Display name, e.g. "Petty cash".
    pub name: String,
    /// Copy of the linked account's running balance.
    pub mirrored_balance: Decimal,
}
