//! Purchase journal.
//!
//! | Side   | Account                         | Amount                     |
//! |--------|---------------------------------|----------------------------|
//! | Debit  | item account (inventory default)| each nonzero item          |
//! | Debit  | input tax                       | input tax                  |
//! | Credit | payable, or cash/bank when paid | items + input tax − withheld |
//! | Credit | PPh21 / PPh23 payable           | each nonzero withholding   |

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::ChartConfig;
use tally_shared::types::UserId;

use super::{JournalBuilder, PaymentMethod};
use crate::ledger::{CandidateLine, JournalDraft, LedgerError, SourceRef, SourceType};
use crate::posting::{AccountRef, AccountResolver};

/// Income tax withheld from a supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithholdingKind {
    /// Article 21, on payments to individuals.
    Pph21,
    /// Article 23, on services.
    Pph23,
}

/// One withholding deducted from a purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseWithholding {
    /// Tax article.
    pub kind: WithholdingKind,
    /// Amount withheld.
    pub amount: Decimal,
}

/// One purchased line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchasedItem {
    /// Shown on the journal line.
    pub description: String,
    /// Line total before tax.
    pub amount: Decimal,
    /// Expense or asset account for non-stock items. Stock goes to inventory.
    #[serde(default)]
    pub account_code: Option<String>,
}

/// How a purchase was settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseTerms {
    /// Owed to the supplier.
    OnCredit,
    /// Paid at once through the given account.
    Paid(PaymentMethod),
}

/// A received purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    /// Purchase document ID.
    pub purchase_id: String,
    /// Purchase order or supplier invoice number.
    pub reference: String,
    /// Purchase date; becomes the entry date.
    pub date: NaiveDate,
    /// Supplier, when known.
    pub vendor_name: Option<String>,
    /// Items bought.
    pub items: Vec<PurchasedItem>,
    /// Input VAT charged by the supplier.
    #[serde(default)]
    pub input_tax: Decimal,
    /// Income taxes withheld from the supplier.
    #[serde(default)]
    pub withholdings: Vec<PurchaseWithholding>,
    /// Settlement.
    pub terms: PurchaseTerms,
    /// Who recorded the purchase.
    pub created_by: UserId,
}

impl PurchaseEvent {
    /// Sum of the item amounts.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(|i| i.amount).sum()
    }

    /// Amount owed or paid to the supplier.
    #[must_use]
    pub fn net_payable(&self) -> Decimal {
        let withheld: Decimal = self.withholdings.iter().map(|w| w.amount).sum();
        self.subtotal() + self.input_tax - withheld
    }

    /// Idempotency key of this purchase's journal.
    #[must_use]
    pub fn source(&self) -> SourceRef {
        SourceRef::new(SourceType::Purchase, self.purchase_id.clone())
    }
}

/// Builds the journal of a [`PurchaseEvent`].
#[derive(Debug, Clone)]
pub struct PurchaseBuilder {
    chart: ChartConfig,
    event: PurchaseEvent,
}

impl PurchaseBuilder {
    /// Creates a builder for `event` posting to `chart`.
    #[must_use]
    pub fn new(chart: ChartConfig, event: PurchaseEvent) -> Self {
        Self { chart, event }
    }

    fn settlement_account(&self) -> Result<AccountRef, LedgerError> {
        match &self.event.terms {
            PurchaseTerms::OnCredit => Ok(AccountRef::from(&self.chart.payable)),
            PurchaseTerms::Paid(PaymentMethod::Receivable) => Err(
                LedgerError::UnknownPaymentMethod(PaymentMethod::Receivable.to_string()),
            ),
            PurchaseTerms::Paid(method) => Ok(method.settlement_account(&self.chart)),
        }
    }

    fn withholding_account(&self, kind: WithholdingKind) -> AccountRef {
        match kind {
            WithholdingKind::Pph21 => AccountRef::from(&self.chart.pph21_payable),
            WithholdingKind::Pph23 => AccountRef::from(&self.chart.pph23_payable),
        }
    }
}

#[async_trait]
impl JournalBuilder for PurchaseBuilder {
    async fn build(&self, accounts: &AccountResolver) -> Result<JournalDraft, LedgerError> {
        let purchase = &self.event;
        let settlement = self.settlement_account()?;
        let mut lines = Vec::with_capacity(purchase.items.len() + 3);

        for item in purchase.items.iter().filter(|i| !i.amount.is_zero()) {
            let target = match &item.account_code {
                Some(code) => AccountRef::code(code.clone()),
                None => AccountRef::from(&self.chart.inventory),
            };
            let account = accounts.resolve_ref(&target).await?;
            lines.push(CandidateLine::debit(
                account.id,
                item.amount,
                format!("{} ({})", item.description, purchase.reference),
            ));
        }

        if !purchase.input_tax.is_zero() {
            let account = accounts
                .resolve_ref(&AccountRef::from(&self.chart.input_tax))
                .await?;
            lines.push(CandidateLine::debit(
                account.id,
                purchase.input_tax,
                format!("Input tax {}", purchase.reference),
            ));
        }

        let net = purchase.net_payable();
        if !net.is_zero() {
            let account = accounts.resolve_ref(&settlement).await?;
            let memo = match &purchase.terms {
                PurchaseTerms::OnCredit => format!("Payable {}", purchase.reference),
                PurchaseTerms::Paid(method) => {
                    format!("Purchase paid {} ({method})", purchase.reference)
                }
            };
            // A negative net surfaces as InvalidLine from validation.
            lines.push(CandidateLine::credit(account.id, net, memo));
        }

        for withholding in purchase.withholdings.iter().filter(|w| !w.amount.is_zero()) {
            let account = accounts
                .resolve_ref(&self.withholding_account(withholding.kind))
                .await?;
            let label = match withholding.kind {
                WithholdingKind::Pph21 => "PPh21 withheld",
                WithholdingKind::Pph23 => "PPh23 withheld",
            };
            lines.push(CandidateLine::credit(
                account.id,
                withholding.amount,
                format!("{label} {}", purchase.reference),
            ));
        }

        let description = match &purchase.vendor_name {
            Some(vendor) => format!("Purchase {} - {vendor}", purchase.reference),
            None => format!("Purchase {}", purchase.reference),
        };

        Ok(JournalDraft {
            entry_date: purchase.date,
            description,
            reference: Some(purchase.reference.clone()),
            created_by: purchase.created_by,
            lines,
        })
    }
}
