//! Sales journal.
//!
//! | Side   | Account                  | Amount              |
//! |--------|--------------------------|---------------------|
//! | Debit  | settlement (cash/bank/AR)| subtotal + taxes    |
//! | Credit | revenue                  | subtotal            |
//! | Credit | output / withholding tax | each nonzero tax    |
//! | Debit  | COGS                     | Σ quantity × cost   |
//! | Credit | inventory                | Σ quantity × cost   |

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::ChartConfig;
use tally_shared::types::UserId;

use super::{JournalBuilder, PaymentMethod};
use crate::ledger::{
    CandidateLine, JournalDraft, LedgerError, SourceRef, SourceType, round_money,
};
use crate::posting::{AccountRef, AccountResolver};

/// Which liability a tax amount is owed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxKind {
    /// VAT collected from the customer.
    Output,
    /// Tax withheld on the sale.
    Withholding,
}

/// One tax charged on a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTax {
    /// Tax type.
    pub kind: TaxKind,
    /// Amount charged.
    pub amount: Decimal,
}

/// Cost basis of one sold line item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoldItem {
    /// Units sold.
    pub quantity: Decimal,
    /// Cost per unit.
    pub unit_cost: Decimal,
}

impl SoldItem {
    /// Quantity times unit cost.
    #[must_use]
    pub fn cost(&self) -> Decimal {
        self.quantity * self.unit_cost
    }
}

/// A completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleEvent {
    /// Sale document ID.
    pub sale_id: String,
    /// Printed invoice number.
    pub invoice_number: String,
    /// Sale date; becomes the entry date.
    pub date: NaiveDate,
    /// Customer, when known.
    pub customer_name: Option<String>,
    /// Amount before tax.
    pub subtotal: Decimal,
    /// Taxes charged.
    #[serde(default)]
    pub taxes: Vec<SaleTax>,
    /// How the sale was settled.
    pub payment: PaymentMethod,
    /// Cost basis of the goods sold.
    #[serde(default)]
    pub items: Vec<SoldItem>,
    /// Who recorded the sale.
    pub created_by: UserId,
}

impl SaleEvent {
    /// Subtotal plus every tax.
    #[must_use]
    pub fn gross(&self) -> Decimal {
        self.subtotal + self.taxes.iter().map(|t| t.amount).sum::<Decimal>()
    }

    /// Total cost of goods sold, rounded to the stored money scale.
    #[must_use]
    pub fn cost_of_goods(&self) -> Decimal {
        round_money(self.items.iter().map(SoldItem::cost).sum())
    }

    /// Idempotency key of this sale's journal.
    #[must_use]
    pub fn source(&self) -> SourceRef {
        SourceRef::new(SourceType::Sale, self.sale_id.clone())
    }
}

/// Builds the journal of a [`SaleEvent`].
#[derive(Debug, Clone)]
pub struct SaleBuilder {
    chart: ChartConfig,
    event: SaleEvent,
}

impl SaleBuilder {
    /// Creates a builder for `event` posting to `chart`.
    #[must_use]
    pub fn new(chart: ChartConfig, event: SaleEvent) -> Self {
        Self { chart, event }
    }

    /// The event being posted.
    #[must_use]
    pub fn event(&self) -> &SaleEvent {
        &self.event
    }

    fn tax_account(&self, kind: TaxKind) -> AccountRef {
        match kind {
            TaxKind::Output => AccountRef::from(&self.chart.output_tax),
            TaxKind::Withholding => AccountRef::from(&self.chart.withholding_tax),
        }
    }
}

#[async_trait]
impl JournalBuilder for SaleBuilder {
    async fn build(&self, accounts: &AccountResolver) -> Result<JournalDraft, LedgerError> {
        let sale = &self.event;
        let mut lines = Vec::new();

        let gross = sale.gross();
        if !gross.is_zero() {
            let settlement = accounts
                .resolve_ref(&sale.payment.settlement_account(&self.chart))
                .await?;
            lines.push(CandidateLine::debit(
                settlement.id,
                gross,
                format!("Sale {} ({})", sale.invoice_number, sale.payment),
            ));
        }

        if !sale.subtotal.is_zero() {
            let revenue = accounts
                .resolve_ref(&AccountRef::from(&self.chart.revenue))
                .await?;
            lines.push(CandidateLine::credit(
                revenue.id,
                sale.subtotal,
                format!("Sales revenue {}", sale.invoice_number),
            ));
        }

        for tax in sale.taxes.iter().filter(|t| !t.amount.is_zero()) {
            let account = accounts.resolve_ref(&self.tax_account(tax.kind)).await?;
            let label = match tax.kind {
                TaxKind::Output => "Output tax",
                TaxKind::Withholding => "Withholding tax",
            };
            lines.push(CandidateLine::credit(
                account.id,
                tax.amount,
                format!("{label} {}", sale.invoice_number),
            ));
        }

        let cost = sale.cost_of_goods();
        if !cost.is_zero() {
            let cogs = accounts
                .resolve_ref(&AccountRef::from(&self.chart.cogs))
                .await?;
            let inventory = accounts
                .resolve_ref(&AccountRef::from(&self.chart.inventory))
                .await?;
            lines.push(CandidateLine::debit(
                cogs.id,
                cost,
                format!("Cost of goods sold {}", sale.invoice_number),
            ));
            lines.push(CandidateLine::credit(
                inventory.id,
                cost,
                format!("Inventory out {}", sale.invoice_number),
            ));
        }

        let description = match &sale.customer_name {
            Some(customer) => format!("Sale {} - {customer}", sale.invoice_number),
            None => format!("Sale {}", sale.invoice_number),
        };

        Ok(JournalDraft {
            entry_date: sale.date,
            description,
            reference: Some(sale.invoice_number.clone()),
            created_by: sale.created_by,
            lines,
        })
    }
}
