//! Payments that settle receivables or payables.
//!
//! | Direction  | Debit      | Credit     |
//! |------------|------------|------------|
//! | Receivable | settlement | receivable |
//! | Payable    | payable    | settlement |

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_shared::ChartConfig;
use tally_shared::types::UserId;

use super::{JournalBuilder, PaymentMethod};
use crate::ledger::{CandidateLine, JournalDraft, LedgerError, SourceRef, SourceType};
use crate::posting::{AccountRef, AccountResolver};

/// Which side of the trade a payment settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentDirection {
    /// Money received from a customer.
    #[default]
    Receivable,
    /// Money paid to a supplier.
    Payable,
}

/// Money received from a customer or paid to a supplier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Payment document ID.
    pub payment_id: String,
    /// Invoice the payment settles, if any.
    pub invoice_number: Option<String>,
    /// Payment date; becomes the entry date.
    pub date: NaiveDate,
    /// Customer or supplier, when known.
    pub contact_name: Option<String>,
    /// Amount paid.
    pub amount: Decimal,
    /// Account the money moved through.
    pub method: PaymentMethod,
    /// Receivable or payable.
    #[serde(default)]
    pub direction: PaymentDirection,
    /// Who recorded the payment.
    pub created_by: UserId,
}

impl PaymentEvent {
    /// Idempotency key of this payment's journal.
    #[must_use]
    pub fn source(&self) -> SourceRef {
        let source_type = match self.direction {
            PaymentDirection::Receivable => SourceType::Payment,
            PaymentDirection::Payable => SourceType::SupplierPayment,
        };
        SourceRef::new(source_type, self.payment_id.clone())
    }
}

/// Builds the journal of a [`PaymentEvent`].
#[derive(Debug, Clone)]
pub struct PaymentBuilder {
    chart: ChartConfig,
    event: PaymentEvent,
}

impl PaymentBuilder {
    /// Creates a builder for `event` posting to `chart`.
    #[must_use]
    pub fn new(chart: ChartConfig, event: PaymentEvent) -> Self {
        Self { chart, event }
    }
}

#[async_trait]
impl JournalBuilder for PaymentBuilder {
    async fn build(&self, accounts: &AccountResolver) -> Result<JournalDraft, LedgerError> {
        let payment = &self.event;

        // Settling "on credit" would debit and credit the same trade account.
        if payment.method == PaymentMethod::Receivable {
            return Err(LedgerError::UnknownPaymentMethod(payment.method.to_string()));
        }

        let label = payment
            .invoice_number
            .as_deref()
            .unwrap_or(payment.payment_id.as_str());

        let mut lines = Vec::with_capacity(2);
        if !payment.amount.is_zero() {
            let settlement = accounts
                .resolve_ref(&payment.method.settlement_account(&self.chart))
                .await?;
            match payment.direction {
                PaymentDirection::Receivable => {
                    let receivable = accounts
                        .resolve_ref(&AccountRef::from(&self.chart.receivable))
                        .await?;
                    lines.push(CandidateLine::debit(
                        settlement.id,
                        payment.amount,
                        format!("Payment received {label} ({})", payment.method),
                    ));
                    lines.push(CandidateLine::credit(
                        receivable.id,
                        payment.amount,
                        format!("Receivable settled {label}"),
                    ));
                }
                PaymentDirection::Payable => {
                    let payable = accounts
                        .resolve_ref(&AccountRef::from(&self.chart.payable))
                        .await?;
                    lines.push(CandidateLine::debit(
                        payable.id,
                        payment.amount,
                        format!("Payable settled {label}"),
                    ));
                    lines.push(CandidateLine::credit(
                        settlement.id,
                        payment.amount,
                        format!("Payment made {label} ({})", payment.method),
                    ));
                }
            }
        }

        let description = match (&payment.contact_name, payment.direction) {
            (Some(contact), PaymentDirection::Receivable) => {
                format!("Payment {label} - {contact}")
            }
            (Some(contact), PaymentDirection::Payable) => {
                format!("Payment to {contact} - {label}")
            }
            (None, _) => format!("Payment {label}"),
        };

        Ok(JournalDraft {
            entry_date: payment.date,
            description,
            reference: payment.invoice_number.clone(),
            created_by: payment.created_by,
            lines,
        })
    }
}
