//! End-to-end posting scenarios against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tally_shared::ChartConfig;
use tally_shared::types::{AccountId, JournalEntryId, UserId};

use super::testing::FlakyStore;
use super::*;
use crate::builders::{
    CashBankBuilder, CashBankEvent, CashBankMovement, JournalBuilder, PaymentBuilder,
    PaymentDirection, PaymentEvent, PaymentMethod, PurchaseBuilder, PurchaseEvent,
    PurchaseTerms, PurchasedItem, SaleBuilder, SaleEvent, SaleTax, SoldItem, TaxKind,
};
use crate::ledger::{
    Account, AccountType, CandidateLine, JournalDraft, JournalStatus, LedgerError, SourceRef,
    SourceType,
};

struct Books {
    store: Arc<FlakyStore>,
    cash: Account,
    bank: Account,
    revenue: Account,
    output_tax: Account,
    cogs: Account,
    inventory: Account,
}

impl Books {
    fn new() -> Self {
        let store = Arc::new(FlakyStore::new(InMemoryLedgerStore::new()));
        let cash = store.add_account("1101", "Kas", AccountType::Asset);
        let bank = store.add_account("1102", "Bank BCA", AccountType::Asset);
        store.add_account("1201", "Piutang usaha", AccountType::Asset);
        let revenue = store.add_account("4101", "Penjualan", AccountType::Revenue);
        let output_tax = store.add_account("2103", "PPN keluaran", AccountType::Liability);
        store.add_account("2104", "PPh dipotong", AccountType::Liability);
        let cogs = store.add_account("5101", "HPP", AccountType::Expense);
        let inventory = store.add_account("1301", "Persediaan", AccountType::Asset);
        Self {
            store,
            cash,
            bank,
            revenue,
            output_tax,
            cogs,
            inventory,
        }
    }

    fn dyn_store(&self) -> Arc<dyn LedgerStore> {
        self.store.clone()
    }

    fn poster(&self) -> JournalPoster {
        JournalPoster::new(self.dyn_store(), settings())
    }

    fn reversals(&self) -> ReversalEngine {
        ReversalEngine::new(self.dyn_store(), settings())
    }

    fn balance(&self, id: AccountId) -> Decimal {
        self.store.account(id).unwrap().running_balance
    }

    fn touched_balances(&self) -> Vec<Decimal> {
        [
            &self.cash,
            &self.revenue,
            &self.output_tax,
            &self.cogs,
            &self.inventory,
        ]
        .iter()
        .map(|a| self.balance(a.id))
        .collect()
    }
}

fn settings() -> PostingSettings {
    PostingSettings {
        journal_prefix: "JE".to_string(),
        reversal_prefix: "RV".to_string(),
        retry: RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
        },
        timeout: Duration::from_secs(2),
    }
}

fn sale_42() -> SaleBuilder {
    SaleBuilder::new(
        ChartConfig::default(),
        SaleEvent {
            sale_id: "42".to_string(),
            invoice_number: "INV/2026/10/0042".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
            customer_name: None,
            subtotal: dec!(1_000_000),
            taxes: vec![SaleTax {
                kind: TaxKind::Output,
                amount: dec!(110_000),
            }],
            payment: PaymentMethod::Cash,
            items: vec![SoldItem {
                quantity: dec!(3),
                unit_cost: dec!(200_000),
            }],
            created_by: UserId::new(),
        },
    )
}

fn sale_source() -> SourceRef {
    SourceRef::new(SourceType::Sale, "42")
}

async fn post_sale(books: &Books) -> crate::ledger::JournalEntry {
    books
        .poster()
        .post(sale_source(), &sale_42())
        .await
        .unwrap()
        .into_entry()
}

#[tokio::test]
async fn test_sale_42_posts_balanced_journal_and_balances() {
    let books = Books::new();

    let outcome = books.poster().post(sale_source(), &sale_42()).await.unwrap();
    assert!(outcome.is_created());
    let entry = outcome.into_entry();

    assert_eq!(entry.code, "JE-202610-0001");
    assert_eq!(entry.status, JournalStatus::Posted);
    assert_eq!(entry.total_debit, dec!(1_710_000));
    assert_eq!(entry.total_credit, dec!(1_710_000));
    assert!(entry.line_totals().is_balanced());

    let shape: Vec<_> = entry
        .lines
        .iter()
        .map(|l| (l.line_number, l.account_id, l.debit, l.credit))
        .collect();
    assert_eq!(
        shape,
        vec![
            (1, books.cash.id, dec!(1_110_000), dec!(0)),
            (2, books.revenue.id, dec!(0), dec!(1_000_000)),
            (3, books.output_tax.id, dec!(0), dec!(110_000)),
            (4, books.cogs.id, dec!(600_000), dec!(0)),
            (5, books.inventory.id, dec!(0), dec!(600_000)),
        ]
    );

    assert_eq!(
        books.touched_balances(),
        vec![
            dec!(1_110_000),
            dec!(1_000_000),
            dec!(110_000),
            dec!(600_000),
            dec!(-600_000),
        ]
    );
}

#[tokio::test]
async fn test_posting_twice_returns_existing_entry() {
    let books = Books::new();
    let first = post_sale(&books).await;

    let second = books.poster().post(sale_source(), &sale_42()).await.unwrap();
    assert!(!second.is_created());
    assert_eq!(second.entry().id, first.id);
    assert_eq!(books.balance(books.cash.id), dec!(1_110_000));
    assert_eq!(books.store.entries().await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_posts_create_exactly_one_entry() {
    let books = Books::new();
    let poster = Arc::new(books.poster());

    let tasks = (0..20).map(|_| {
        let poster = Arc::clone(&poster);
        tokio::spawn(async move { poster.post(sale_source(), &sale_42()).await })
    });
    let outcomes: Vec<PostOutcome> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_created()).count(), 1);
    let id = outcomes[0].entry().id;
    assert!(outcomes.iter().all(|o| o.entry().id == id));

    assert_eq!(books.store.entries().await.len(), 1);
    assert_eq!(books.balance(books.cash.id), dec!(1_110_000));
    assert_eq!(books.balance(books.inventory.id), dec!(-600_000));
}

#[tokio::test]
async fn test_reversal_mirrors_lines_and_restores_balances() {
    let books = Books::new();
    let before = books.touched_balances();
    let original = post_sale(&books).await;
    let actor = UserId::new();

    let reversal = books
        .reversals()
        .reverse(original.id, "customer returned goods", actor)
        .await
        .unwrap();

    assert!(reversal.code.starts_with("RV-"));
    assert_eq!(reversal.source, SourceRef::reversal_of(original.id));
    assert_eq!(reversal.reversed_entry_id, Some(original.id));
    assert_eq!(reversal.total_debit, original.total_credit);
    assert_eq!(reversal.created_by, actor);
    for (mirror, line) in reversal.lines.iter().zip(&original.lines) {
        assert_eq!(mirror.account_id, line.account_id);
        assert_eq!(mirror.debit, line.credit);
        assert_eq!(mirror.credit, line.debit);
    }

    let stored = books.store.get_entry(original.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JournalStatus::Reversed);
    assert_eq!(stored.reversal_id, Some(reversal.id));
    assert_eq!(stored.reversed_by, Some(actor));
    assert_eq!(stored.reversal_reason.as_deref(), Some("customer returned goods"));

    assert_eq!(books.touched_balances(), before);

    let auditor = BalanceAuditor::new(books.dyn_store());
    assert!(auditor.audit().await.unwrap().is_empty());
    assert_eq!(auditor.recompute(&books.cash).await.unwrap(), Decimal::ZERO);
}

#[tokio::test]
async fn test_reversing_twice_fails() {
    let books = Books::new();
    let original = post_sale(&books).await;
    let engine = books.reversals();

    engine.reverse(original.id, "first", UserId::new()).await.unwrap();
    let err = engine
        .reverse(original.id, "second", UserId::new())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::AlreadyReversed(id) if id == original.id));
    assert_eq!(books.store.entries().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reversals_yield_one_winner() {
    let books = Books::new();
    let original = post_sale(&books).await;
    let engine = Arc::new(books.reversals());

    let tasks = (0..8).map(|i| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .reverse(original.id, &format!("attempt {i}"), UserId::new())
                .await
        })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, LedgerError::AlreadyReversed(_)))
    );
    assert_eq!(books.balance(books.cash.id), Decimal::ZERO);
}

#[tokio::test]
async fn test_reversed_source_can_be_posted_again() {
    let books = Books::new();
    let original = post_sale(&books).await;
    books
        .reversals()
        .reverse(original.id, "re-issue invoice", UserId::new())
        .await
        .unwrap();

    let again = books.poster().post(sale_source(), &sale_42()).await.unwrap();
    assert!(again.is_created());
    assert_ne!(again.entry().id, original.id);
    assert_eq!(again.entry().code, "JE-202610-0002");
    assert_eq!(books.balance(books.cash.id), dec!(1_110_000));
}

#[tokio::test]
async fn test_reverse_source_finds_active_entry() {
    let books = Books::new();
    let engine = books.reversals();

    let nothing = engine
        .reverse_source(&sale_source(), "cancelled", UserId::new())
        .await
        .unwrap();
    assert!(nothing.is_none());

    let original = post_sale(&books).await;
    let reversal = engine
        .reverse_source(&sale_source(), "cancelled", UserId::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reversal.reversed_entry_id, Some(original.id));
    assert!(
        books
            .store
            .find_active_entry(&sale_source())
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_reverse_unknown_and_draft_entries() {
    let books = Books::new();
    let engine = books.reversals();

    let missing = JournalEntryId::new();
    assert!(matches!(
        engine.reverse(missing, "x", UserId::new()).await,
        Err(LedgerError::EntryNotFound(id)) if id == missing
    ));

    let draft = sale_42().build(books.poster().resolver()).await.unwrap();
    let totals = crate::ledger::validate_lines(&draft.lines).unwrap();
    let mut entry = crate::ledger::JournalEntry::posted(
        "JE-202610-9999".to_string(),
        SourceRef::new(SourceType::Manual, "draft-1"),
        draft,
        totals,
        chrono::Utc::now(),
    );
    entry.status = JournalStatus::Draft;
    entry.posted_at = None;
    books.store.insert_entry(&entry).await.unwrap();

    assert!(matches!(
        engine.reverse(entry.id, "x", UserId::new()).await,
        Err(LedgerError::NotPosted {
            status: JournalStatus::Draft,
            ..
        })
    ));
}

#[tokio::test]
async fn test_timeout_commits_nothing() {
    let books = Books::new();
    books.store.delay_inserts(Duration::from_millis(300));
    let poster = JournalPoster::new(
        books.dyn_store(),
        PostingSettings {
            timeout: Duration::from_millis(50),
            ..settings()
        },
    );

    let err = poster.post(sale_source(), &sale_42()).await.unwrap_err();

    assert!(matches!(err, LedgerError::StorageFailure(_)));
    assert!(err.is_retryable());
    assert!(books.store.entries().await.is_empty());
    assert!(books.touched_balances().iter().all(Decimal::is_zero));
}

#[tokio::test]
async fn test_commit_that_outlives_timeout_still_applies_balances() {
    let books = Books::new();
    books.store.stall_after_insert(Duration::from_millis(300));
    let quick = PostingSettings {
        timeout: Duration::from_millis(50),
        ..settings()
    };
    let poster = JournalPoster::new(books.dyn_store(), quick.clone());

    let outcome = poster.post(sale_source(), &sale_42()).await.unwrap();
    assert!(outcome.is_created());
    assert_eq!(books.balance(books.cash.id), dec!(1_110_000));

    let again = poster.post(sale_source(), &sale_42()).await.unwrap();
    assert!(!again.is_created());
    assert_eq!(again.entry().id, outcome.entry().id);
    assert_eq!(books.balance(books.cash.id), dec!(1_110_000));

    let reversal = ReversalEngine::new(books.dyn_store(), quick)
        .reverse(outcome.entry().id, "void", UserId::new())
        .await
        .unwrap();
    assert_eq!(reversal.reversed_entry_id, Some(outcome.entry().id));
    assert!(books.touched_balances().iter().all(Decimal::is_zero));
}

#[tokio::test]
async fn test_code_collisions_are_retried_with_fresh_codes() {
    let books = Books::new();
    books.store.collide_codes(2);

    let entry = post_sale(&books).await;

    assert_eq!(entry.code, "JE-202610-0003");
    assert_eq!(books.store.entries().await.len(), 1);
}

#[tokio::test]
async fn test_code_collisions_exhaust_retries() {
    let books = Books::new();
    books.store.collide_codes(10);

    let err = books
        .poster()
        .post(sale_source(), &sale_42())
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::StorageFailure(_)));
    assert!(books.store.entries().await.is_empty());
}

#[tokio::test]
async fn test_sequence_outage_falls_back_to_timestamp_code() {
    let books = Books::new();
    books.store.fail_sequences(true);

    let entry = post_sale(&books).await;

    assert!(entry.code.starts_with("JE-202610-T"), "got {}", entry.code);
    assert_eq!(books.balance(books.cash.id), dec!(1_110_000));
}

#[tokio::test]
async fn test_balance_failure_keeps_journal_and_reconciliation_repairs_it() {
    let books = Books::new();
    books.store.fail_balances(true);

    let entry = post_sale(&books).await;
    assert_eq!(entry.status, JournalStatus::Posted);
    assert!(books.touched_balances().iter().all(Decimal::is_zero));

    books.store.fail_balances(false);
    let auditor = BalanceAuditor::new(books.dyn_store());
    let drift = auditor.audit().await.unwrap();
    assert_eq!(drift.len(), 5);
    assert!(drift.contains(&BalanceDiscrepancy::Account {
        account_id: books.cash.id,
        code: "1101".to_string(),
        recorded: Decimal::ZERO,
        expected: dec!(1_110_000),
    }));

    let repaired = auditor.repair().await.unwrap();
    assert_eq!(repaired, drift);
    assert_eq!(
        books.touched_balances(),
        vec![
            dec!(1_110_000),
            dec!(1_000_000),
            dec!(110_000),
            dec!(600_000),
            dec!(-600_000),
        ]
    );
    assert!(auditor.audit().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_repair_keeps_balance_updates_made_after_audit() {
    let books = Books::new();
    books.store.fail_balances(true);
    post_sale(&books).await;
    books.store.fail_balances(false);

    let auditor = BalanceAuditor::new(books.dyn_store());
    let drift = auditor.audit().await.unwrap();

    // Another sale lands between the audit and the repair.
    books
        .poster()
        .post(SourceRef::new(SourceType::Sale, "43"), &sale_42())
        .await
        .unwrap();

    auditor.repair_discrepancies(&drift).await.unwrap();

    assert_eq!(books.balance(books.cash.id), dec!(2_220_000));
    assert_eq!(books.balance(books.inventory.id), dec!(-1_200_000));
    assert!(auditor.audit().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cash_subledger_mirrors_gl_balance() {
    let books = Books::new();
    let drawer = books.store.add_subledger(books.cash.id, "Front counter drawer");

    let original = post_sale(&books).await;
    assert_eq!(
        books.store.subledger(drawer.id).unwrap().mirrored_balance,
        dec!(1_110_000)
    );

    books
        .reversals()
        .reverse(original.id, "void", UserId::new())
        .await
        .unwrap();
    assert_eq!(
        books.store.subledger(drawer.id).unwrap().mirrored_balance,
        Decimal::ZERO
    );
}

fn cash_bank(
    id: &str,
    code: &str,
    movement: CashBankMovement,
    amount: Decimal,
) -> CashBankBuilder {
    CashBankBuilder::new(
        ChartConfig::default(),
        CashBankEvent {
            transaction_id: id.to_string(),
            account_code: code.to_string(),
            movement,
            amount,
            date: NaiveDate::from_ymd_opt(2026, 10, 1).unwrap(),
            note: String::new(),
            created_by: UserId::new(),
        },
    )
}

#[tokio::test]
async fn test_cash_bank_movements_keep_both_drawers_in_step() {
    let books = Books::new();
    let equity = books.store.add_account("3101", "Modal pemilik", AccountType::Equity);
    let bank = books.bank.clone();
    let drawer = books.store.add_subledger(books.cash.id, "Front counter drawer");
    let current = books.store.add_subledger(bank.id, "BCA current account");
    let poster = books.poster();

    let opening = cash_bank("1", "1101", CashBankMovement::OpeningBalance, dec!(5_000_000));
    poster.post(opening.event().source(), &opening).await.unwrap();

    let transfer = cash_bank(
        "2",
        "1101",
        CashBankMovement::Transfer {
            to_code: "1102".to_string(),
        },
        dec!(3_000_000),
    );
    let entry = poster
        .post(transfer.event().source(), &transfer)
        .await
        .unwrap()
        .into_entry();
    assert_eq!(entry.source, SourceRef::new(SourceType::CashBank, "2"));
    assert_eq!(entry.reference.as_deref(), Some("TRF-1101-TO-1102-2"));

    assert_eq!(books.balance(books.cash.id), dec!(2_000_000));
    assert_eq!(books.balance(bank.id), dec!(3_000_000));
    assert_eq!(books.balance(equity.id), dec!(5_000_000));
    assert_eq!(
        books.store.subledger(drawer.id).unwrap().mirrored_balance,
        dec!(2_000_000)
    );
    assert_eq!(
        books.store.subledger(current.id).unwrap().mirrored_balance,
        dec!(3_000_000)
    );
}

#[tokio::test]
async fn test_credit_purchase_then_supplier_payment_clears_payable() {
    let books = Books::new();
    let payable = books.store.add_account("2101", "Utang usaha", AccountType::Liability);
    books.store.add_account("1240", "PPN masukan", AccountType::Asset);
    let poster = books.poster();

    let event = PurchaseEvent {
        purchase_id: "9".to_string(),
        reference: "PO-0009".to_string(),
        date: NaiveDate::from_ymd_opt(2026, 10, 3).unwrap(),
        vendor_name: None,
        items: vec![PurchasedItem {
            description: "Beras 50kg".to_string(),
            amount: dec!(1_000_000),
            account_code: None,
        }],
        input_tax: dec!(110_000),
        withholdings: vec![],
        terms: PurchaseTerms::OnCredit,
        created_by: UserId::new(),
    };
    let source = event.source();
    poster
        .post(source, &PurchaseBuilder::new(ChartConfig::default(), event))
        .await
        .unwrap();
    assert_eq!(books.balance(payable.id), dec!(1_110_000));
    assert_eq!(books.balance(books.inventory.id), dec!(1_000_000));

    let payment = PaymentEvent {
        payment_id: "9".to_string(),
        invoice_number: Some("PO-0009".to_string()),
        date: NaiveDate::from_ymd_opt(2026, 10, 17).unwrap(),
        contact_name: None,
        amount: dec!(1_110_000),
        method: PaymentMethod::Cash,
        direction: PaymentDirection::Payable,
        created_by: UserId::new(),
    };
    let source = payment.source();
    let outcome = poster
        .post(source, &PaymentBuilder::new(ChartConfig::default(), payment))
        .await
        .unwrap();
    assert!(outcome.is_created());

    assert_eq!(books.balance(payable.id), Decimal::ZERO);
    assert_eq!(books.balance(books.cash.id), dec!(-1_110_000));
}

#[tokio::test]
async fn test_subledger_failure_is_found_by_audit() {
    let books = Books::new();
    let drawer = books.store.add_subledger(books.cash.id, "Front counter drawer");
    books.store.fail_subledgers(true);

    post_sale(&books).await;
    assert_eq!(books.balance(books.cash.id), dec!(1_110_000));
    assert_eq!(
        books.store.subledger(drawer.id).unwrap().mirrored_balance,
        Decimal::ZERO
    );

    books.store.fail_subledgers(false);
    let auditor = BalanceAuditor::new(books.dyn_store());
    assert_eq!(
        auditor.repair().await.unwrap(),
        vec![BalanceDiscrepancy::Subledger {
            subledger_id: drawer.id,
            account_id: books.cash.id,
            mirrored: Decimal::ZERO,
            expected: dec!(1_110_000),
        }]
    );
    assert_eq!(
        books.store.subledger(drawer.id).unwrap().mirrored_balance,
        dec!(1_110_000)
    );
}

#[tokio::test]
async fn test_missing_account_writes_nothing() {
    let store = Arc::new(InMemoryLedgerStore::new());
    store.add_account("1101", "Kas", AccountType::Asset);
    let poster = JournalPoster::new(store.clone(), settings());

    let err = poster.post(sale_source(), &sale_42()).await.unwrap_err();

    assert!(matches!(err, LedgerError::AccountNotFound { .. }));
    assert!(!err.is_retryable());
    assert!(store.entries().await.is_empty());
}

#[tokio::test]
async fn test_unbalanced_draft_is_rejected_before_numbering() {
    let books = Books::new();
    let poster = books.poster();
    let draft = JournalDraft {
        entry_date: NaiveDate::from_ymd_opt(2026, 10, 16).unwrap(),
        description: "typo".to_string(),
        reference: None,
        created_by: UserId::new(),
        lines: vec![
            CandidateLine::debit(books.cash.id, dec!(100.00), "cash"),
            CandidateLine::credit(books.revenue.id, dec!(99.99), "sales"),
        ],
    };

    let err = poster
        .post(SourceRef::new(SourceType::Manual, "m-1"), &draft)
        .await
        .unwrap_err();
    match err {
        LedgerError::UnbalancedEntry { debit, credit } => {
            assert_eq!(debit - credit, dec!(0.01));
        }
        other => panic!("expected UnbalancedEntry, got {other:?}"),
    }
    assert!(books.store.entries().await.is_empty());

    let next = post_sale(&books).await;
    assert_eq!(next.code, "JE-202610-0001");
}
