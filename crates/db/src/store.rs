//! PostgreSQL implementation of the ledger storage seam.
//!
//! Each journal insert is one database transaction. Idempotency and code
//! uniqueness are enforced by the unique indexes created in the ledger
//! migration; a violation is reported back to the engine as the matching
//! `StoreError` so it can return the existing entry or retry with a new code.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, Set, SqlErr,
    TransactionTrait,
};
use tally_core::ledger::{
    Account, AccountType, CashBankSubledger, JournalEntry, JournalLine, JournalStatus,
    SequenceKey, SourceRef, SourceType,
};
use tally_core::posting::{AccountActivity, LedgerStore, ReversalStamp, StoreError, SyncOutcome};
use tally_shared::types::{AccountId, JournalEntryId, JournalLineId, SubledgerId, UserId};
use tracing::debug;
use uuid::Uuid;

use crate::entities::{
    accounts, cash_bank_subledgers, journal_entries, journal_lines, sea_orm_active_enums,
    sequence_counters,
};

/// Unique index enforcing one non-reversed journal per source document.
pub const ACTIVE_SOURCE_INDEX: &str = "uq_journal_entries_active_source";

/// Unique index on journal codes.
pub const CODE_INDEX: &str = "uq_journal_entries_code";

fn backend(err: DbErr) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Ledger storage backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
}

impl PgLedgerStore {
    /// Creates a store over an open connection pool.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Adds an account to the chart with a zero balance.
    ///
    /// # Errors
    ///
    /// Returns `Backend` if the code is taken or the insert fails.
    pub async fn create_account(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
    ) -> Result<Account, StoreError> {
        let now = Utc::now().into();
        let model = accounts::ActiveModel {
            id: Set(AccountId::new().into_inner()),
            code: Set(code.to_string()),
            name: Set(name.to_string()),
            account_type: Set(account_type.into()),
            running_balance: Set(Decimal::ZERO),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&self.db)
        .await
        .map_err(backend)?;

        Ok(account_from_model(model))
    }

    /// Links a cash/bank subledger to `account_id`, mirroring its current balance.
    ///
    /// # Errors
    ///
    /// `AccountNotFound` if the account does not exist, `Backend` otherwise.
    pub async fn create_subledger(
        &self,
        account_id: AccountId,
        name: &str,
    ) -> Result<CashBankSubledger, StoreError> {
        let account = self
            .get_account(account_id)
            .await?
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let model = cash_bank_subledgers::ActiveModel {
            id: Set(SubledgerId::new().into_inner()),
            account_id: Set(account_id.into_inner()),
            name: Set(name.to_string()),
            mirrored_balance: Set(account.running_balance),
            updated_at: Set(Utc::now().into()),
        }
        .insert(&self.db)
        .await
        .map_err(backend)?;

        Ok(subledger_from_model(model))
    }

    async fn load_entry<C>(
        db: &C,
        header: journal_entries::Model,
    ) -> Result<JournalEntry, StoreError>
    where
        C: ConnectionTrait,
    {
        let lines = journal_lines::Entity::find()
            .filter(journal_lines::Column::EntryId.eq(header.id))
            .order_by_asc(journal_lines::Column::LineNumber)
            .all(db)
            .await
            .map_err(backend)?;

        entry_from_models(header, lines)
    }

    /// Checks every line account exists, then writes header and lines.
    async fn insert_rows<C>(db: &C, entry: &JournalEntry) -> Result<(), StoreError>
    where
        C: ConnectionTrait,
    {
        let wanted: HashSet<Uuid> = entry
            .lines
            .iter()
            .map(|l| l.account_id.into_inner())
            .collect();
        let found: HashSet<Uuid> = accounts::Entity::find()
            .select_only()
            .column(accounts::Column::Id)
            .filter(accounts::Column::Id.is_in(wanted.iter().copied()))
            .into_tuple::<Uuid>()
            .all(db)
            .await
            .map_err(backend)?
            .into_iter()
            .collect();
        if let Some(line) = entry
            .lines
            .iter()
            .find(|l| !found.contains(&l.account_id.into_inner()))
        {
            return Err(StoreError::AccountNotFound(line.account_id));
        }

        header_model(entry)
            .insert(db)
            .await
            .map_err(|err| classify_insert_error(err, entry))?;

        let lines = entry
            .lines
            .iter()
            .map(line_model)
            .collect::<Result<Vec<_>, _>>()?;
        journal_lines::Entity::insert_many(lines)
            .exec_without_returning(db)
            .await
            .map_err(backend)?;

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn find_account_by_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        Ok(accounts::Entity::find()
            .filter(accounts::Column::Code.eq(code))
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(account_from_model))
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(accounts::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(backend)?
            .map(account_from_model))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(accounts::Entity::find()
            .order_by_asc(accounts::Column::Code)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(account_from_model)
            .collect())
    }

    async fn apply_balance_delta(
        &self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<Decimal, StoreError> {
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();
        let updated = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::RunningBalance,
                Expr::col(accounts::Column::RunningBalance).add(delta),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(now))
            .filter(accounts::Column::Id.eq(id.into_inner()))
            .exec_with_returning(&self.db)
            .await
            .map_err(backend)?;

        updated
            .first()
            .map(|account| account.running_balance)
            .ok_or(StoreError::AccountNotFound(id))
    }

    async fn next_sequence(&self, key: &SequenceKey) -> Result<u64, StoreError> {
        let month = i32::try_from(key.month)
            .map_err(|_| StoreError::Backend(format!("invalid month {}", key.month)))?;
        let now: sea_orm::prelude::DateTimeWithTimeZone = Utc::now().into();

        let txn = self.db.begin().await.map_err(backend)?;

        sequence_counters::Entity::insert(sequence_counters::ActiveModel {
            prefix: Set(key.prefix.clone()),
            year: Set(key.year),
            month: Set(month),
            last_value: Set(0),
            updated_at: Set(now),
        })
        .on_conflict(
            OnConflict::columns([
                sequence_counters::Column::Prefix,
                sequence_counters::Column::Year,
                sequence_counters::Column::Month,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(&txn)
        .await
        .map_err(backend)?;

        // Row lock serialises concurrent callers on the same key.
        let counter = sequence_counters::Entity::find_by_id((key.prefix.clone(), key.year, month))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::Backend(format!("sequence counter {key} vanished")))?;

        let next = counter.last_value + 1;
        let mut active: sequence_counters::ActiveModel = counter.into();
        active.last_value = Set(next);
        active.updated_at = Set(now);
        active.update(&txn).await.map_err(backend)?;

        txn.commit().await.map_err(backend)?;

        debug!(%key, value = next, "sequence advanced");
        u64::try_from(next).map_err(|_| StoreError::Backend(format!("counter {key} is negative")))
    }

    async fn find_active_entry(
        &self,
        source: &SourceRef,
    ) -> Result<Option<JournalEntry>, StoreError> {
        let header = journal_entries::Entity::find()
            .filter(journal_entries::Column::SourceType.eq(source.source_type.as_str()))
            .filter(journal_entries::Column::SourceId.eq(source.source_id.as_str()))
            .filter(journal_entries::Column::Status.ne(sea_orm_active_enums::JournalStatus::Reversed))
            .one(&self.db)
            .await
            .map_err(backend)?;

        match header {
            Some(header) => Self::load_entry(&self.db, header).await.map(Some),
            None => Ok(None),
        }
    }

    async fn get_entry(&self, id: JournalEntryId) -> Result<Option<JournalEntry>, StoreError> {
        let header = journal_entries::Entity::find_by_id(id.into_inner())
            .one(&self.db)
            .await
            .map_err(backend)?;

        match header {
            Some(header) => Self::load_entry(&self.db, header).await.map(Some),
            None => Ok(None),
        }
    }

    async fn insert_entry(&self, entry: &JournalEntry) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(backend)?;
        Self::insert_rows(&txn, entry).await?;
        txn.commit().await.map_err(backend)
    }

    async fn record_reversal(
        &self,
        original_id: JournalEntryId,
        reversal: &JournalEntry,
        stamp: &ReversalStamp,
    ) -> Result<(), StoreError> {
        let txn = self.db.begin().await.map_err(backend)?;

        let original = journal_entries::Entity::find_by_id(original_id.into_inner())
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(backend)?
            .ok_or(StoreError::EntryNotFound(original_id))?;

        if original.status != sea_orm_active_enums::JournalStatus::Posted {
            return Err(StoreError::InvalidStatus {
                id: original_id,
                status: original.status.into(),
            });
        }

        Self::insert_rows(&txn, reversal).await?;

        let mut active: journal_entries::ActiveModel = original.into();
        active.status = Set(sea_orm_active_enums::JournalStatus::Reversed);
        active.reversal_id = Set(Some(reversal.id.into_inner()));
        active.reversed_at = Set(Some(stamp.reversed_at.into()));
        active.reversed_by = Set(Some(stamp.reversed_by.into_inner()));
        active.reversal_reason = Set(Some(stamp.reason.clone()));
        active.update(&txn).await.map_err(backend)?;

        txn.commit().await.map_err(backend)
    }

    async fn account_activity(&self) -> Result<Vec<AccountActivity>, StoreError> {
        #[derive(Debug, FromQueryResult)]
        struct ActivityRow {
            account_id: Uuid,
            debit_total: Decimal,
            credit_total: Decimal,
        }

        let rows = journal_lines::Entity::find()
            .select_only()
            .column(journal_lines::Column::AccountId)
            .column_as(
                Expr::col((journal_lines::Entity, journal_lines::Column::Debit)).sum(),
                "debit_total",
            )
            .column_as(
                Expr::col((journal_lines::Entity, journal_lines::Column::Credit)).sum(),
                "credit_total",
            )
            .join(JoinType::InnerJoin, journal_lines::Relation::JournalEntries.def())
            .filter(journal_entries::Column::Status.ne(sea_orm_active_enums::JournalStatus::Draft))
            .group_by(journal_lines::Column::AccountId)
            .into_model::<ActivityRow>()
            .all(&self.db)
            .await
            .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|row| AccountActivity {
                account_id: AccountId::from_uuid(row.account_id),
                debit_total: row.debit_total,
                credit_total: row.credit_total,
            })
            .collect())
    }

    async fn list_subledgers(&self) -> Result<Vec<CashBankSubledger>, StoreError> {
        Ok(cash_bank_subledgers::Entity::find()
            .order_by_asc(cash_bank_subledgers::Column::Name)
            .all(&self.db)
            .await
            .map_err(backend)?
            .into_iter()
            .map(subledger_from_model)
            .collect())
    }

    async fn sync_subledger(&self, account_id: AccountId) -> Result<SyncOutcome, StoreError> {
        let txn = self.db.begin().await.map_err(backend)?;

        // FOR SHARE holds off running-balance increments until commit.
        let account = accounts::Entity::find_by_id(account_id.into_inner())
            .lock_shared()
            .one(&txn)
            .await
            .map_err(backend)?
            .ok_or(StoreError::AccountNotFound(account_id))?;

        let Some(subledger) = cash_bank_subledgers::Entity::find()
            .filter(cash_bank_subledgers::Column::AccountId.eq(account_id.into_inner()))
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(backend)?
        else {
            return Ok(SyncOutcome::NoSubledger);
        };

        if subledger.mirrored_balance == account.running_balance {
            return Ok(SyncOutcome::InSync);
        }

        let from = subledger.mirrored_balance;
        let mut active: cash_bank_subledgers::ActiveModel = subledger.into();
        active.mirrored_balance = Set(account.running_balance);
        active.updated_at = Set(Utc::now().into());
        active.update(&txn).await.map_err(backend)?;

        txn.commit().await.map_err(backend)?;

        Ok(SyncOutcome::Updated {
            from,
            to: account.running_balance,
        })
    }
}

// ============================================================
// ROW MAPPING
// ============================================================

/// Maps a unique-index violation on insert to the engine's duplicate errors.
fn classify_insert_error(err: DbErr, entry: &JournalEntry) -> StoreError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(message)) if message.contains(ACTIVE_SOURCE_INDEX) => {
            StoreError::DuplicateSource(entry.source.clone())
        }
        Some(SqlErr::UniqueConstraintViolation(message)) if message.contains(CODE_INDEX) => {
            StoreError::DuplicateCode(entry.code.clone())
        }
        _ => backend(err),
    }
}

fn account_from_model(model: accounts::Model) -> Account {
    Account {
        id: AccountId::from_uuid(model.id),
        code: model.code,
        name: model.name,
        account_type: model.account_type.into(),
        running_balance: model.running_balance,
    }
}

fn subledger_from_model(model: cash_bank_subledgers::Model) -> CashBankSubledger {
    CashBankSubledger {
        id: SubledgerId::from_uuid(model.id),
        account_id: AccountId::from_uuid(model.account_id),
        name: model.name,
        mirrored_balance: model.mirrored_balance,
    }
}

fn header_model(entry: &JournalEntry) -> journal_entries::ActiveModel {
    journal_entries::ActiveModel {
        id: Set(entry.id.into_inner()),
        code: Set(entry.code.clone()),
        source_type: Set(entry.source.source_type.as_str().to_string()),
        source_id: Set(entry.source.source_id.clone()),
        entry_date: Set(entry.entry_date),
        description: Set(entry.description.clone()),
        reference: Set(entry.reference.clone()),
        status: Set(entry.status.into()),
        total_debit: Set(entry.total_debit),
        total_credit: Set(entry.total_credit),
        reversal_id: Set(entry.reversal_id.map(JournalEntryId::into_inner)),
        reversed_entry_id: Set(entry.reversed_entry_id.map(JournalEntryId::into_inner)),
        created_by: Set(entry.created_by.into_inner()),
        created_at: Set(entry.created_at.into()),
        posted_at: Set(entry.posted_at.map(Into::into)),
        reversed_at: Set(entry.reversed_at.map(Into::into)),
        reversed_by: Set(entry.reversed_by.map(UserId::into_inner)),
        reversal_reason: Set(entry.reversal_reason.clone()),
    }
}

fn line_model(line: &JournalLine) -> Result<journal_lines::ActiveModel, StoreError> {
    let line_number = i32::try_from(line.line_number)
        .map_err(|_| StoreError::Backend(format!("line number {} out of range", line.line_number)))?;

    Ok(journal_lines::ActiveModel {
        id: Set(line.id.into_inner()),
        entry_id: Set(line.entry_id.into_inner()),
        line_number: Set(line_number),
        account_id: Set(line.account_id.into_inner()),
        description: Set(line.description.clone()),
        debit: Set(line.debit),
        credit: Set(line.credit),
    })
}

fn entry_from_models(
    header: journal_entries::Model,
    lines: Vec<journal_lines::Model>,
) -> Result<JournalEntry, StoreError> {
    let lines = lines
        .into_iter()
        .map(|line| {
            let line_number = u32::try_from(line.line_number).map_err(|_| {
                StoreError::Backend(format!("negative line number on line {}", line.id))
            })?;
            Ok(JournalLine {
                id: JournalLineId::from_uuid(line.id),
                entry_id: JournalEntryId::from_uuid(line.entry_id),
                line_number,
                account_id: AccountId::from_uuid(line.account_id),
                description: line.description,
                debit: line.debit,
                credit: line.credit,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

    Ok(JournalEntry {
        id: JournalEntryId::from_uuid(header.id),
        code: header.code,
        source: SourceRef {
            source_type: SourceType::from(header.source_type),
            source_id: header.source_id,
        },
        entry_date: header.entry_date,
        description: header.description,
        reference: header.reference,
        status: header.status.into(),
        total_debit: header.total_debit,
        total_credit: header.total_credit,
        reversal_id: header.reversal_id.map(JournalEntryId::from_uuid),
        reversed_entry_id: header.reversed_entry_id.map(JournalEntryId::from_uuid),
        created_by: UserId::from_uuid(header.created_by),
        created_at: header.created_at.with_timezone(&Utc),
        posted_at: header.posted_at.map(|t| t.with_timezone(&Utc)),
        reversed_at: header.reversed_at.map(|t| t.with_timezone(&Utc)),
        reversed_by: header.reversed_by.map(UserId::from_uuid),
        reversal_reason: header.reversal_reason,
        lines,
    })
}

impl From<AccountType> for sea_orm_active_enums::AccountType {
    fn from(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Asset => Self::Asset,
            AccountType::Liability => Self::Liability,
            AccountType::Equity => Self::Equity,
            AccountType::Revenue => Self::Revenue,
            AccountType::Expense => Self::Expense,
        }
    }
}

impl From<sea_orm_active_enums::AccountType> for AccountType {
    fn from(account_type: sea_orm_active_enums::AccountType) -> Self {
        match account_type {
            sea_orm_active_enums::AccountType::Asset => Self::Asset,
            sea_orm_active_enums::AccountType::Liability => Self::Liability,
            sea_orm_active_enums::AccountType::Equity => Self::Equity,
            sea_orm_active_enums::AccountType::Revenue => Self::Revenue,
            sea_orm_active_enums::AccountType::Expense => Self::Expense,
        }
    }
}

impl From<JournalStatus> for sea_orm_active_enums::JournalStatus {
    fn from(status: JournalStatus) -> Self {
        match status {
            JournalStatus::Draft => Self::Draft,
            JournalStatus::Posted => Self::Posted,
            JournalStatus::Reversed => Self::Reversed,
        }
    }
}

impl From<sea_orm_active_enums::JournalStatus> for JournalStatus {
    fn from(status: sea_orm_active_enums::JournalStatus) -> Self {
        match status {
            sea_orm_active_enums::JournalStatus::Draft => Self::Draft,
            sea_orm_active_enums::JournalStatus::Posted => Self::Posted,
            sea_orm_active_enums::JournalStatus::Reversed => Self::Reversed,
        }
    }
}
