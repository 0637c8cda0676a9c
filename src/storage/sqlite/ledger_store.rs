//! SQLite LedgerStore implementation.

use async_trait::async_trait;
use sea_query::{Expr, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::model::{Account, AwardKind, AwardRecord, MembershipTier, PublishableItem, Timestamp};
use crate::storage::helpers::{format_timestamp, parse_timestamp, points_from_db, points_to_db};
use crate::storage::schema::{
    Accounts, AwardLedger, PublishableItems, CREATE_ACCOUNTS_TABLE, CREATE_AWARD_LEDGER_TABLE,
    CREATE_PUBLISHABLE_ITEMS_TABLE,
};
use crate::storage::{LedgerStore, Result, StorageError};

/// SQLite implementation of LedgerStore.
///
/// Write transactions are opened DEFERRED and always start with a write
/// statement, so SQLite takes the write lock up front instead of upgrading a
/// shared lock mid-transaction.
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Create a new SQLite ledger store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema.
    pub async fn init(&self) -> Result<()> {
        for ddl in [
            CREATE_ACCOUNTS_TABLE,
            CREATE_PUBLISHABLE_ITEMS_TABLE,
            CREATE_AWARD_LEDGER_TABLE,
        ] {
            sqlx::query(ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn account_columns() -> [Accounts; 5] {
        [
            Accounts::Id,
            Accounts::MembershipTier,
            Accounts::Balance,
            Accounts::CreatedAt,
            Accounts::LastRecurringAwardAt,
        ]
    }

    fn account_from_row(row: &SqliteRow) -> Result<Account> {
        let id: String = row.try_get("id")?;
        let tier: String = row.try_get("membership_tier")?;
        let balance: i64 = row.try_get("balance")?;
        let created_at: String = row.try_get("created_at")?;
        let last_award: Option<String> = row.try_get("last_recurring_award_at")?;

        Ok(Account {
            id: Uuid::parse_str(&id)?,
            membership_tier: MembershipTier::parse(&tier),
            balance: points_from_db(balance, "balance")?,
            created_at: parse_timestamp(&created_at)?,
            last_recurring_award_at: last_award.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn item_from_row(row: &SqliteRow) -> Result<PublishableItem> {
        let id: String = row.try_get("id")?;
        let owner: String = row.try_get("owner_account_id")?;

        Ok(PublishableItem {
            id: Uuid::parse_str(&id)?,
            owner_account_id: Uuid::parse_str(&owner)?,
            is_public: row.try_get("is_public")?,
            points_awarded: row.try_get("points_awarded")?,
        })
    }

    fn award_from_row(row: &SqliteRow) -> Result<AwardRecord> {
        let account_id: String = row.try_get("account_id")?;
        let kind: String = row.try_get("kind")?;
        let item_id: Option<String> = row.try_get("item_id")?;
        let points: i64 = row.try_get("points")?;
        let awarded_at: String = row.try_get("awarded_at")?;

        Ok(AwardRecord {
            account_id: Uuid::parse_str(&account_id)?,
            kind: AwardKind::parse(&kind).ok_or(StorageError::InvalidAwardKind(kind))?,
            item_id: item_id.as_deref().map(Uuid::parse_str).transpose()?,
            points: points_from_db(points, "points")?,
            awarded_at: parse_timestamp(&awarded_at)?,
        })
    }

    /// Append an audit record within an already-started transaction.
    async fn insert_award(conn: &mut SqliteConnection, record: &AwardRecord) -> Result<()> {
        let query = Query::insert()
            .into_table(AwardLedger::Table)
            .columns([
                AwardLedger::AccountId,
                AwardLedger::Kind,
                AwardLedger::ItemId,
                AwardLedger::Points,
                AwardLedger::AwardedAt,
            ])
            .values_panic([
                record.account_id.to_string().into(),
                record.kind.as_str().into(),
                record.item_id.map(|id| id.to_string()).into(),
                points_to_db(record.points)?.into(),
                format_timestamp(&record.awarded_at).into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&mut *conn).await?;
        Ok(())
    }

    /// Explain why a guarded recurring update matched no row.
    async fn rejected_recurring_reason(
        conn: &mut SqliteConnection,
        account_id: Uuid,
        expected_last_award: Option<&Timestamp>,
    ) -> Result<StorageError> {
        let query = Query::select()
            .column(Accounts::LastRecurringAwardAt)
            .from(Accounts::Table)
            .and_where(Expr::col(Accounts::Id).eq(account_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&mut *conn).await?;
        let Some(row) = row else {
            return Ok(StorageError::NotFound {
                entity: "account",
                id: account_id,
            });
        };

        let stored: Option<String> = row.try_get("last_recurring_award_at")?;
        if stored != expected_last_award.map(format_timestamp) {
            Ok(StorageError::AnchorConflict { account_id })
        } else {
            Ok(StorageError::BalanceOverflow { account_id })
        }
    }

    /// Map a unique-constraint violation on insert to `AlreadyExists`.
    fn map_insert_error(err: sqlx::Error, entity: &'static str, id: Uuid) -> StorageError {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StorageError::AlreadyExists { entity, id }
            }
            _ => StorageError::Database(err),
        }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let query = Query::select()
            .columns(Self::account_columns())
            .from(Accounts::Table)
            .and_where(Expr::col(Accounts::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::account_from_row).transpose()
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        let query = Query::insert()
            .into_table(Accounts::Table)
            .columns(Self::account_columns())
            .values_panic([
                account.id.to_string().into(),
                account.membership_tier.as_str().into(),
                points_to_db(account.balance)?.into(),
                format_timestamp(&account.created_at).into(),
                account
                    .last_recurring_award_at
                    .as_ref()
                    .map(format_timestamp)
                    .into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_insert_error(e, "account", account.id))?;
        Ok(())
    }

    async fn set_membership_tier(&self, id: Uuid, tier: &MembershipTier) -> Result<()> {
        let query = Query::update()
            .table(Accounts::Table)
            .value(Accounts::MembershipTier, tier.as_str())
            .and_where(Expr::col(Accounts::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "account",
                id,
            });
        }
        Ok(())
    }

    async fn apply_recurring_award(
        &self,
        account_id: Uuid,
        points: u64,
        expected_last_award: Option<Timestamp>,
        awarded_at: Timestamp,
    ) -> Result<()> {
        let credit = points_to_db(points)
            .map_err(|_| StorageError::BalanceOverflow { account_id })?;

        let anchor_guard = match &expected_last_award {
            Some(ts) => Expr::col(Accounts::LastRecurringAwardAt).eq(format_timestamp(ts)),
            None => Expr::col(Accounts::LastRecurringAwardAt).is_null(),
        };

        let query = Query::update()
            .table(Accounts::Table)
            .value(Accounts::Balance, Expr::col(Accounts::Balance).add(credit))
            .value(Accounts::LastRecurringAwardAt, format_timestamp(&awarded_at))
            .and_where(Expr::col(Accounts::Id).eq(account_id.to_string()))
            .and_where(anchor_guard)
            .and_where(Expr::col(Accounts::Balance).lte(i64::MAX - credit))
            .to_string(SqliteQueryBuilder);

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(&query).execute(&mut *tx).await?.rows_affected();
        if updated == 0 {
            let reason =
                Self::rejected_recurring_reason(&mut tx, account_id, expected_last_award.as_ref())
                    .await?;
            tx.rollback().await?;
            return Err(reason);
        }

        let record = AwardRecord {
            account_id,
            kind: AwardKind::Recurring,
            item_id: None,
            points,
            awarded_at,
        };
        Self::insert_award(&mut tx, &record).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<PublishableItem>> {
        let query = Query::select()
            .columns([
                PublishableItems::Id,
                PublishableItems::OwnerAccountId,
                PublishableItems::IsPublic,
                PublishableItems::PointsAwarded,
            ])
            .from(PublishableItems::Table)
            .and_where(Expr::col(PublishableItems::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::item_from_row).transpose()
    }

    async fn create_item(&self, item: &PublishableItem) -> Result<()> {
        let query = Query::insert()
            .into_table(PublishableItems::Table)
            .columns([
                PublishableItems::Id,
                PublishableItems::OwnerAccountId,
                PublishableItems::IsPublic,
                PublishableItems::PointsAwarded,
            ])
            .values_panic([
                item.id.to_string().into(),
                item.owner_account_id.to_string().into(),
                item.is_public.into(),
                item.points_awarded.into(),
            ])
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .map_err(|e| Self::map_insert_error(e, "publishable item", item.id))?;
        Ok(())
    }

    async fn set_item_visibility(&self, id: Uuid, is_public: bool) -> Result<()> {
        let query = Query::update()
            .table(PublishableItems::Table)
            .value(PublishableItems::IsPublic, is_public)
            .and_where(Expr::col(PublishableItems::Id).eq(id.to_string()))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity: "publishable item",
                id,
            });
        }
        Ok(())
    }

    async fn list_unawarded_public_items(&self, account_id: Uuid) -> Result<Vec<Uuid>> {
        let query = Query::select()
            .column(PublishableItems::Id)
            .from(PublishableItems::Table)
            .and_where(Expr::col(PublishableItems::OwnerAccountId).eq(account_id.to_string()))
            .and_where(Expr::col(PublishableItems::IsPublic).eq(true))
            .and_where(Expr::col(PublishableItems::PointsAwarded).eq(false))
            .order_by(PublishableItems::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            ids.push(Uuid::parse_str(&id)?);
        }
        Ok(ids)
    }

    async fn award_publications(
        &self,
        account_id: Uuid,
        item_ids: &[Uuid],
        points_per_item: u64,
        awarded_at: Timestamp,
    ) -> Result<Vec<Uuid>> {
        let account_str = account_id.to_string();
        let mut candidates = item_ids.to_vec();
        candidates.sort();
        candidates.dedup();

        let mut tx = self.pool.begin().await?;

        // Touch the account row first: takes the write lock and reports a
        // missing account before any item is flipped.
        let touch = Query::update()
            .table(Accounts::Table)
            .value(Accounts::Balance, Expr::col(Accounts::Balance))
            .and_where(Expr::col(Accounts::Id).eq(account_str.clone()))
            .to_string(SqliteQueryBuilder);
        if sqlx::query(&touch).execute(&mut *tx).await?.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StorageError::NotFound {
                entity: "account",
                id: account_id,
            });
        }

        let mut flipped = Vec::with_capacity(candidates.len());
        for item_id in candidates {
            let query = Query::update()
                .table(PublishableItems::Table)
                .value(PublishableItems::PointsAwarded, true)
                .and_where(Expr::col(PublishableItems::Id).eq(item_id.to_string()))
                .and_where(Expr::col(PublishableItems::OwnerAccountId).eq(account_str.clone()))
                .and_where(Expr::col(PublishableItems::IsPublic).eq(true))
                .and_where(Expr::col(PublishableItems::PointsAwarded).eq(false))
                .to_string(SqliteQueryBuilder);

            if sqlx::query(&query).execute(&mut *tx).await?.rows_affected() == 1 {
                flipped.push(item_id);
            }
        }

        if flipped.is_empty() {
            tx.rollback().await?;
            return Ok(flipped);
        }

        let credit = points_per_item
            .checked_mul(flipped.len() as u64)
            .and_then(|c| i64::try_from(c).ok())
            .ok_or(StorageError::BalanceOverflow { account_id })?;

        let query = Query::update()
            .table(Accounts::Table)
            .value(Accounts::Balance, Expr::col(Accounts::Balance).add(credit))
            .and_where(Expr::col(Accounts::Id).eq(account_str))
            .and_where(Expr::col(Accounts::Balance).lte(i64::MAX - credit))
            .to_string(SqliteQueryBuilder);
        if sqlx::query(&query).execute(&mut *tx).await?.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StorageError::BalanceOverflow { account_id });
        }

        for item_id in &flipped {
            let record = AwardRecord {
                account_id,
                kind: AwardKind::Publication,
                item_id: Some(*item_id),
                points: points_per_item,
                awarded_at,
            };
            Self::insert_award(&mut tx, &record).await?;
        }

        tx.commit().await?;
        Ok(flipped)
    }

    async fn list_awards(&self, account_id: Uuid) -> Result<Vec<AwardRecord>> {
        let query = Query::select()
            .columns([
                AwardLedger::AccountId,
                AwardLedger::Kind,
                AwardLedger::ItemId,
                AwardLedger::Points,
                AwardLedger::AwardedAt,
            ])
            .from(AwardLedger::Table)
            .and_where(Expr::col(AwardLedger::AccountId).eq(account_id.to_string()))
            .order_by(AwardLedger::Seq, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(Self::award_from_row).collect()
    }
}
