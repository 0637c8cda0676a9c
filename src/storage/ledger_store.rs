//! LedgerStore trait definition.

use async_trait::async_trait;
use uuid::Uuid;

use crate::model::{Account, AwardRecord, MembershipTier, PublishableItem, Timestamp};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: Uuid },

    #[error("Recurring award anchor changed concurrently for account {account_id}")]
    AnchorConflict { account_id: Uuid },

    #[error("Balance overflow for account {account_id}")]
    BalanceOverflow { account_id: Uuid },

    #[error("Stored value out of range: {field}")]
    ValueOutOfRange { field: &'static str },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("Invalid award kind: {0}")]
    InvalidAwardKind(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Interface for the loyalty ledger: accounts, publishable items and the
/// award audit log.
///
/// Every operation that credits points is a single atomic unit: the balance
/// increment, the state that makes it idempotent (recurring anchor or item
/// flag) and the audit record either all persist or none do. Callers never
/// write a balance they computed themselves.
///
/// Implementations:
/// - `SqliteLedgerStore`: SQLite storage
/// - `MockLedgerStore`: In-memory store for testing and local development
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    /// Retrieve an account. Returns `None` if it does not exist.
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>>;

    /// Register a new account (signup).
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// Change an account's membership tier (billing flow).
    async fn set_membership_tier(&self, id: Uuid, tier: &MembershipTier) -> Result<()>;

    /// Credit a recurring award.
    ///
    /// Atomically adds `points` to the balance, sets
    /// `last_recurring_award_at = awarded_at` and appends an audit record,
    /// but only if the stored `last_recurring_award_at` still equals
    /// `expected_last_award` (the value the caller read). Otherwise fails
    /// with `AnchorConflict` and changes nothing.
    async fn apply_recurring_award(
        &self,
        account_id: Uuid,
        points: u64,
        expected_last_award: Option<Timestamp>,
        awarded_at: Timestamp,
    ) -> Result<()>;

    // -------------------------------------------------------------------------
    // Publishable items
    // -------------------------------------------------------------------------

    /// Retrieve an item. Returns `None` if it does not exist.
    async fn get_item(&self, id: Uuid) -> Result<Option<PublishableItem>>;

    /// Register a new item (content authored).
    ///
    /// Fails with `AlreadyExists` if the id is taken.
    async fn create_item(&self, item: &PublishableItem) -> Result<()>;

    /// Change an item's visibility. Never touches `points_awarded`.
    async fn set_item_visibility(&self, id: Uuid, is_public: bool) -> Result<()>;

    /// Ids of the account's items that are public and not yet paid, ordered by id.
    async fn list_unawarded_public_items(&self, account_id: Uuid) -> Result<Vec<Uuid>>;

    /// Pay the one-time publication award for a set of items.
    ///
    /// In one atomic unit: flips `points_awarded` for every listed item that
    /// is owned by `account_id`, public, and still unpaid; credits
    /// `points_per_item` for each flipped item in a single balance update;
    /// appends one audit record per flipped item.
    ///
    /// Returns the ids actually flipped. Items already paid (for example by a
    /// concurrent caller) are skipped, so calling this twice pays once.
    async fn award_publications(
        &self,
        account_id: Uuid,
        item_ids: &[Uuid],
        points_per_item: u64,
        awarded_at: Timestamp,
    ) -> Result<Vec<Uuid>>;

    // -------------------------------------------------------------------------
    // Audit log
    // -------------------------------------------------------------------------

    /// All award records for an account, oldest first.
    async fn list_awards(&self, account_id: Uuid) -> Result<Vec<AwardRecord>>;
}
