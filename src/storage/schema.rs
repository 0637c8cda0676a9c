//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Accounts table schema.
#[derive(Iden)]
pub enum Accounts {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "membership_tier"]
    MembershipTier,
    #[iden = "balance"]
    Balance,
    #[iden = "created_at"]
    CreatedAt,
    #[iden = "last_recurring_award_at"]
    LastRecurringAwardAt,
}

/// Publishable items table schema.
#[derive(Iden)]
pub enum PublishableItems {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "owner_account_id"]
    OwnerAccountId,
    #[iden = "is_public"]
    IsPublic,
    #[iden = "points_awarded"]
    PointsAwarded,
}

/// Award audit log schema.
#[derive(Iden)]
pub enum AwardLedger {
    Table,
    #[iden = "seq"]
    Seq,
    #[iden = "account_id"]
    AccountId,
    #[iden = "kind"]
    Kind,
    #[iden = "item_id"]
    ItemId,
    #[iden = "points"]
    Points,
    #[iden = "awarded_at"]
    AwardedAt,
}

/// SQL for creating the accounts table.
pub const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id TEXT PRIMARY KEY NOT NULL,
    membership_tier TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at TEXT NOT NULL,
    last_recurring_award_at TEXT
);
"#;

/// SQL for creating the publishable items table.
pub const CREATE_PUBLISHABLE_ITEMS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS publishable_items (
    id TEXT PRIMARY KEY NOT NULL,
    owner_account_id TEXT NOT NULL REFERENCES accounts(id),
    is_public INTEGER NOT NULL DEFAULT 0,
    points_awarded INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_publishable_items_owner
    ON publishable_items(owner_account_id, is_public, points_awarded);
"#;

/// SQL for creating the award audit log.
///
/// `item_id` is unique: a publication can appear at most once, whatever the
/// state of its `points_awarded` flag. Recurring records leave it NULL.
pub const CREATE_AWARD_LEDGER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS award_ledger (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    item_id TEXT UNIQUE,
    points INTEGER NOT NULL,
    awarded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_award_ledger_account ON award_ledger(account_id);
"#;
