//! Mock LedgerStore implementation for testing.
//!
//! Holds all state behind one lock so every trait operation is atomic, the
//! same guarantee a transactional backend gives. Also serves the `memory`
//! storage type for local development.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{Account, AwardKind, AwardRecord, MembershipTier, PublishableItem, Timestamp};
use crate::storage::{LedgerStore, Result, StorageError};

#[derive(Default)]
struct MockState {
    accounts: HashMap<Uuid, Account>,
    items: HashMap<Uuid, PublishableItem>,
    awards: Vec<AwardRecord>,
}

/// In-memory ledger store.
#[derive(Default)]
pub struct MockLedgerStore {
    state: RwLock<MockState>,
    fail_on_read: RwLock<bool>,
    fail_on_write: RwLock<bool>,
    forced_conflicts: RwLock<u32>,
    recurring_writes: RwLock<u32>,
}

impl MockLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    /// Make the next `count` recurring award writes fail with
    /// `AnchorConflict`, as if another writer had moved the anchor.
    pub async fn force_anchor_conflicts(&self, count: u32) {
        *self.forced_conflicts.write().await = count;
    }

    /// Number of recurring award write attempts seen so far.
    pub async fn recurring_write_attempts(&self) -> u32 {
        *self.recurring_writes.read().await
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StorageError::Unavailable("read failure injected".to_string()));
        }
        Ok(())
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StorageError::Unavailable("write failure injected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MockLedgerStore {
    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        self.check_read().await?;
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if state.accounts.contains_key(&account.id) {
            return Err(StorageError::AlreadyExists {
                entity: "account",
                id: account.id,
            });
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn set_membership_tier(&self, id: Uuid, tier: &MembershipTier) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(&id)
            .ok_or(StorageError::NotFound { entity: "account", id })?;
        account.membership_tier = tier.clone();
        Ok(())
    }

    async fn apply_recurring_award(
        &self,
        account_id: Uuid,
        points: u64,
        expected_last_award: Option<Timestamp>,
        awarded_at: Timestamp,
    ) -> Result<()> {
        *self.recurring_writes.write().await += 1;
        self.check_write().await?;

        {
            let mut forced = self.forced_conflicts.write().await;
            if *forced > 0 {
                *forced -= 1;
                return Err(StorageError::AnchorConflict { account_id });
            }
        }

        let mut state = self.state.write().await;
        let account = state.accounts.get_mut(&account_id).ok_or(StorageError::NotFound {
            entity: "account",
            id: account_id,
        })?;

        if account.last_recurring_award_at != expected_last_award {
            return Err(StorageError::AnchorConflict { account_id });
        }

        let balance = account
            .balance
            .checked_add(points)
            .filter(|b| i64::try_from(*b).is_ok())
            .ok_or(StorageError::BalanceOverflow { account_id })?;

        account.balance = balance;
        account.last_recurring_award_at = Some(awarded_at);
        state.awards.push(AwardRecord {
            account_id,
            kind: AwardKind::Recurring,
            item_id: None,
            points,
            awarded_at,
        });
        Ok(())
    }

    async fn get_item(&self, id: Uuid) -> Result<Option<PublishableItem>> {
        self.check_read().await?;
        Ok(self.state.read().await.items.get(&id).cloned())
    }

    async fn create_item(&self, item: &PublishableItem) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        if state.items.contains_key(&item.id) {
            return Err(StorageError::AlreadyExists {
                entity: "publishable item",
                id: item.id,
            });
        }
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn set_item_visibility(&self, id: Uuid, is_public: bool) -> Result<()> {
        self.check_write().await?;
        let mut state = self.state.write().await;
        let item = state.items.get_mut(&id).ok_or(StorageError::NotFound {
            entity: "publishable item",
            id,
        })?;
        item.is_public = is_public;
        Ok(())
    }

    async fn list_unawarded_public_items(&self, account_id: Uuid) -> Result<Vec<Uuid>> {
        self.check_read().await?;
        let state = self.state.read().await;
        let mut ids: Vec<Uuid> = state
            .items
            .values()
            .filter(|item| {
                item.owner_account_id == account_id && item.is_public && !item.points_awarded
            })
            .map(|item| item.id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn award_publications(
        &self,
        account_id: Uuid,
        item_ids: &[Uuid],
        points_per_item: u64,
        awarded_at: Timestamp,
    ) -> Result<Vec<Uuid>> {
        self.check_write().await?;
        let mut state = self.state.write().await;

        let balance = state
            .accounts
            .get(&account_id)
            .map(|a| a.balance)
            .ok_or(StorageError::NotFound {
                entity: "account",
                id: account_id,
            })?;

        let mut eligible: Vec<Uuid> = item_ids
            .iter()
            .copied()
            .filter(|id| {
                state.items.get(id).is_some_and(|item| {
                    item.owner_account_id == account_id && item.is_public && !item.points_awarded
                })
            })
            .collect();
        eligible.sort();
        eligible.dedup();

        if eligible.is_empty() {
            return Ok(eligible);
        }

        // Validate the credit before mutating anything.
        let new_balance = points_per_item
            .checked_mul(eligible.len() as u64)
            .and_then(|credit| balance.checked_add(credit))
            .filter(|b| i64::try_from(*b).is_ok())
            .ok_or(StorageError::BalanceOverflow { account_id })?;

        for id in &eligible {
            if let Some(item) = state.items.get_mut(id) {
                item.points_awarded = true;
            }
            state.awards.push(AwardRecord {
                account_id,
                kind: AwardKind::Publication,
                item_id: Some(*id),
                points: points_per_item,
                awarded_at,
            });
        }
        if let Some(account) = state.accounts.get_mut(&account_id) {
            account.balance = new_balance;
        }

        Ok(eligible)
    }

    async fn list_awards(&self, account_id: Uuid) -> Result<Vec<AwardRecord>> {
        self.check_read().await?;
        let state = self.state.read().await;
        Ok(state
            .awards
            .iter()
            .filter(|r| r.account_id == account_id)
            .cloned()
            .collect())
    }
}
