//! Accrual engine.
//!
//! Decides how many points an account has earned and hands the credit to the
//! `LedgerStore` as one atomic, guarded write. Two award kinds:
//! - recurring: periodic payout based on membership tier and elapsed
//!   calendar months since the last recurring award
//! - publication: one-time payout when an item first becomes public
//!
//! Every operation is idempotent. Re-running it after a successful award
//! returns 0 and leaves the ledger untouched.

use std::sync::Arc;

use backon::Retryable;
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::eligibility::periods_elapsed;
use crate::model::{Account, Timestamp};
use crate::policy::PolicyTable;
use crate::storage::{init_storage, LedgerStore, StorageError};
use crate::utils::retry::RetryConfig;

/// Result type for accrual operations.
pub type Result<T> = std::result::Result<T, AccrualError>;

/// Errors surfaced by the accrual engine.
#[derive(Debug, thiserror::Error)]
pub enum AccrualError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Concurrent recurring award conflict for account {account_id}")]
    Conflict { account_id: Uuid },

    #[error("Balance overflow for account {account_id}")]
    BalanceOverflow { account_id: Uuid },

    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(#[source] StorageError),
}

impl AccrualError {
    /// Only a lost anchor race is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<StorageError> for AccrualError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity, id } => Self::NotFound { entity, id },
            StorageError::AnchorConflict { account_id } => Self::Conflict { account_id },
            StorageError::BalanceOverflow { account_id } => Self::BalanceOverflow { account_id },
            other => Self::StoreUnavailable(other),
        }
    }
}

/// Points credited by a full account reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub recurring: u64,
    pub publications: u64,
}

impl ReconcileSummary {
    pub fn total(&self) -> u64 {
        self.recurring.saturating_add(self.publications)
    }
}

/// Loyalty points accrual engine.
///
/// Cheap to clone; clones share the store and policy table.
#[derive(Clone)]
pub struct AccrualEngine {
    store: Arc<dyn LedgerStore>,
    policy: Arc<PolicyTable>,
    retry: RetryConfig,
}

impl AccrualEngine {
    /// Create an engine with default conflict retry settings.
    pub fn new(store: Arc<dyn LedgerStore>, policy: PolicyTable) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
            retry: RetryConfig::default(),
        }
    }

    /// Override conflict retry settings.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Build an engine from application configuration: opens the configured
    /// store and applies the configured rate overrides.
    pub async fn from_config(config: &Config) -> std::result::Result<Self, Box<dyn std::error::Error>> {
        let store = init_storage(&config.storage).await?;
        let policy = PolicyTable::from_config(&config.policy);
        Ok(Self::new(store, policy).with_retry(config.retry.clone()))
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    // -------------------------------------------------------------------------
    // Recurring awards
    // -------------------------------------------------------------------------

    /// Credit any recurring award the account has earned as of now.
    ///
    /// Returns the points credited, 0 if nothing was due.
    pub async fn reconcile_recurring(&self, account_id: Uuid) -> Result<u64> {
        self.reconcile_recurring_at(account_id, Utc::now()).await
    }

    /// Credit any recurring award the account has earned as of `now`.
    ///
    /// All elapsed periods are paid in one write and the anchor moves to
    /// `now`. A concurrent writer that moved the anchor first causes a
    /// re-read and re-evaluation, up to the configured retry limit; if the
    /// race keeps being lost the call fails with `Conflict`.
    #[tracing::instrument(name = "accrual.recurring", skip_all, fields(%account_id, %now))]
    pub async fn reconcile_recurring_at(&self, account_id: Uuid, now: Timestamp) -> Result<u64> {
        let result = (|| async move { self.try_reconcile_recurring(account_id, now).await })
            .retry(self.retry.backoff())
            .when(AccrualError::is_retryable)
            .notify(|err, dur| {
                warn!(error = %err, "Recurring award lost anchor race, retrying in {:?}", dur);
            })
            .await;

        if let Err(AccrualError::Conflict { .. }) = &result {
            warn!(
                max_retries = self.retry.max_retries,
                "Recurring award conflict persisted after retries"
            );
        }
        result
    }

    async fn try_reconcile_recurring(&self, account_id: Uuid, now: Timestamp) -> Result<u64> {
        let account = self.load_account(account_id).await?;

        let periods = periods_elapsed(account.recurring_anchor(), now);
        if periods == 0 {
            debug!(anchor = %account.recurring_anchor(), "No full period elapsed");
            return Ok(0);
        }

        let rate = self
            .policy
            .rates_for(&account.membership_tier)
            .recurring_per_period;
        if rate == 0 {
            debug!(tier = %account.membership_tier, "Tier earns no recurring points");
            return Ok(0);
        }

        let points = rate
            .checked_mul(u64::from(periods))
            .ok_or(AccrualError::BalanceOverflow { account_id })?;

        self.store
            .apply_recurring_award(account_id, points, account.last_recurring_award_at, now)
            .await?;

        info!(
            tier = %account.membership_tier,
            periods,
            points,
            "Recurring award credited"
        );
        Ok(points)
    }

    // -------------------------------------------------------------------------
    // Publication awards
    // -------------------------------------------------------------------------

    /// Pay the one-time publication award for an item if it is public and
    /// has never been paid.
    pub async fn reconcile_publication_award(&self, item_id: Uuid) -> Result<u64> {
        self.reconcile_publication_award_at(item_id, Utc::now()).await
    }

    /// As `reconcile_publication_award`, stamping the audit record with `now`.
    #[tracing::instrument(name = "accrual.publication", skip_all, fields(%item_id))]
    pub async fn reconcile_publication_award_at(&self, item_id: Uuid, now: Timestamp) -> Result<u64> {
        let item = self
            .store
            .get_item(item_id)
            .await?
            .ok_or(AccrualError::NotFound {
                entity: "publishable item",
                id: item_id,
            })?;

        if item.points_awarded {
            debug!("Publication award already paid");
            return Ok(0);
        }
        if !item.is_public {
            debug!("Item is not public");
            return Ok(0);
        }

        let owner = self.load_account(item.owner_account_id).await?;
        let points = self
            .policy
            .rates_for(&owner.membership_tier)
            .one_time_per_publication;
        if points == 0 {
            debug!(tier = %owner.membership_tier, "Tier earns no publication points");
            return Ok(0);
        }

        let paid = self
            .store
            .award_publications(owner.id, &[item_id], points, now)
            .await?;
        if paid.is_empty() {
            // Lost the race to a concurrent caller, which paid it.
            debug!("Publication award paid concurrently");
            return Ok(0);
        }

        info!(account_id = %owner.id, tier = %owner.membership_tier, points, "Publication award credited");
        Ok(points)
    }

    /// Pay every public, unpaid item the account owns.
    ///
    /// Equivalent to calling `reconcile_publication_award` on each of them,
    /// but credits the balance in a single write.
    pub async fn reconcile_all_unawarded_publications(&self, account_id: Uuid) -> Result<u64> {
        self.reconcile_all_unawarded_publications_at(account_id, Utc::now())
            .await
    }

    #[tracing::instrument(name = "accrual.publications_sweep", skip_all, fields(%account_id, %now))]
    pub async fn reconcile_all_unawarded_publications_at(
        &self,
        account_id: Uuid,
        now: Timestamp,
    ) -> Result<u64> {
        let account = self.load_account(account_id).await?;

        let pending = self.store.list_unawarded_public_items(account_id).await?;
        if pending.is_empty() {
            debug!("No unpaid public items");
            return Ok(0);
        }

        let rate = self
            .policy
            .rates_for(&account.membership_tier)
            .one_time_per_publication;
        if rate == 0 {
            debug!(tier = %account.membership_tier, "Tier earns no publication points");
            return Ok(0);
        }

        let paid = self
            .store
            .award_publications(account_id, &pending, rate, now)
            .await?;
        let points = rate
            .checked_mul(paid.len() as u64)
            .ok_or(AccrualError::BalanceOverflow { account_id })?;

        if paid.len() < pending.len() {
            debug!(
                skipped = pending.len() - paid.len(),
                "Some items were paid concurrently"
            );
        }
        if points > 0 {
            info!(items = paid.len(), points, "Publication awards credited");
        }
        Ok(points)
    }

    // -------------------------------------------------------------------------
    // Whole account
    // -------------------------------------------------------------------------

    /// Run the recurring award and the publication sweep for one account.
    pub async fn reconcile_account(&self, account_id: Uuid) -> Result<ReconcileSummary> {
        self.reconcile_account_at(account_id, Utc::now()).await
    }

    pub async fn reconcile_account_at(
        &self,
        account_id: Uuid,
        now: Timestamp,
    ) -> Result<ReconcileSummary> {
        let recurring = self.reconcile_recurring_at(account_id, now).await?;
        let publications = self
            .reconcile_all_unawarded_publications_at(account_id, now)
            .await?;
        Ok(ReconcileSummary {
            recurring,
            publications,
        })
    }

    async fn load_account(&self, account_id: Uuid) -> Result<Account> {
        self.store
            .get_account(account_id)
            .await?
            .ok_or(AccrualError::NotFound {
                entity: "account",
                id: account_id,
            })
    }
}
