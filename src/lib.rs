//! Catchpoints - loyalty points accrual engine
//!
//! Credits membership-based recurring awards and one-time publication
//! awards to user accounts. Every award is idempotent and applied to the
//! ledger as one atomic, guarded write, so concurrent or repeated
//! reconciliation never pays twice.

pub mod config;
pub mod eligibility;
pub mod model;
pub mod policy;
pub mod services;
pub mod storage;
pub mod utils;

pub use config::Config;
pub use model::{Account, AwardKind, AwardRecord, MembershipTier, PublishableItem, Timestamp};
pub use policy::{AwardRates, PolicyTable};
pub use services::{AccrualEngine, AccrualError, ReconcileSummary};
pub use storage::{init_storage, LedgerStore, StorageError};
