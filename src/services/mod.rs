//! Accrual services.

pub mod accrual;

pub use accrual::{AccrualEngine, AccrualError, ReconcileSummary};
