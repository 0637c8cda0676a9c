//! SQLite implementation of the ledger store.

mod ledger_store;

pub use ledger_store::SqliteLedgerStore;
