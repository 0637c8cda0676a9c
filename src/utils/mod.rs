//! Shared utilities: tracing bootstrap and conflict retry backoff.

pub mod bootstrap;
pub mod retry;
