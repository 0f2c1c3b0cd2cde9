//! Application layer: the workflow orchestration.
//!
//! [`engine::EscrowEngine`] is the entry point. Each operation opens one store
//! transaction, applies the workflow rules from the domain layer, writes the
//! audit trail, and commits; any error drops the transaction and with it every
//! write made so far.

pub mod engine;
pub mod ingest;
pub mod lifecycle;
pub mod overrides;
pub mod payments;
pub mod queries;
mod trail;

#[cfg(test)]
pub(crate) mod testing;
