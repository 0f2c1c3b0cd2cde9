//! Inbound webhook input: topics, payloads, and the payment-note scanner.

pub mod note;
pub mod payload;
pub mod topic;
