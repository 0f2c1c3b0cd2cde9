//! Adapters for the domain ports.

pub mod clock;
pub mod hmac;
pub mod in_memory;
pub mod simulated_platform;
