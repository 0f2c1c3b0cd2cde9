//! Parsing of untrusted inbound input and the CLI's file formats.

pub mod csv;
pub mod scenario;
pub mod webhook;
