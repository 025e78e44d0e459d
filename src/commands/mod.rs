//! CLI command implementations.

pub mod lock;
