//! Utility functions and helpers.

pub mod statement;

pub use statement::{StatementKind, StatementPolicy};
