//! Shared data models.

pub mod ask;
pub mod query;

pub use ask::{AskRequest, AskResponse, GeneratedQuery};
pub use query::{ColumnInfo, ExecuteRequest, ExecutionOutcome, FAILURE_MARKER, SUCCESS_MARKER};
