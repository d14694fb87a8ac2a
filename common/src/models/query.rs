//! SQL execution models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// Shown when a non-row-producing statement was committed.
pub const SUCCESS_MARKER: &str = "✅ Query executed successfully.";

/// Prefix of every execution failure message.
pub const FAILURE_MARKER: &str = "❌ Error executing query:";

/// Request body for executing a SQL statement directly.
#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct ExecuteRequest {
    /// SQL statement to execute verbatim.
    #[validate(length(min = 1, message = "SQL statement is required"))]
    pub sql: String,
}

/// Column information taken from the statement description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Database type name (e.g. `INT8`, `TEXT`).
    pub data_type: String,
}

/// Result of executing one statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The statement produced a result set.
    Rows {
        columns: Vec<ColumnInfo>,
        /// One JSON value per column, in column order.
        rows: Vec<Vec<serde_json::Value>>,
        row_count: usize,
    },
    /// The statement produced no result set and was committed.
    Acknowledged { rows_affected: u64 },
    /// Connecting or executing failed. `message` starts with [`FAILURE_MARKER`].
    Failed { message: String },
}

impl ExecutionOutcome {
    pub fn rows(columns: Vec<ColumnInfo>, rows: Vec<Vec<serde_json::Value>>) -> Self {
        let row_count = rows.len();
        ExecutionOutcome::Rows {
            columns,
            rows,
            row_count,
        }
    }

    /// Builds a failure outcome from any error.
    pub fn failed(error: impl std::fmt::Display) -> Self {
        ExecutionOutcome::Failed {
            message: format!("{} {}", FAILURE_MARKER, error),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed { .. })
    }

    /// One display line per result element: each row as a tuple, the
    /// success marker, or the failure message.
    pub fn display_lines(&self) -> Vec<String> {
        match self {
            ExecutionOutcome::Rows { rows, .. } => rows.iter().map(|row| format_row(row)).collect(),
            ExecutionOutcome::Acknowledged { .. } => vec![SUCCESS_MARKER.to_string()],
            ExecutionOutcome::Failed { message } => vec![message.clone()],
        }
    }
}

/// Formats a row as a tuple, e.g. `(5,)` or `('Ann', 91)`.
fn format_row(row: &[serde_json::Value]) -> String {
    let cells: Vec<String> = row
        .iter()
        .map(|value| match value {
            serde_json::Value::Null => "None".to_string(),
            serde_json::Value::String(s) => format!("'{}'", s),
            other => other.to_string(),
        })
        .collect();
    if cells.len() == 1 {
        format!("({},)", cells[0])
    } else {
        format!("({})", cells.join(", "))
    }
}
