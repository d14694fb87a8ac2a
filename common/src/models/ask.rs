//! Question-to-SQL models.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::query::ExecutionOutcome;

/// A natural-language question. Taken verbatim, no length limit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AskRequest {
    #[serde(default)]
    pub question: String,
}

/// SQL produced by the model for a question.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratedQuery {
    pub question: String,
    /// Model output, trimmed of surrounding whitespace.
    pub sql: String,
}

/// Full answer: the generated SQL and what running it produced.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AskResponse {
    pub question: String,
    pub sql: String,
    pub outcome: ExecutionOutcome,
    /// Wall time for generation plus execution.
    pub execution_time_ms: u64,
}
