//! Application state for the text2sql service.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::AppResult;

use crate::executor::QueryExecutor;
use crate::generator::{CompletionModel, GroqChatModel, QueryGenerator};
use crate::service::Text2SqlService;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub generator: QueryGenerator,
    pub executor: Arc<QueryExecutor>,
    /// Executor behind `/api/execute`, gated by the stricter execute policy.
    pub direct_executor: Arc<QueryExecutor>,
}

impl AppState {
    /// Creates the state with the Groq model from configuration.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let model = GroqChatModel::new(config.llm.clone())?;
        Ok(Self::with_model(config, Arc::new(model)))
    }

    /// Creates the state around an arbitrary completion model.
    pub fn with_model(config: AppConfig, model: Arc<dyn CompletionModel>) -> Self {
        let executor = QueryExecutor::new(config.database.clone(), config.statement_policy.clone());
        let direct_executor =
            QueryExecutor::new(config.database.clone(), config.execute_policy.clone());
        Self {
            config: Arc::new(config),
            generator: QueryGenerator::new(model),
            executor: Arc::new(executor),
            direct_executor: Arc::new(direct_executor),
        }
    }

    pub fn service(&self) -> Text2SqlService {
        Text2SqlService::new(self.generator.clone(), self.executor.clone())
    }
}
