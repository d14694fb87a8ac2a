//! 问答流程服务模块

use std::sync::Arc;
use std::time::Instant;

use common::errors::AppResult;
use common::models::ask::{AskResponse, GeneratedQuery};

use crate::executor::QueryExecutor;
use crate::generator::QueryGenerator;

/// Question → SQL → result pipeline.
pub struct Text2SqlService {
    generator: QueryGenerator,
    executor: Arc<QueryExecutor>,
}

impl Text2SqlService {
    /// 创建新的服务实例
    pub fn new(generator: QueryGenerator, executor: Arc<QueryExecutor>) -> Self {
        Self { generator, executor }
    }

    /// 仅生成 SQL，不执行
    pub async fn generate(&self, question: &str) -> AppResult<GeneratedQuery> {
        let sql = self.generator.generate_sql(question).await?;
        Ok(GeneratedQuery {
            question: question.to_string(),
            sql,
        })
    }

    /// 生成 SQL 并执行
    ///
    /// Fails only when generation fails; execution problems are reported
    /// inside the returned outcome.
    pub async fn ask(&self, question: &str) -> AppResult<AskResponse> {
        let start = Instant::now();
        let GeneratedQuery { question, sql } = self.generate(question).await?;
        let outcome = self.executor.execute(&sql).await;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            elapsed_ms = execution_time_ms,
            failed = outcome.is_failed(),
            "question answered"
        );

        Ok(AskResponse {
            question,
            sql,
            outcome,
            execution_time_ms,
        })
    }
}
