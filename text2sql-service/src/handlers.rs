//! Handler模块

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    Extension, Form, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::ask::{AskRequest, AskResponse, GeneratedQuery};
use common::models::query::{ExecuteRequest, ExecutionOutcome};
use common::response::ApiResponse;

use crate::state::AppState;
use crate::ui::{render_page, PageResult};

/// 问答页面
pub async fn index() -> Html<String> {
    Html(render_page("", None))
}

/// 页面表单提交：生成并执行 SQL
pub async fn ask_form(
    State(state): State<AppState>,
    Form(req): Form<AskRequest>,
) -> (StatusCode, Html<String>) {
    match state.service().ask(&req.question).await {
        Ok(answer) => (
            StatusCode::OK,
            Html(render_page(&req.question, Some(PageResult::Answer(&answer)))),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "SQL generation failed");
            let message = e.to_string();
            (
                e.status_code(),
                Html(render_page(&req.question, Some(PageResult::GenerationError(&message)))),
            )
        }
    }
}

/// 自然语言提问：生成 SQL 并执行
#[utoipa::path(
    post,
    path = "/api/ask",
    tag = "text2sql",
    request_body = AskRequest,
    responses(
        (status = 200, description = "SQL 已生成并执行（执行失败时 outcome 为 failed）", body = ApiResponse<AskResponse>),
        (status = 502, description = "大模型调用失败")
    )
)]
pub async fn ask(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<AskRequest>,
) -> Result<Json<ApiResponse<AskResponse>>, AppError> {
    let answer = state.service().ask(&req.question).await?;
    let duration = answer.execution_time_ms;
    Ok(Json(
        ApiResponse::ok_with_service(answer, state.config.service_name.clone())
            .with_duration(duration)
            .with_request_id(request_id.as_str()),
    ))
}

/// 仅生成 SQL
#[utoipa::path(
    post,
    path = "/api/generate",
    tag = "text2sql",
    request_body = AskRequest,
    responses(
        (status = 200, description = "SQL 已生成", body = ApiResponse<GeneratedQuery>),
        (status = 502, description = "大模型调用失败")
    )
)]
pub async fn generate(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<AskRequest>,
) -> Result<Json<ApiResponse<GeneratedQuery>>, AppError> {
    let generated = state.service().generate(&req.question).await?;
    Ok(Json(
        ApiResponse::ok_with_service(generated, state.config.service_name.clone())
            .with_request_id(request_id.as_str()),
    ))
}

/// 直接执行 SQL（默认仅允许只读语句）
#[utoipa::path(
    post,
    path = "/api/execute",
    tag = "text2sql",
    request_body = ExecuteRequest,
    responses(
        (status = 200, description = "执行结果（rows / acknowledged / failed），不允许的语句返回 failed", body = ApiResponse<ExecutionOutcome>),
        (status = 400, description = "SQL 为空")
    )
)]
pub async fn execute(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<ApiResponse<ExecutionOutcome>>, AppError> {
    req.validate()?;
    let outcome = state.direct_executor.execute(&req.sql).await;
    Ok(Json(
        ApiResponse::ok_with_service(outcome, state.config.service_name.clone())
            .with_request_id(request_id.as_str()),
    ))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: state.config.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    })
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}
