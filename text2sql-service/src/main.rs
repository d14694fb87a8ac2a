//! 自然语言转 SQL 服务
//!
//! 单页问答工具，包括：
//! - 将问题嵌入固定提示词模板
//! - 调用大模型生成 SQL
//! - 在 PostgreSQL 上执行并展示结果

mod executor;
mod generator;
mod handlers;
mod prompt;
mod routes;
mod service;
mod state;
mod ui;

use anyhow::Context;
use axum::http::{header, HeaderValue, Method};
use axum::{middleware, routing::get, Json, Router};
use common::config::AppConfig;
use common::middleware::request_id::request_id_middleware;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

const SERVICE_NAME: &str = "text2sql-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Text2SQL 服务 API",
        version = "0.1.0",
        description = "自然语言转 SQL 并在 PostgreSQL 上执行"
    ),
    paths(
        handlers::ask,
        handlers::generate,
        handlers::execute,
        handlers::health_check,
    ),
    components(schemas(
        common::models::AskRequest,
        common::models::AskResponse,
        common::models::GeneratedQuery,
        common::models::ExecuteRequest,
        common::models::ExecutionOutcome,
        common::models::ColumnInfo,
        handlers::HealthResponse,
    )),
    tags(
        (name = "text2sql", description = "问答与执行端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME).context("加载配置失败")?;
    if config.llm.api_key.is_none() {
        warn!("GROQ_API_KEY 未设置，SQL 生成将失败");
    }
    info!(
        model = %config.llm.model,
        db_host = %config.database.host,
        db_port = config.database.port,
        policy = ?config.statement_policy,
        execute_policy = ?config.execute_policy,
        cors_origins = config.cors_allowed_origins.len(),
        "配置已加载"
    );

    // 创建应用状态
    let state = AppState::new(config.clone()).context("创建应用状态失败")?;

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app).await.context("服务启动失败")?;
    Ok(())
}

fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.cors_allowed_origins);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Cross-origin access only for configured origins; none by default.
fn cors_layer(origins: &[HeaderValue]) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins.iter().cloned()))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::tests::{FailingModel, StaticModel};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use common::models::query::FAILURE_MARKER;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn config_with(extra: &[(&'static str, &'static str)]) -> AppConfig {
        let mut env: HashMap<&str, &str> = HashMap::from([
            ("PG_HOST", "127.0.0.1"),
            ("PG_PORT", "1"),
            ("DB_CONNECT_TIMEOUT_SECS", "5"),
        ]);
        env.extend(extra.iter().copied());
        AppConfig::from_lookup(SERVICE_NAME, |key| env.get(key).map(|v| v.to_string())).unwrap()
    }

    fn app_with(model: Arc<dyn generator::CompletionModel>) -> Router {
        create_router(AppState::with_model(config_with(&[]), model))
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method("OPTIONS")
            .uri("/api/execute")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
            .body(Body::empty())
            .unwrap()
    }

    fn json_request(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        let json = body_json(response).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn test_index_page() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Run Query"));
    }

    #[tokio::test]
    async fn test_api_generate() {
        let model = Arc::new(StaticModel("\nSELECT * FROM STUDENT WHERE MARKS > 90;\n".into()));
        let response = app_with(model)
            .oneshot(json_request(
                "/api/generate",
                json!({"question": "Show students with marks above 90."}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["sql"], "SELECT * FROM STUDENT WHERE MARKS > 90;");
        assert!(json["meta"]["request_id"].is_string());
    }

    #[tokio::test]
    async fn test_api_ask_reports_execution_failure_in_outcome() {
        let model = Arc::new(StaticModel("SELECT COUNT(*) FROM STUDENT;".into()));
        let response = app_with(model)
            .oneshot(json_request("/api/ask", json!({"question": "How many students are in total?"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["sql"], "SELECT COUNT(*) FROM STUDENT;");
        assert_eq!(json["data"]["outcome"]["status"], "failed");
        assert!(json["data"]["outcome"]["message"]
            .as_str()
            .unwrap()
            .starts_with(FAILURE_MARKER));
    }

    #[tokio::test]
    async fn test_api_ask_model_failure_is_bad_gateway() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(json_request("/api/ask", json!({"question": "anything"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "EXTERNAL_SERVICE_ERROR");
    }

    #[tokio::test]
    async fn test_api_execute_rejects_empty_sql() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(json_request("/api/execute", json!({"sql": ""})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_api_execute_is_read_only_by_default() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(json_request("/api/execute", json!({"sql": "DROP TABLE STUDENT"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "failed");
        assert!(json["data"]["message"].as_str().unwrap().contains("not permitted"));
    }

    #[tokio::test]
    async fn test_api_execute_uses_its_own_policy() {
        let config = config_with(&[("SQL_EXECUTE_ALLOWED_STATEMENTS", "all")]);
        let app = create_router(AppState::with_model(config, Arc::new(FailingModel)));
        let response = app
            .oneshot(json_request("/api/execute", json!({"sql": "DROP TABLE STUDENT"})))
            .await
            .unwrap();
        let json = body_json(response).await;
        // passes the policy and fails on the unreachable database instead
        assert_eq!(json["data"]["status"], "failed");
        assert!(!json["data"]["message"].as_str().unwrap().contains("not permitted"));
    }

    #[tokio::test]
    async fn test_cross_origin_requests_denied_by_default() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(preflight("http://attacker.example"))
            .await
            .unwrap();
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_cross_origin_allowed_for_configured_origin() {
        let config = config_with(&[("CORS_ALLOWED_ORIGINS", "http://localhost:3000")]);
        let app = create_router(AppState::with_model(config, Arc::new(FailingModel)));

        let allowed = app.clone().oneshot(preflight("http://localhost:3000")).await.unwrap();
        assert_eq!(
            allowed.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:3000"
        );

        let denied = app.oneshot(preflight("http://attacker.example")).await.unwrap();
        assert!(!denied.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_form_submission_renders_results() {
        let model = Arc::new(StaticModel("SELECT COUNT(*) FROM STUDENT;".into()));
        let response = app_with(model)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("question=How+many+students+are+in+total%3F"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("value=\"How many students are in total?\""));
        assert!(html.contains("<span class=\"kw\">SELECT</span>"));
        assert!(html.contains("<div class=\"results failed\">"));
    }

    #[tokio::test]
    async fn test_form_submission_model_failure() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("question=hi"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(body_text(response).await.contains("Could not generate SQL"));
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let response = app_with(Arc::new(FailingModel))
            .oneshot(Request::builder().uri("/api-docs/openapi.json").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(response).await;
        assert!(json["paths"].get("/api/ask").is_some());
        assert!(json["paths"].get("/api/execute").is_some());
    }
}
