//! HTTP 中间件
//! 应用状态、请求追踪、活动日志

use crate::{
    auth::password::AdminCredentials,
    config::AppConfig,
    error::AppError,
    models::activity_log::NewActivityLog,
    repository::{ActivityLogRepository, ApiKeyRepository},
    services::SessionService,
    sweeper::ExpirySweeper,
    validation::InputValidator,
};
use axum::{
    body::{Body, Bytes},
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// 健康检查路径，不写活动日志
pub const HEALTH_CHECK_PATH: &str = "/api/health-check";

/// 允许缓存的最大请求体（字节）
pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// 超过该长度的请求/响应体只记录长度
const MAX_LOGGED_BODY_BYTES: usize = 5000;

/// 写入活动日志前遮盖的顶层 JSON 字段
const MASKED_FIELDS: &[&str] = &["password"];

/// 本次请求的唯一编号，由请求追踪中间件生成
///
/// 同时作为日志 span 的 request_id、响应头 x-request-id 和活动日志主键。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestId(pub Uuid);

/// 应用状态
///
/// 所有请求共享同一个连接池；服务通过 Arc 共享，Clone 成本低廉。
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: sqlx::PgPool,
    pub validator: InputValidator,
    pub api_keys: ApiKeyRepository,
    pub activity_logs: ActivityLogRepository,
    pub session_service: Arc<SessionService>,
    pub sweeper: Arc<ExpirySweeper>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, db: sqlx::PgPool) -> Result<Self, AppError> {
        let api_keys = ApiKeyRepository::new(db.clone());
        let admin = AdminCredentials::from_config(&config.admin)?;
        let session_service = Arc::new(SessionService::new(api_keys.clone(), admin, &config)?);
        let sweeper = Arc::new(ExpirySweeper::from_config(api_keys.clone(), &config.sweeper));

        Ok(Self {
            activity_logs: ActivityLogRepository::new(db.clone()),
            validator: InputValidator::new(),
            api_keys,
            session_service,
            sweeper,
            started_at: Utc::now(),
            config,
            db,
        })
    }
}

/// 请求追踪中间件
/// 为每个请求生成 trace_id 和 request_id，并记录指标
pub async fn request_tracking_middleware(mut req: Request, next: Next) -> Response {
    let trace_id = extract_or_generate_trace_id(req.headers());
    let request_id = Uuid::new_v4();
    req.extensions_mut().insert(RequestId(request_id));

    let method = req.method().to_string();
    let uri = req.uri().to_string();

    let span = tracing::info_span!(
        "http_request",
        trace_id = %trace_id,
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    async move {
        let start = Instant::now();

        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status().as_u16();

        // metrics 标签使用静态字符串
        let method_name = match method.as_str() {
            "GET" => "GET",
            "POST" => "POST",
            "PUT" => "PUT",
            "DELETE" => "DELETE",
            "PATCH" => "PATCH",
            _ => "UNKNOWN",
        };
        let status_code = match status {
            200 => "200",
            400 => "400",
            401 => "401",
            403 => "403",
            404 => "404",
            500 => "500",
            _ => "other",
        };

        metrics::counter!("http_requests_total", "method" => method_name, "status" => status_code)
            .increment(1);
        metrics::histogram!("http_request_duration_seconds").record(elapsed.as_secs_f64());

        tracing::info!(
            method = %method,
            uri = %uri,
            status = status,
            elapsed_ms = elapsed.as_millis(),
            "Request completed"
        );

        if let Ok(value) = HeaderValue::from_str(&trace_id) {
            response.headers_mut().insert("x-trace-id", value);
        }
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }

        response
    }
    .instrument(span)
    .await
}

/// 从请求头中提取或生成 trace_id
///
/// 优先使用调用方传入的 x-request-no，其次 x-trace-id。
fn extract_or_generate_trace_id(headers: &HeaderMap) -> String {
    ["x-request-no", "x-trace-id"]
        .iter()
        .find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// 活动日志中间件
///
/// 记录每个请求/响应对（健康检查除外）。写入失败只记日志，不影响响应。
pub async fn activity_log_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    if req.uri().path() == HEALTH_CHECK_PATH {
        return next.run(req).await;
    }

    let request_no = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0)
        .unwrap_or_else(Uuid::new_v4);
    let http_method = req.method().to_string();
    let service_endpoint = req.uri().path().to_string();
    let service_code = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| service_endpoint.clone());

    let (parts, body) = req.into_parts();
    let request_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return AppError::BadRequest(format!("Unable to read request body: {}", e))
                .into_response()
        }
    };
    let request_body = loggable_body(&request_bytes);
    let req = Request::from_parts(parts, Body::from(request_bytes));

    let response = next.run(req).await;

    let (parts, body) = response.into_parts();
    let response_bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Unable to buffer response body");
            return AppError::internal_error("Unable to buffer response body").into_response();
        }
    };

    let log = NewActivityLog {
        request_no,
        service_code,
        service_name: env!("CARGO_PKG_NAME").to_string(),
        service_endpoint,
        http_method,
        request_body,
        http_status_code: i32::from(parts.status.as_u16()),
        response_body: loggable_body(&response_bytes),
    };

    tracing::debug!(
        request_body = log.request_body.as_deref().unwrap_or_default(),
        response_body = log.response_body.as_deref().unwrap_or_default(),
        "Request/response payloads"
    );

    if let Err(e) = state.activity_logs.create(&log).await {
        tracing::error!(error = %e, request_no = %log.request_no, "CreateActivityLog error");
    }

    Response::from_parts(parts, Body::from(response_bytes))
}

/// 日志中保存的请求/响应体：JSON 压缩并遮盖密码，过长时只保留长度
fn loggable_body(bytes: &Bytes) -> Option<String> {
    if bytes.is_empty() {
        return None;
    }
    if bytes.len() > MAX_LOGGED_BODY_BYTES {
        return Some(format!("length is {} bytes", bytes.len()));
    }

    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(mut value) => {
            if let Some(object) = value.as_object_mut() {
                for field in MASKED_FIELDS {
                    if let Some(v) = object.get_mut(*field) {
                        *v = serde_json::Value::String("******".to_string());
                    }
                }
            }
            Some(value.to_string())
        }
        Err(_) => Some(String::from_utf8_lossy(bytes).into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_or_generate_trace_id() {
        let mut headers = HeaderMap::new();
        headers.insert("x-trace-id", "test-trace-123".parse().unwrap());

        let trace_id = extract_or_generate_trace_id(&headers);
        assert_eq!(trace_id, "test-trace-123");

        headers.insert("x-request-no", "req-no-1".parse().unwrap());
        assert_eq!(extract_or_generate_trace_id(&headers), "req-no-1");

        let headers = HeaderMap::new();
        let trace_id = extract_or_generate_trace_id(&headers);
        assert!(!trace_id.is_empty());
        assert_ne!(trace_id, "test-trace-123");
    }

    #[tokio::test]
    async fn test_request_id_is_shared_with_handlers() {
        use axum::{routing::get, Extension, Router};
        use tower::ServiceExt;

        let app = Router::new()
            .route(
                "/echo",
                get(|Extension(id): Extension<RequestId>| async move { id.0.to_string() }),
            )
            .layer(axum::middleware::from_fn(request_tracking_middleware));

        // 非 UUID 的 x-request-no 仍只作为 trace_id
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/echo")
                    .header("x-request-no", "not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-trace-id"], "not-a-uuid");
        let header_id = response.headers()["x-request-id"].to_str().unwrap().to_string();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(String::from_utf8_lossy(&body), header_id);
        assert!(Uuid::parse_str(&header_id).is_ok());
    }

    #[test]
    fn test_loggable_body_masks_password() {
        let body = Bytes::from_static(br#"{"username":"root","password":"hunter2"}"#);
        let logged = loggable_body(&body).unwrap();
        assert!(!logged.contains("hunter2"));
        let logged: serde_json::Value = serde_json::from_str(&logged).unwrap();
        assert_eq!(
            logged,
            serde_json::json!({ "username": "root", "password": "******" })
        );
    }

    #[test]
    fn test_loggable_body_compacts_json() {
        let body = Bytes::from_static(b"{ \"username\" : \"root\" }");
        assert_eq!(loggable_body(&body).as_deref(), Some(r#"{"username":"root"}"#));
    }

    #[test]
    fn test_loggable_body_masks_large_payloads() {
        let body = Bytes::from(vec![b'a'; 6000]);
        assert_eq!(loggable_body(&body).as_deref(), Some("length is 6000 bytes"));
    }

    #[test]
    fn test_loggable_body_empty() {
        assert_eq!(loggable_body(&Bytes::new()), None);
    }
}
