//! 路由注册
//! 创建所有 API 路由并应用中间件

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use crate::{
    auth::{api_key_auth_middleware, require_roles, RequiredRoles},
    handlers,
    middleware::{self, AppState, HEALTH_CHECK_PATH, MAX_REQUEST_BODY_BYTES},
};

/// 创建应用路由
pub fn create_router(state: Arc<AppState>) -> Router {
    // 公开端点
    let public_routes = Router::new()
        .route(HEALTH_CHECK_PATH, get(handlers::health::health_check))
        .route("/api/ready", get(handlers::health::readiness_check))
        .route("/api/root-login", post(handlers::auth::login_root));

    // 管理端点，需要 admin 角色
    let admin_routes = Router::new()
        .route(
            "/api/admin/sweep-expired-keys",
            post(handlers::admin::sweep_expired_keys),
        )
        .route_layer(from_fn_with_state(RequiredRoles::any_of(&["admin"]), require_roles));

    // 需要认证的路由
    // route_layer 只作用于已匹配的路由，未知路径直接落到 404
    let authenticated_routes = Router::new()
        .route("/api/me", get(handlers::auth::get_me))
        .route("/api/logout", post(handlers::auth::logout))
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), api_key_auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(public_routes)
        .merge(authenticated_routes)
        .layer(from_fn_with_state(state.clone(), middleware::activity_log_middleware))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(middleware::request_tracking_middleware))
        .with_state(state)
}
