//! 会话相关的 HTTP 处理器

use crate::{
    auth::middleware::AuthContext, error::AppError, middleware::AppState, models::auth::*,
};
use axum::{extract::rejection::JsonRejection, extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

/// 内置管理员登录
pub async fn login_root(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRootRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(req) = payload?;

    let response = state
        .session_service
        .login_root(&state.validator, req)
        .await?;

    Ok(Json(response))
}

/// 当前身份
pub async fn get_me(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.session_service.get_me(&auth_context)))
}

/// 登出，撤销当前请求使用的 key
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth_context: AuthContext,
) -> Result<impl IntoResponse, AppError> {
    state.session_service.logout(&auth_context.token).await?;

    Ok(Json(json!({})))
}
