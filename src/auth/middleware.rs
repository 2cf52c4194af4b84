//! API key 认证中间件

use crate::{error::AppError, middleware::AppState, models::api_key::ApiKey};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// 认证上下文（附加到请求扩展）
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// 请求携带的 bearer token
    pub token: String,
    pub external_subject_id: String,
    pub user_id: i64,
    pub email_address: String,
    pub profile_picture: String,
    pub roles: Vec<String>,
}

impl AuthContext {
    /// 由校验结果构造认证上下文
    ///
    /// 身份字段取第一行，角色汇总所有行。没有行或主体为空时返回 None。
    pub fn from_rows(token: &str, rows: &[ApiKey]) -> Option<Self> {
        let first = rows.first()?;
        if first.external_subject_id.is_empty() {
            return None;
        }

        let mut roles: Vec<String> = Vec::new();
        for role in rows.iter().filter_map(|r| r.role_name.as_ref()) {
            if !roles.contains(role) {
                roles.push(role.clone());
            }
        }

        Some(Self {
            token: token.to_string(),
            external_subject_id: first.external_subject_id.clone(),
            user_id: first.user_id,
            email_address: first.email_address.clone().unwrap_or_default(),
            profile_picture: first.profile_picture.clone().unwrap_or_default(),
            roles,
        })
    }

    pub fn has_any_role(&self, required: &[String]) -> bool {
        required.iter().any(|r| self.roles.contains(r))
    }
}

// 实现 FromRequestParts 以便在 handler 中直接提取 AuthContext
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// 从 Authorization 头提取 bearer token
///
/// 格式必须是 `Bearer <token>`：单个空格分隔，token 非空且不含空白。
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;

    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return None;
    }

    Some(token.to_string())
}

/// API key 认证中间件 - 必须认证
///
/// 校验成功会顺带把 key 的有效期延长到 now + session.key_ttl_secs。
pub async fn api_key_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(req.headers()).ok_or(AppError::Unauthorized)?;

    let new_expire_time = state.session_service.next_expire_time()?;
    let rows = state
        .api_keys
        .verify_api_key(&token, new_expire_time)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to verify api key");
            AppError::Unauthorized
        })?;

    let auth_context = AuthContext::from_rows(&token, &rows).ok_or(AppError::Unauthorized)?;

    tracing::debug!(
        subject = %auth_context.external_subject_id,
        user_id = auth_context.user_id,
        roles = ?auth_context.roles,
        "Request authenticated"
    );

    // 附加到请求扩展
    req.extensions_mut().insert(auth_context);

    Ok(next.run(req).await)
}

/// 路由组要求的角色（满足任意一个即可）
#[derive(Debug, Clone)]
pub struct RequiredRoles(Arc<Vec<String>>);

impl RequiredRoles {
    pub fn any_of(roles: &[&str]) -> Self {
        Self(Arc::new(roles.iter().map(|r| r.to_string()).collect()))
    }
}

/// 角色校验中间件，需放在认证中间件之后
pub async fn require_roles(
    State(required): State<RequiredRoles>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_context = req
        .extensions()
        .get::<AuthContext>()
        .ok_or(AppError::Unauthorized)?;

    if !auth_context.has_any_role(&required.0) {
        tracing::warn!(
            subject = %auth_context.external_subject_id,
            required = ?required.0,
            "Missing required role"
        );
        return Err(AppError::Forbidden);
    }

    Ok(next.run(req).await)
}
