//! 管理端点

use crate::{error::AppError, middleware::AppState, models::auth::SweepResponse};
use axum::{extract::State, response::IntoResponse, Json};
use std::sync::Arc;

/// 立即执行一次过期 key 清理
pub async fn sweep_expired_keys(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state.sweeper.run_once().await?;

    Ok(Json(SweepResponse { deleted }))
}
