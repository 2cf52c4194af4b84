//! API key (会话凭证) 数据模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 内置管理员的外部主体前缀
pub const ADMIN_SUBJECT_PREFIX: &str = "ADMIN-CONFIG-";

/// 内置管理员的内部用户 ID
pub const ROOT_USER_ID: i64 = 0;

/// 校验查询返回的一行：凭证与其一个角色的连接结果
///
/// 没有角色的会话返回一行 `role_name = None`。
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ApiKey {
    pub key: String,
    #[sqlx(rename = "azure_user_id")]
    pub external_subject_id: String,
    pub user_id: i64,
    pub email_address: Option<String>,
    pub role_name: Option<String>,
    pub expire_time: DateTime<Utc>,
    pub created_time: DateTime<Utc>,
    #[sqlx(rename = "user_profile_pic")]
    pub profile_picture: Option<String>,
}

/// 待签发的凭证，连同该会话的全部角色
#[derive(Debug, Clone)]
pub struct NewApiKey {
    pub key: String,
    pub external_subject_id: String,
    pub user_id: i64,
    pub email_address: Option<String>,
    pub profile_picture: Option<String>,
    pub roles: Vec<String>,
    pub expire_time: DateTime<Utc>,
}
