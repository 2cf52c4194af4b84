//! 会话服务：root 登录、登出、当前身份

use crate::{
    auth::{api_key::ApiKeyGenerator, middleware::AuthContext, password::AdminCredentials},
    config::{AdminConfig, AppConfig},
    error::{AppError, Result},
    models::{
        api_key::{NewApiKey, ADMIN_SUBJECT_PREFIX, ROOT_USER_ID},
        auth::{LoginResponse, LoginRootRequest, MeResponse},
    },
    repository::ApiKeyRepository,
    validation::InputValidator,
};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct SessionService {
    api_keys: ApiKeyRepository,
    admin: Arc<AdminCredentials>,
    admin_profile: AdminConfig,
    key_ttl: Duration,
}

impl SessionService {
    pub fn new(
        api_keys: ApiKeyRepository,
        admin: AdminCredentials,
        config: &AppConfig,
    ) -> Result<Self> {
        let key_ttl = i64::try_from(config.session.key_ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "session.key_ttl_secs out of range: {}",
                    config.session.key_ttl_secs
                ))
            })?;

        Ok(Self {
            api_keys,
            admin: Arc::new(admin),
            admin_profile: config.admin.clone(),
            key_ttl,
        })
    }

    /// 认证成功后 key 的新过期时间
    pub fn next_expire_time(&self) -> Result<DateTime<Utc>> {
        Utc::now()
            .checked_add_signed(self.key_ttl)
            .ok_or_else(|| AppError::internal_error("api key expire time overflowed"))
    }

    /// 内置管理员登录，成功后签发新的 API key
    pub async fn login_root(
        &self,
        validator: &InputValidator,
        req: LoginRootRequest,
    ) -> Result<LoginResponse> {
        validator.validate(&req)?;

        // Argon2 校验是 CPU 密集操作，放到阻塞线程池
        let admin = self.admin.clone();
        let LoginRootRequest { username, password } = req;
        let attempted = username.clone();
        tokio::task::spawn_blocking(move || admin.verify(&username, &password))
            .await
            .map_err(|e| AppError::Internal(format!("Credential check task failed: {}", e)))?
            .map_err(|e| {
                tracing::warn!(username = %attempted, "Root login rejected");
                e
            })?;

        let token = ApiKeyGenerator::generate();
        let api_key = NewApiKey {
            key: token.clone(),
            external_subject_id: format!("{}{}", ADMIN_SUBJECT_PREFIX, self.admin.username()),
            user_id: ROOT_USER_ID,
            email_address: Some(self.admin_profile.email.clone()),
            profile_picture: None,
            roles: self.admin_profile.roles.clone(),
            expire_time: self.next_expire_time()?,
        };

        self.api_keys.insert_api_keys(&[api_key]).await?;

        tracing::info!(
            username = %attempted,
            roles = ?self.admin_profile.roles,
            "Root login succeeded"
        );

        Ok(LoginResponse { token })
    }

    /// 登出：删除 key，不要求 key 仍然有效
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.api_keys.delete_api_key(token).await?;

        tracing::info!("Api key revoked");
        Ok(())
    }

    /// 当前身份，只读取认证中间件附加的上下文
    pub fn get_me(&self, auth_context: &AuthContext) -> MeResponse {
        let (username, full_name, department) = if auth_context.user_id == ROOT_USER_ID {
            let name = self.admin_profile.display_name.clone();
            (name.clone(), name.clone(), name)
        } else {
            (auth_context.email_address.clone(), String::new(), String::new())
        };

        MeResponse {
            email_address: auth_context.email_address.clone(),
            username,
            full_name,
            department,
            profile_pic: auth_context.profile_picture.clone(),
            role: auth_context.roles.clone(),
        }
    }
}
