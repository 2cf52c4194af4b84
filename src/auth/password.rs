//! Password hashing and admin credential verification using Argon2id

use crate::{config::AdminConfig, error::AppError};
use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2,
};
use secrecy::{ExposeSecret, Secret};

/// Password hasher (Argon2id, v19, default parameters)
pub struct PasswordHasher {
    argon2: Argon2<'static>,
}

impl PasswordHasher {
    pub fn new() -> Self {
        Self {
            argon2: Argon2::default(),
        }
    }

    /// Hash a password
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                tracing::error!("Failed to hash password: {:?}", e);
                AppError::internal_error("Failed to hash password")
            })?
            .to_string();

        Ok(password_hash)
    }

    /// Verify a password against a PHC hash
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), AppError> {
        let parsed_hash = PasswordHash::new(hash).map_err(|e| {
            tracing::error!("Failed to parse password hash: {:?}", e);
            AppError::internal_error("Failed to parse password hash")
        })?;

        self.argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AppError::InvalidCredentials)
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// 内置管理员凭证
///
/// 只保存密码哈希；配置里给的是明文引导密码时，启动时哈希一次。
pub struct AdminCredentials {
    username: String,
    password_hash: Secret<String>,
    hasher: PasswordHasher,
}

impl AdminCredentials {
    pub fn from_config(admin: &AdminConfig) -> Result<Self, AppError> {
        let hasher = PasswordHasher::new();

        let password_hash = match (&admin.password_hash, &admin.password) {
            (Some(hash), _) if !hash.expose_secret().is_empty() => {
                // 提前发现格式错误的哈希
                PasswordHash::new(hash.expose_secret()).map_err(|e| {
                    AppError::Config(format!("admin.password_hash is not a valid PHC string: {}", e))
                })?;
                hash.expose_secret().clone()
            }
            (_, Some(password)) if !password.expose_secret().is_empty() => {
                hasher.hash(password.expose_secret())?
            }
            _ => {
                return Err(AppError::Config(
                    "admin.password or admin.password_hash must be set".to_string(),
                ))
            }
        };

        Ok(Self {
            username: admin.username.clone(),
            password_hash: Secret::new(password_hash),
            hasher,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// 用户名与密码同时匹配才通过
    ///
    /// 用户名不匹配时仍执行一次哈希校验，响应时间不暴露用户名是否正确。
    pub fn verify(&self, username: &str, password: &str) -> Result<(), AppError> {
        let password_result = self
            .hasher
            .verify(password, self.password_hash.expose_secret());

        if username != self.username {
            return Err(AppError::InvalidCredentials);
        }

        password_result
    }
}
