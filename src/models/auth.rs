//! Authentication-related models

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Root login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRootRequest {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub username: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub password: String,
}

/// Login response
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Current identity
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub email_address: String,
    pub username: String,
    pub full_name: String,
    pub department: String,
    pub profile_pic: String,
    pub role: Vec<String>,
}

/// Result of a manual expired-key sweep
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub deleted: u64,
}
