//! Authentication and authorization module

pub mod api_key;
pub mod middleware;
pub mod password;

pub use api_key::ApiKeyGenerator;
pub use middleware::{
    api_key_auth_middleware, extract_bearer_token, require_roles, AuthContext, RequiredRoles,
};
pub use password::{AdminCredentials, PasswordHasher};
