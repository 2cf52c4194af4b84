//! Database repository layer

pub mod activity_log_repo;
pub mod api_key_repo;

pub use activity_log_repo::*;
pub use api_key_repo::*;
