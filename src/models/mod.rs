//! 数据模型模块

pub mod activity_log;
pub mod api_key;
pub mod auth;
