//! API key 会话服务
//! 内置管理员登录、bearer key 认证与续期、过期 key 清理

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod routes;
pub mod secrets;
pub mod services;
pub mod sweeper;
pub mod telemetry;
pub mod validation;
