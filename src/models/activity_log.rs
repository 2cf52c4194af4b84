//! 活动日志模型（只追加）

use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewActivityLog {
    pub request_no: Uuid,
    pub service_code: String,
    pub service_name: String,
    pub service_endpoint: String,
    pub http_method: String,
    pub request_body: Option<String>,
    pub http_status_code: i32,
    pub response_body: Option<String>,
}
