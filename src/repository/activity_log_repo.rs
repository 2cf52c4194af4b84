//! Activity log repository

use crate::{error::Result, models::activity_log::NewActivityLog};
use sqlx::PgPool;

#[derive(Clone)]
pub struct ActivityLogRepository {
    db: PgPool,
}

impl ActivityLogRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, log: &NewActivityLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO activity_log (
                request_no, service_code, service_name, service_endpoint, http_method,
                request_body, http_status_code, response_body
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(log.request_no)
        .bind(&log.service_code)
        .bind(&log.service_name)
        .bind(&log.service_endpoint)
        .bind(&log.http_method)
        .bind(&log.request_body)
        .bind(log.http_status_code)
        .bind(&log.response_body)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
