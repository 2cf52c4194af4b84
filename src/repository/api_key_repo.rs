//! API key repository (会话凭证数据访问)
//!
//! 所有操作直接返回底层 sqlx 错误，不做重试。

use crate::{
    error::Result,
    models::api_key::{ApiKey, NewApiKey},
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Clone)]
pub struct ApiKeyRepository {
    db: PgPool,
}

impl ApiKeyRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// 批量写入凭证及其角色，单个事务内完成
    ///
    /// 任意一行失败（包括 key 重复）都会回滚整个批次。
    pub async fn insert_api_keys(&self, keys: &[NewApiKey]) -> Result<()> {
        let mut tx = self.db.begin().await?;

        for api_key in keys {
            sqlx::query(
                r#"
                INSERT INTO api_keys (
                    key, azure_user_id, user_id, email_address, expire_time, user_profile_pic
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&api_key.key)
            .bind(&api_key.external_subject_id)
            .bind(api_key.user_id)
            .bind(&api_key.email_address)
            .bind(api_key.expire_time)
            .bind(&api_key.profile_picture)
            .execute(&mut *tx)
            .await?;

            for role in &api_key.roles {
                sqlx::query(
                    r#"
                    INSERT INTO api_key_roles (key, role_name)
                    VALUES ($1, $2)
                    ON CONFLICT DO NOTHING
                    "#,
                )
                .bind(&api_key.key)
                .bind(role)
                .execute(&mut *tx)
                .await?;
            }
        }

        // 提前返回时 tx 被 drop，自动回滚
        tx.commit().await?;

        Ok(())
    }

    /// 校验并续期
    ///
    /// 未过期的凭证被延长到 `new_expire_time`（只增不减），随后读回该 key 的
    /// 全部未过期行。key 不存在或已过期时返回空列表。两步在同一事务内执行，
    /// 与并发的过期清理之间由行锁决定先后。
    pub async fn verify_api_key(
        &self,
        key: &str,
        new_expire_time: DateTime<Utc>,
    ) -> Result<Vec<ApiKey>> {
        let mut tx = self.db.begin().await?;

        sqlx::query(
            r#"
            UPDATE api_keys
            SET expire_time = GREATEST(expire_time, $1)
            WHERE key = $2 AND expire_time >= NOW()
            "#,
        )
        .bind(new_expire_time)
        .bind(key)
        .execute(&mut *tx)
        .await?;

        let rows = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT
                k.key,
                k.azure_user_id,
                k.user_id,
                k.email_address,
                r.role_name,
                k.expire_time,
                k.created_time,
                k.user_profile_pic
            FROM api_keys k
            LEFT JOIN api_key_roles r ON r.key = k.key
            WHERE k.key = $1 AND k.expire_time >= NOW()
            ORDER BY r.role_name
            "#,
        )
        .bind(key)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(rows)
    }

    /// 删除凭证（幂等）
    pub async fn delete_api_key(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM api_keys WHERE key = $1")
            .bind(key)
            .execute(&self.db)
            .await?;

        Ok(())
    }

    /// 删除所有已过期的凭证，返回删除数量
    pub async fn delete_expired_api_keys(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM api_keys WHERE expire_time IS NOT NULL AND expire_time < NOW()",
        )
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
