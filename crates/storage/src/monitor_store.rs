//! Monitor persistence. Only the REST API writes monitors (spec.md §5);
//! this store is read-mostly from the scheduler/check-worker side.

use sqlx::PgPool;
use tracing::info;
use uptime_common::error::Result;
use uptime_domain::Monitor;
use uuid::Uuid;

pub struct MonitorStore {
    pool: PgPool,
}

impl MonitorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Monitor>> {
        let monitor = sqlx::query_as::<_, Monitor>("SELECT * FROM monitors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(monitor)
    }

    pub async fn list_active(&self) -> Result<Vec<Monitor>> {
        let monitors =
            sqlx::query_as::<_, Monitor>("SELECT * FROM monitors WHERE active = true")
                .fetch_all(&self.pool)
                .await?;
        Ok(monitors)
    }

    pub async fn insert(&self, monitor: &Monitor) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO monitors (
                id, monitor_type, name, interval_seconds, timeout_seconds,
                max_retries, retry_interval_seconds, resend_interval, active,
                config, proxy_id, push_token, check_cert_expiry, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(monitor.id)
        .bind(&monitor.monitor_type)
        .bind(&monitor.name)
        .bind(monitor.interval_seconds)
        .bind(monitor.timeout_seconds)
        .bind(monitor.max_retries)
        .bind(monitor.retry_interval_seconds)
        .bind(monitor.resend_interval)
        .bind(monitor.active)
        .bind(&monitor.config)
        .bind(monitor.proxy_id)
        .bind(&monitor.push_token)
        .bind(monitor.check_cert_expiry)
        .bind(monitor.created_at)
        .bind(monitor.updated_at)
        .execute(&self.pool)
        .await?;

        info!(monitor_id = %monitor.id, "monitor inserted");
        Ok(())
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<()> {
        sqlx::query("UPDATE monitors SET active = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM monitors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_by_push_token(&self, token: &str) -> Result<Option<Monitor>> {
        let monitor =
            sqlx::query_as::<_, Monitor>("SELECT * FROM monitors WHERE push_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?;
        Ok(monitor)
    }
}
