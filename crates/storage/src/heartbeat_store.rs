//! Heartbeat persistence. The ingester is the only writer (spec.md §5).
//!
//! `with_monitor_lock` serializes the read-transition-write critical
//! section per monitor using `pg_advisory_xact_lock`, scoped to the
//! transaction — this is what guarantees heartbeats for one monitor are
//! written in non-decreasing `time` order even across multiple ingester
//! replicas (spec.md §4.F invariants), which an in-process mutex could
//! not do.

use sqlx::{PgPool, Postgres, Transaction};
use uptime_common::error::Result;
use uptime_domain::Heartbeat;
use uuid::Uuid;

pub struct HeartbeatStore {
    pool: PgPool,
}

impl HeartbeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a transaction, takes the per-monitor advisory lock, runs
    /// `f`, then commits. `f` receives the open transaction so it can
    /// read the previous heartbeat and insert the new one atomically.
    pub async fn with_monitor_lock<F, Fut, T>(&self, monitor_id: Uuid, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_, Postgres>) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(monitor_id.to_string())
            .execute(&mut *tx)
            .await?;

        let result = f(&mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    pub async fn latest_for_monitor(
        tx: &mut Transaction<'_, Postgres>,
        monitor_id: Uuid,
    ) -> Result<Option<Heartbeat>> {
        let heartbeat = sqlx::query_as::<_, Heartbeat>(
            "SELECT * FROM heartbeats WHERE monitor_id = $1 ORDER BY time DESC LIMIT 1",
        )
        .bind(monitor_id)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(heartbeat)
    }

    pub async fn insert(tx: &mut Transaction<'_, Postgres>, heartbeat: &Heartbeat) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO heartbeats (
                id, monitor_id, status, msg, ping_ms, time, end_time,
                duration_ms, retries, down_count, important, notified
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(heartbeat.id)
        .bind(heartbeat.monitor_id)
        .bind(heartbeat.status)
        .bind(&heartbeat.msg)
        .bind(heartbeat.ping_ms)
        .bind(heartbeat.time)
        .bind(heartbeat.end_time)
        .bind(heartbeat.duration_ms)
        .bind(heartbeat.retries)
        .bind(heartbeat.down_count)
        .bind(heartbeat.important)
        .bind(heartbeat.notified)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn recent_for_monitor(&self, monitor_id: Uuid, limit: i64) -> Result<Vec<Heartbeat>> {
        let heartbeats = sqlx::query_as::<_, Heartbeat>(
            "SELECT * FROM heartbeats WHERE monitor_id = $1 ORDER BY time DESC LIMIT $2",
        )
        .bind(monitor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(heartbeats)
    }

    /// Whether `monitor_id` is inside an active maintenance window
    /// (spec.md §9 — maintenance suppression, checked between steps 1 and
    /// 2 of the ingester's beat rules).
    pub async fn is_under_maintenance(&self, monitor_id: Uuid) -> Result<bool> {
        let active: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM maintenance_windows
            WHERE monitor_id = $1 AND starts_at <= now() AND ends_at > now()
            LIMIT 1
            "#,
        )
        .bind(monitor_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(active.is_some())
    }
}
