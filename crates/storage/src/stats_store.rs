//! Aggregated uptime stats, rolled up into minutely/hourly/daily buckets
//! via upsert-on-conflict, the Postgres-native analogue of a ClickHouse
//! rollup table.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use uptime_common::error::Result;
use uptime_domain::HeartbeatStatus;
use uuid::Uuid;

pub struct StatsStore {
    pool: PgPool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StatsBucket {
    pub monitor_id: Uuid,
    pub bucket_start: DateTime<Utc>,
    pub up_count: i32,
    pub down_count: i32,
    pub avg_ping_ms: f64,
}

enum Granularity {
    Minutely,
    Hourly,
    Daily,
}

impl Granularity {
    fn table(&self) -> &'static str {
        match self {
            Granularity::Minutely => "stats_minutely",
            Granularity::Hourly => "stats_hourly",
            Granularity::Daily => "stats_daily",
        }
    }

    fn bucket_start(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Granularity::Minutely => at - Duration::seconds(at.timestamp() % 60),
            Granularity::Hourly => at - Duration::seconds(at.timestamp() % 3600),
            Granularity::Daily => at - Duration::seconds(at.timestamp() % 86400),
        }
    }
}

impl StatsStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Called once per persisted heartbeat; updates all three bucket
    /// granularities in one pass.
    pub async fn record(
        &self,
        monitor_id: Uuid,
        status: HeartbeatStatus,
        ping_ms: i32,
        at: DateTime<Utc>,
    ) -> Result<()> {
        for granularity in [Granularity::Minutely, Granularity::Hourly, Granularity::Daily] {
            self.upsert_bucket(monitor_id, status, ping_ms, &granularity, at)
                .await?;
        }
        Ok(())
    }

    async fn upsert_bucket(
        &self,
        monitor_id: Uuid,
        status: HeartbeatStatus,
        ping_ms: i32,
        granularity: &Granularity,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let bucket_start = granularity.bucket_start(at);
        let up_increment = if status == HeartbeatStatus::Up { 1 } else { 0 };
        let down_increment = if status == HeartbeatStatus::Down { 1 } else { 0 };

        let query = format!(
            r#"
            INSERT INTO {table} (monitor_id, bucket_start, up_count, down_count, ping_sum_ms, ping_samples)
            VALUES ($1, $2, $3, $4, $5, 1)
            ON CONFLICT (monitor_id, bucket_start) DO UPDATE SET
                up_count = {table}.up_count + EXCLUDED.up_count,
                down_count = {table}.down_count + EXCLUDED.down_count,
                ping_sum_ms = {table}.ping_sum_ms + EXCLUDED.ping_sum_ms,
                ping_samples = {table}.ping_samples + 1
            "#,
            table = granularity.table()
        );

        sqlx::query(&query)
            .bind(monitor_id)
            .bind(bucket_start)
            .bind(up_increment)
            .bind(down_increment)
            .bind(ping_ms as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn hourly_for_monitor(
        &self,
        monitor_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<StatsBucket>> {
        let rows = sqlx::query_as::<_, StatsBucket>(
            r#"
            SELECT monitor_id, bucket_start, up_count, down_count,
                   CASE WHEN ping_samples > 0 THEN ping_sum_ms::float8 / ping_samples ELSE 0 END AS avg_ping_ms
            FROM stats_hourly
            WHERE monitor_id = $1 AND bucket_start >= $2
            ORDER BY bucket_start ASC
            "#,
        )
        .bind(monitor_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutely_bucket_alignment() {
        let at = DateTime::parse_from_rfc3339("2026-07-27T10:15:42Z")
            .unwrap()
            .with_timezone(&Utc);
        let bucket = Granularity::Minutely.bucket_start(at);
        assert_eq!(bucket.timestamp() % 60, 0);
        assert!(bucket <= at);
    }

    #[test]
    fn test_hourly_bucket_alignment() {
        let at = DateTime::parse_from_rfc3339("2026-07-27T10:15:42Z")
            .unwrap()
            .with_timezone(&Utc);
        let bucket = Granularity::Hourly.bucket_start(at);
        assert_eq!(bucket.timestamp() % 3600, 0);
    }
}
