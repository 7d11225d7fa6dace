//! PostgreSQL connection pool management.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;

pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!(
        "creating database pool with max_connections={}",
        max_connections
    );

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("database pool created");
    health_check(&pool).await?;

    Ok(pool)
}

/// Applies the schema in `migrations/`, tolerating the case where another
/// service instance already applied it concurrently at startup.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    match sqlx::migrate!("../../migrations").run(pool).await {
        Ok(_) => info!("database migrations completed"),
        Err(sqlx::migrate::MigrateError::VersionMissing(_)) => {
            info!("database migrations already applied, skipping");
        }
        Err(e) => {
            if !e.to_string().contains("already exists") {
                return Err(crate::error::Error::Database(sqlx::Error::Migrate(Box::new(e))));
            }
            info!("database migrations already applied, skipping");
        }
    }
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> Result<()> {
    let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(pool).await?;

    if row.0 == 1 {
        Ok(())
    } else {
        warn!("database health check returned unexpected value");
        Err(crate::error::Error::Database(sqlx::Error::Protocol(
            "health check failed".into(),
        )))
    }
}

/// Returns (pool size, idle connections).
pub fn pool_stats(pool: &PgPool) -> (u32, usize) {
    (pool.size(), pool.num_idle())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pool_creation() {
        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            let result = create_pool(&database_url, 5).await;
            assert!(result.is_ok(), "failed to create pool: {:?}", result.err());

            let pool = result.unwrap();
            let (size, idle) = pool_stats(&pool);
            assert!(size > 0);
            assert!(idle <= size as usize);
        } else {
            println!("skipping test: DATABASE_URL not set");
        }
    }

    #[tokio::test]
    async fn test_health_check() {
        if let Ok(database_url) = std::env::var("DATABASE_URL") {
            let pool = create_pool(&database_url, 5).await.unwrap();
            assert!(health_check(&pool).await.is_ok());
        }
    }
}
