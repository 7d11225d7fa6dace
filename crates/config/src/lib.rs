//! Configuration loading for every uptime service: one typed `Config`
//! struct assembled from environment variables, following the same
//! per-section `load_*` idiom across all binaries.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
    pub scheduler: SchedulerConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
    pub ingester: IngesterConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Worker-pool and queue-concurrency tunables shared by the check worker
/// and the queue library.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// Max in-flight checks per worker process.
    pub concurrency: usize,
    /// Per-task execution deadline, applied if a monitor doesn't set one.
    pub default_timeout_seconds: u64,
    /// Default `EnqueueUnique` dedup window.
    pub unique_window_seconds: u64,
}

/// Leader election and claim/reclaim cadence for the scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub leader_ttl_seconds: u64,
    pub leader_renewal_interval_seconds: u64,
    pub claim_tick_interval_ms: u64,
    pub reclaim_interval_seconds: u64,
    pub lease_ttl_seconds: u64,
    pub batch_claim_size: usize,
    pub max_jitter_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    pub rust_log: String,
    pub metrics_port: u16,
}

/// Ingester-specific tunables.
#[derive(Debug, Clone, Deserialize)]
pub struct IngesterConfig {
    /// Emit `CertificateExpiry` once a monitor's cert has this many days
    /// or fewer left before `not_after`.
    pub cert_expiry_warning_days: i64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            redis: Self::load_redis()?,
            database: Self::load_database()?,
            queue: Self::load_queue()?,
            scheduler: Self::load_scheduler()?,
            api: Self::load_api()?,
            observability: Self::load_observability()?,
            ingester: Self::load_ingester()?,
        })
    }

    fn load_redis() -> Result<RedisConfig> {
        Ok(RedisConfig {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
            pool_size: env::var("REDIS_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
        })
    }

    fn load_database() -> Result<DatabaseConfig> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        })
    }

    fn load_queue() -> Result<QueueConfig> {
        Ok(QueueConfig {
            concurrency: env::var("QUEUE_CONCURRENCY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(128),
            default_timeout_seconds: env::var("CHECK_DEFAULT_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            unique_window_seconds: env::var("QUEUE_UNIQUE_WINDOW_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        })
    }

    fn load_scheduler() -> Result<SchedulerConfig> {
        Ok(SchedulerConfig {
            leader_ttl_seconds: env::var("SCHEDULER_LEADER_TTL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(15),
            leader_renewal_interval_seconds: env::var("SCHEDULER_LEADER_RENEWAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            claim_tick_interval_ms: env::var("SCHEDULER_CLAIM_TICK_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(500),
            reclaim_interval_seconds: env::var("SCHEDULER_RECLAIM_INTERVAL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            lease_ttl_seconds: env::var("SCHEDULER_LEASE_TTL_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            batch_claim_size: env::var("SCHEDULER_BATCH_CLAIM_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(100),
            max_jitter_seconds: env::var("SCHEDULER_MAX_JITTER_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        })
    }

    fn load_api() -> Result<ApiConfig> {
        Ok(ApiConfig {
            host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8080),
        })
    }

    fn load_observability() -> Result<ObservabilityConfig> {
        Ok(ObservabilityConfig {
            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "info,uptime=debug".to_string()),
            metrics_port: env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(9090),
        })
    }

    fn load_ingester() -> Result<IngesterConfig> {
        Ok(IngesterConfig {
            cert_expiry_warning_days: env::var("CERT_EXPIRY_WARNING_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(14),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        unsafe {
            env::set_var("PUSH_TOKEN_SECRET", "short");
            env::set_var("DATABASE_URL", "postgresql://localhost/test");
            env::set_var("REDIS_URL", "redis://localhost");
        }

        let result = Config::load();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("16 characters")
        );
    }
}
