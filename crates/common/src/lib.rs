//! Shared infrastructure used by every service in the uptime pipeline:
//! Postgres pooling, a Redis client wrapper, error types, HMAC signing and
//! tracing setup.

pub mod db;
pub mod error;
pub mod logging;
pub mod redis_client;
pub mod signing;

pub use db::{create_pool, run_migrations};
pub use error::{Error, Result};
pub use logging::{init_tracing, init_tracing_json};
pub use redis_client::RedisClient;
pub use signing::{sign_hmac, verify_hmac};
