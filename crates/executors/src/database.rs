//! Generic database-ping executor: a TCP connect to the configured
//! host/port, used for Postgres/MySQL/Redis/Mongo monitors where a full
//! protocol handshake is unnecessary for an up/down signal.

use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use uptime_domain::{Monitor, Proxy};

use crate::{Executor, ExecutionResult, down_result, up_result};

#[derive(Debug, Deserialize)]
struct DatabaseConfig {
    host: String,
    port: u16,
    #[serde(default)]
    kind: Option<String>,
}

pub struct DatabaseExecutor;

#[async_trait::async_trait]
impl Executor for DatabaseExecutor {
    fn validate(&self, config: &serde_json::Value) -> Result<(), String> {
        serde_json::from_value::<DatabaseConfig>(config.clone())
            .map(|_| ())
            .map_err(|e| format!("invalid config: {e}"))
    }

    async fn execute(&self, monitor: &Monitor, _proxy: Option<&Proxy>) -> ExecutionResult {
        let start = Utc::now();

        let config: DatabaseConfig = match serde_json::from_value(monitor.config.clone()) {
            Ok(c) => c,
            Err(e) => return down_result(start, format!("invalid database config: {e}")),
        };

        let addr = format!("{}:{}", config.host, config.port);
        let timeout = Duration::from_secs(monitor.timeout_seconds.max(1) as u64);

        match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => up_result(
                start,
                format!("{} reachable at {addr}", config.kind.unwrap_or_else(|| "database".into())),
                None,
            ),
            Ok(Err(e)) => down_result(start, e.to_string()),
            Err(_) => down_result(start, format!("connect to {addr} timed out")),
        }
    }
}
