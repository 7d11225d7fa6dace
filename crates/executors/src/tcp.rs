//! TCP connect-and-close probe.

use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::TcpStream;
use uptime_domain::{Monitor, Proxy};

use crate::{Executor, ExecutionResult, down_result, up_result};

#[derive(Debug, Deserialize)]
struct TcpConfig {
    host: String,
    port: u16,
}

pub struct TcpExecutor;

#[async_trait::async_trait]
impl Executor for TcpExecutor {
    fn validate(&self, config: &serde_json::Value) -> Result<(), String> {
        serde_json::from_value::<TcpConfig>(config.clone())
            .map(|_| ())
            .map_err(|e| format!("invalid config: {e}"))
    }

    async fn execute(&self, monitor: &Monitor, _proxy: Option<&Proxy>) -> ExecutionResult {
        let start = Utc::now();

        let config: TcpConfig = match serde_json::from_value(monitor.config.clone()) {
            Ok(c) => c,
            Err(e) => return down_result(start, format!("invalid tcp config: {e}")),
        };

        let addr = format!("{}:{}", config.host, config.port);
        let timeout = Duration::from_secs(monitor.timeout_seconds.max(1) as u64);

        match tokio::time::timeout(timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => up_result(start, format!("connected to {addr}"), None),
            Ok(Err(e)) => down_result(start, e.to_string()),
            Err(_) => down_result(start, format!("connect to {addr} timed out")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_requires_host_and_port() {
        let executor = TcpExecutor;
        assert!(executor.validate(&json!({"host": "localhost"})).is_err());
        assert!(
            executor
                .validate(&json!({"host": "localhost", "port": 80}))
                .is_ok()
        );
    }
}
