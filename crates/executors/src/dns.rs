//! DNS resolution probe. Uses tokio's own resolver (`lookup_host`) rather
//! than pulling in a dedicated DNS crate — sufficient for an up/down
//! resolvability check and keeps this executor dependency-free.

use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use tokio::net::lookup_host;
use uptime_domain::{Monitor, Proxy};

use crate::{Executor, ExecutionResult, down_result, up_result};

#[derive(Debug, Deserialize)]
struct DnsConfig {
    hostname: String,
}

pub struct DnsExecutor;

#[async_trait::async_trait]
impl Executor for DnsExecutor {
    fn validate(&self, config: &serde_json::Value) -> Result<(), String> {
        serde_json::from_value::<DnsConfig>(config.clone())
            .map(|_| ())
            .map_err(|e| format!("invalid config: {e}"))
    }

    async fn execute(&self, monitor: &Monitor, _proxy: Option<&Proxy>) -> ExecutionResult {
        let start = Utc::now();

        let config: DnsConfig = match serde_json::from_value(monitor.config.clone()) {
            Ok(c) => c,
            Err(e) => return down_result(start, format!("invalid dns config: {e}")),
        };

        let timeout = Duration::from_secs(monitor.timeout_seconds.max(1) as u64);
        let target = format!("{}:0", config.hostname);

        match tokio::time::timeout(timeout, lookup_host(&target)).await {
            Ok(Ok(mut addrs)) => match addrs.next() {
                Some(addr) => up_result(start, format!("resolved to {}", addr.ip()), None),
                None => down_result(start, "no addresses returned"),
            },
            Ok(Err(e)) => down_result(start, e.to_string()),
            Err(_) => down_result(start, format!("resolution of {} timed out", config.hostname)),
        }
    }
}
