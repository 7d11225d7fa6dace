//! Executor registry: maps a monitor's type tag to a probe implementation
//! (spec.md §4.C). Registered once at startup into an immutable map —
//! constructor-based wiring, no runtime mutation (spec.md §9).

pub mod database;
pub mod dns;
pub mod http;
pub mod push;
pub mod tcp;
pub mod tls;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uptime_domain::{HeartbeatStatus, Monitor, Proxy, TlsInfo};

/// Result of a single probe. An executor must never raise — network
/// failures translate into `status: Down` with the error as `message`
/// (spec.md §4.E, §7).
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub status: HeartbeatStatus,
    pub message: String,
    pub ping_ms: i32,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub tls_info: Option<TlsInfo>,
}

#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Checked once, at monitor create/update time by the API layer —
    /// not on every tick.
    fn validate(&self, config: &serde_json::Value) -> Result<(), String>;

    /// Runs the probe. Implementations are responsible for honouring
    /// `monitor.timeout_seconds` themselves (typically via
    /// `tokio::time::timeout`), since the registry has no generic way to
    /// cancel an arbitrary future mid-probe without losing its result.
    async fn execute(&self, monitor: &Monitor, proxy: Option<&Proxy>) -> ExecutionResult;
}

pub struct ExecutorRegistry {
    executors: HashMap<&'static str, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Registers the built-in executors. Additional types can be plugged
    /// in by constructing the map directly and calling `from_map`.
    pub fn with_defaults() -> Self {
        let mut executors: HashMap<&'static str, Arc<dyn Executor>> = HashMap::new();
        executors.insert("http", Arc::new(http::HttpExecutor::new()));
        executors.insert("tcp", Arc::new(tcp::TcpExecutor));
        executors.insert("dns", Arc::new(dns::DnsExecutor));
        executors.insert("push", Arc::new(push::PushExecutor));
        executors.insert("database", Arc::new(database::DatabaseExecutor));
        Self { executors }
    }

    pub fn from_map(executors: HashMap<&'static str, Arc<dyn Executor>>) -> Self {
        Self { executors }
    }

    pub fn get(&self, monitor_type: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(monitor_type).cloned()
    }
}

/// Shared helper so every executor produces a `Down` result the same way,
/// rather than hand-rolling the translation at each call site.
pub(crate) fn down_result(start: DateTime<Utc>, message: impl Into<String>) -> ExecutionResult {
    ExecutionResult {
        status: HeartbeatStatus::Down,
        message: message.into(),
        ping_ms: 0,
        start_time: start,
        end_time: Utc::now(),
        tls_info: None,
    }
}

pub(crate) fn up_result(
    start: DateTime<Utc>,
    message: impl Into<String>,
    tls_info: Option<TlsInfo>,
) -> ExecutionResult {
    let end_time = Utc::now();
    let ping_ms = (end_time - start).num_milliseconds().max(0) as i32;
    ExecutionResult {
        status: HeartbeatStatus::Up,
        message: message.into(),
        ping_ms,
        start_time: start,
        end_time,
        tls_info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_builtins() {
        let registry = ExecutorRegistry::with_defaults();
        assert!(registry.get("http").is_some());
        assert!(registry.get("tcp").is_some());
        assert!(registry.get("dns").is_some());
        assert!(registry.get("push").is_some());
        assert!(registry.get("database").is_some());
    }

    #[test]
    fn test_registry_missing_type_is_none() {
        let registry = ExecutorRegistry::with_defaults();
        assert!(registry.get("mongodb").is_none());
    }
}
