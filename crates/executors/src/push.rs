//! Push monitors never run an active probe — external agents report their
//! own heartbeats through the push endpoint (spec.md §4.G). This executor
//! exists only so the registry is total over every `monitor_type`; the
//! scheduler should never actually enqueue a check task for one (callers
//! may assert on that), but if it ever did, this is a safe no-op.

use chrono::Utc;
use uptime_domain::{Monitor, Proxy};

use crate::{Executor, ExecutionResult, down_result};

pub struct PushExecutor;

#[async_trait::async_trait]
impl Executor for PushExecutor {
    fn validate(&self, _config: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, _monitor: &Monitor, _proxy: Option<&Proxy>) -> ExecutionResult {
        down_result(
            Utc::now(),
            "push monitors are reported externally and are never actively checked",
        )
    }
}
