use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Named priority lanes, highest first (spec.md §4.B), plus the
/// dedicated ingest lane the ingester pool drains on its own (it is not
/// part of the check-worker's strict-priority rotation).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum QueueName {
    Critical,
    Healthcheck,
    Default,
    Low,
    Ingest,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueName::Critical => "critical",
            QueueName::Healthcheck => "healthcheck",
            QueueName::Default => "default",
            QueueName::Low => "low",
            QueueName::Ingest => "ingester",
        }
    }

    /// Strict priority order, highest first — the order workers BRPOP in.
    pub const ALL: [QueueName; 4] = [
        QueueName::Critical,
        QueueName::Healthcheck,
        QueueName::Default,
        QueueName::Low,
    ];
}

/// A queue entry (spec.md §3 Task). `task_id`, when set, is the key used
/// for `EnqueueUnique` dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_type: String,
    pub payload: serde_json::Value,
    pub queue: QueueName,
    pub max_retry: u32,
    pub timeout_seconds: u64,
    pub retention_seconds: u64,
    pub task_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthcheckPayload {
    pub monitor_id: Uuid,
    pub scheduled_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    pub monitor_id: Uuid,
    pub status: crate::heartbeat::HeartbeatStatus,
    pub msg: String,
    pub ping_ms: i32,
    pub start_time: chrono::DateTime<chrono::Utc>,
    pub end_time: chrono::DateTime<chrono::Utc>,
    pub tls_info: Option<TlsInfo>,
    pub check_cert_expiry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsInfo {
    pub issuer: String,
    pub valid_to: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_priority_order() {
        let names: Vec<&str> = QueueName::ALL.iter().map(|q| q.as_str()).collect();
        assert_eq!(names, ["critical", "healthcheck", "default", "low"]);
    }
}
