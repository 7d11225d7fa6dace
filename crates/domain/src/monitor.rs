use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A user-defined probe definition. `config` is an opaque JSON blob whose
/// shape is interpreted only by the executor named by `monitor_type`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Monitor {
    pub id: Uuid,
    pub monitor_type: String,
    pub name: String,
    pub interval_seconds: i32,
    pub timeout_seconds: i32,
    pub max_retries: i32,
    pub retry_interval_seconds: i32,
    pub resend_interval: i32,
    pub active: bool,
    pub config: serde_json::Value,
    pub proxy_id: Option<Uuid>,
    pub push_token: Option<String>,
    pub check_cert_expiry: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// `interval ≥ 1`, `timeout ≤ interval`, `max_retries ≥ 0` (spec.md §3).
    pub fn validate_invariants(&self) -> Result<(), String> {
        if self.interval_seconds < 1 {
            return Err("interval_seconds must be >= 1".to_string());
        }
        if self.timeout_seconds > self.interval_seconds {
            return Err("timeout_seconds must be <= interval_seconds".to_string());
        }
        if self.max_retries < 0 {
            return Err("max_retries must be >= 0".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Validate, Deserialize)]
pub struct CreateMonitorRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: String,

    #[validate(length(min = 1, max = 64))]
    pub monitor_type: String,

    #[validate(range(min = 1))]
    pub interval_seconds: i32,

    #[validate(range(min = 1))]
    pub timeout_seconds: i32,

    #[validate(range(min = 0, max = 10))]
    pub max_retries: i32,

    #[validate(range(min = 0))]
    pub retry_interval_seconds: i32,

    #[validate(range(min = 0))]
    pub resend_interval: i32,

    pub config: serde_json::Value,
    pub proxy_id: Option<Uuid>,
}

#[derive(Debug, Validate, Deserialize)]
pub struct UpdateMonitorRequest {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,

    #[validate(range(min = 1))]
    pub interval_seconds: Option<i32>,

    pub active: Option<bool>,
    pub config: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_monitor() -> Monitor {
        Monitor {
            id: Uuid::new_v4(),
            monitor_type: "http".to_string(),
            name: "example".to_string(),
            interval_seconds: 60,
            timeout_seconds: 10,
            max_retries: 2,
            retry_interval_seconds: 5,
            resend_interval: 0,
            active: true,
            config: serde_json::json!({"url": "https://example.com"}),
            proxy_id: None,
            push_token: None,
            check_cert_expiry: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_timeout_must_not_exceed_interval() {
        let mut m = base_monitor();
        m.timeout_seconds = 120;
        assert!(m.validate_invariants().is_err());
    }

    #[test]
    fn test_valid_monitor_passes() {
        assert!(base_monitor().validate_invariants().is_ok());
    }
}
