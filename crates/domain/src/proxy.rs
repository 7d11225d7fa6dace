use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An outbound proxy a monitor may route its check through, referenced by
/// `Monitor.proxy_id` and resolved by the check worker before execution.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Proxy {
    pub id: Uuid,
    pub host: String,
    pub port: i32,
    pub auth_user: Option<String>,
    pub auth_pass: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Proxy {
    pub fn url(&self) -> String {
        match (&self.auth_user, &self.auth_pass) {
            (Some(user), Some(pass)) => {
                format!("http://{}:{}@{}:{}", user, pass, self.host, self.port)
            }
            _ => format!("http://{}:{}", self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_without_auth() {
        let proxy = Proxy {
            id: Uuid::new_v4(),
            host: "proxy.local".to_string(),
            port: 8080,
            auth_user: None,
            auth_pass: None,
            active: true,
            created_at: Utc::now(),
        };
        assert_eq!(proxy.url(), "http://proxy.local:8080");
    }
}
