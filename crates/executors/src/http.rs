//! HTTP(S) executor. Request/response handling and error-to-`Down`
//! translation are grounded on the webhook delivery worker's
//! `WebhookDelivery::deliver` — same `reqwest::Client`-per-executor shape,
//! same classification of timeouts/connect errors as transient.

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use uptime_domain::{Monitor, Proxy};

use crate::{Executor, ExecutionResult, down_result, up_result};

#[derive(Debug, Deserialize)]
struct HttpConfig {
    url: String,
    #[serde(default)]
    expected_status_max: Option<u16>,
}

pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .build()
                .expect("reqwest client construction cannot fail with default config"),
        }
    }
}

impl Default for HttpExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Executor for HttpExecutor {
    fn validate(&self, config: &serde_json::Value) -> Result<(), String> {
        let parsed: HttpConfig =
            serde_json::from_value(config.clone()).map_err(|e| format!("invalid config: {e}"))?;

        url::validate(&parsed.url)
    }

    async fn execute(&self, monitor: &Monitor, proxy: Option<&Proxy>) -> ExecutionResult {
        let start = Utc::now();

        let config: HttpConfig = match serde_json::from_value(monitor.config.clone()) {
            Ok(c) => c,
            Err(e) => return down_result(start, format!("invalid http config: {e}")),
        };

        let timeout = Duration::from_secs(monitor.timeout_seconds.max(1) as u64);

        let request = if let Some(proxy) = proxy {
            let proxied_client = match reqwest::Proxy::all(proxy.url())
                .and_then(|p| Client::builder().proxy(p).timeout(timeout).build())
            {
                Ok(c) => c,
                Err(e) => return down_result(start, format!("invalid proxy: {e}")),
            };
            proxied_client.get(&config.url)
        } else {
            self.client.get(&config.url).timeout(timeout)
        };

        debug!(url = %config.url, monitor_id = %monitor.id, "running http check");

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                let max_ok = config.expected_status_max.unwrap_or(399);

                if status.as_u16() <= max_ok {
                    let tls_info = if monitor.check_cert_expiry {
                        fetch_tls_info(&config.url).await
                    } else {
                        None
                    };
                    up_result(start, format!("HTTP {status}"), tls_info)
                } else {
                    warn!(monitor_id = %monitor.id, status = %status, "http check returned unhealthy status");
                    down_result(start, format!("HTTP {status}"))
                }
            }
            Err(e) => down_result(start, e.to_string()),
        }
    }
}

/// Best-effort: a failed handshake just means no TLS info is attached,
/// it never turns an otherwise-healthy check into a failure.
async fn fetch_tls_info(url: &str) -> Option<uptime_domain::TlsInfo> {
    let parsed = reqwest::Url::parse(url).ok()?;
    if parsed.scheme() != "https" {
        return None;
    }
    let host = parsed.host_str()?.to_string();
    let port = parsed.port_or_known_default().unwrap_or(443);

    match crate::tls::fetch_leaf_cert_info(&host, port).await {
        Ok(info) => Some(info),
        Err(e) => {
            warn!(host, error = %e, "failed to fetch tls certificate info");
            None
        }
    }
}

mod url {
    pub fn validate(url: &str) -> Result<(), String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            Ok(())
        } else {
            Err("url must start with http:// or https://".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn monitor_with(url: &str) -> Monitor {
        Monitor {
            id: Uuid::new_v4(),
            monitor_type: "http".to_string(),
            name: "test".to_string(),
            interval_seconds: 60,
            timeout_seconds: 5,
            max_retries: 0,
            retry_interval_seconds: 0,
            resend_interval: 0,
            active: true,
            config: json!({"url": url}),
            proxy_id: None,
            push_token: None,
            check_cert_expiry: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_healthy_endpoint_reports_up() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("GET", "/").with_status(200).create_async().await;

        let executor = HttpExecutor::new();
        let monitor = monitor_with(&server.url());
        let result = executor.execute(&monitor, None).await;

        mock.assert_async().await;
        assert_eq!(result.status, uptime_domain::HeartbeatStatus::Up);
    }

    #[tokio::test]
    async fn test_5xx_reports_down() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(503)
            .create_async()
            .await;

        let executor = HttpExecutor::new();
        let monitor = monitor_with(&server.url());
        let result = executor.execute(&monitor, None).await;

        mock.assert_async().await;
        assert_eq!(result.status, uptime_domain::HeartbeatStatus::Down);
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let executor = HttpExecutor::new();
        assert!(executor.validate(&json!({"url": "ftp://example.com"})).is_err());
        assert!(executor.validate(&json!({"url": "https://example.com"})).is_ok());
    }
}
