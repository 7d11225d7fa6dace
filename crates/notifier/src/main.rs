//! Notification dispatcher (spec.md §9 design note: "services never talk
//! directly to each other for reactive flows, the bus is the only cycle
//! breaker"). Subscribes to the two event types a human should learn
//! about — `ImportantHeartbeat` and `CertificateExpiry` — and hands each
//! to every registered `NotificationChannel`.
//!
//! The dispatch framework is in scope; external providers (SMTP, Slack,
//! Telegram) are not, so the only built-in channel logs.

use async_trait::async_trait;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};
use uptime_config::Config;
use uptime_domain::{Event, HeartbeatEventPayload, CertificateExpiryPayload};
use uptime_event_bus::EventBus;

#[async_trait]
trait NotificationChannel: Send + Sync {
    async fn notify_important_heartbeat(&self, payload: &HeartbeatEventPayload);
    async fn notify_certificate_expiry(&self, payload: &CertificateExpiryPayload);
}

struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn notify_important_heartbeat(&self, payload: &HeartbeatEventPayload) {
        warn!(
            monitor_id = %payload.monitor_id,
            status = ?payload.heartbeat.status,
            msg = %payload.heartbeat.msg,
            "important heartbeat"
        );
    }

    async fn notify_certificate_expiry(&self, payload: &CertificateExpiryPayload) {
        warn!(
            monitor_id = %payload.monitor_id,
            days_remaining = payload.days_remaining,
            valid_to = %payload.valid_to,
            "certificate nearing expiry"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uptime_common::init_tracing();
    info!("starting notifier");

    let config = Config::load()?;

    let health_port = std::env::var("NOTIFIER_HEALTH_PORT").unwrap_or_else(|_| "8080".to_string());
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port).await {
            tracing::error!("health server failed: {}", e);
        }
    });

    let channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
    let bus = EventBus::new(&config.redis.url).await?;
    subscribe(&bus, channels);

    info!("notifier ready");
    tokio::signal::ctrl_c().await?;
    info!("received ctrl+c, shutting down");

    Ok(())
}

fn subscribe(bus: &EventBus, channels: Vec<Arc<dyn NotificationChannel>>) {
    let important = channels.clone();
    bus.subscribe(
        "events:ImportantHeartbeat",
        Arc::new(move |event: Event| {
            let channels = important.clone();
            Box::pin(async move {
                if let Event::ImportantHeartbeat(payload) = event {
                    for channel in &channels {
                        channel.notify_important_heartbeat(&payload).await;
                    }
                }
            })
        }),
    );

    let cert = channels.clone();
    bus.subscribe(
        "events:CertificateExpiry",
        Arc::new(move |event: Event| {
            let channels = cert.clone();
            Box::pin(async move {
                if let Event::CertificateExpiry(payload) = event {
                    for channel in &channels {
                        channel.notify_certificate_expiry(&payload).await;
                    }
                }
            })
        }),
    );
}

async fn start_health_server(port: String) -> anyhow::Result<()> {
    let app = Router::new().route("/health", get(health_check));
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("health server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "uptime-notifier" }))
}
