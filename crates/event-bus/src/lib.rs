//! Distributed event bus over Redis pub/sub (spec.md §4.A).
//!
//! `publish` reuses a shared `ConnectionManager`. `subscribe` opens a
//! dedicated pub/sub connection per channel — generalizing the pattern in
//! the admin dashboard's WebSocket handler, which does the same thing for
//! a single hardcoded channel. Handlers run on detached fibers so a slow
//! or panicking handler can never block or crash another subscriber;
//! delivery is best-effort, at-least-once only within the pub/sub session
//! (no persistence, no replay), exactly as the spec requires.

use futures::{FutureExt, StreamExt};
use redis::aio::ConnectionManager;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uptime_common::error::Result;
use uptime_domain::Event;

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type Handler = Arc<dyn Fn(Event) -> HandlerFuture + Send + Sync>;

pub struct EventBus {
    redis_url: String,
    publisher: ConnectionManager,
}

impl EventBus {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let publisher = ConnectionManager::new(client).await?;

        Ok(Self {
            redis_url: redis_url.to_string(),
            publisher,
        })
    }

    pub async fn publish(&mut self, event: Event) -> Result<()> {
        let channel = event.channel_name();
        let body = serde_json::to_string(&event)?;

        redis::cmd("PUBLISH")
            .arg(channel)
            .arg(&body)
            .query_async::<i64>(&mut self.publisher)
            .await?;

        debug!(channel, "published event");
        Ok(())
    }

    /// Subscribes to `events:<EventType>` where `channel` is e.g.
    /// `"events:HeartbeatEvent"`. Spawns a detached fiber; returns
    /// immediately. The handler is invoked for every message received
    /// while the subscription is alive; a panic inside it is caught and
    /// logged, never propagated.
    pub fn subscribe(&self, channel: impl Into<String>, handler: Handler) {
        let channel = channel.into();
        let redis_url = self.redis_url.clone();

        tokio::spawn(async move {
            loop {
                match run_subscription(&redis_url, &channel, handler.clone()).await {
                    Ok(()) => {
                        warn!(channel, "pubsub stream ended, resubscribing");
                    }
                    Err(e) => {
                        error!(channel, error = %e, "subscription error, retrying in 1s");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    }
                }
            }
        });
    }
}

async fn run_subscription(redis_url: &str, channel: &str, handler: Handler) -> Result<()> {
    let client = redis::Client::open(redis_url)?;
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();

    pubsub.subscribe(channel).await?;
    info!(channel, "subscribed to event channel");

    let mut stream = pubsub.on_message();
    while let Some(msg) = stream.next().await {
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(e) => {
                error!(channel, error = %e, "failed to read pubsub payload");
                continue;
            }
        };

        let event: Event = match serde_json::from_str(&payload) {
            Ok(e) => e,
            Err(e) => {
                error!(channel, error = %e, "failed to decode event payload");
                continue;
            }
        };

        let handler = handler.clone();
        let channel_owned = channel.to_string();
        tokio::spawn(async move {
            let result = AssertUnwindSafe(handler(event)).catch_unwind().await;
            if result.is_err() {
                error!(channel = channel_owned, "event handler panicked");
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uptime_domain::MonitorRef;
    use uuid::Uuid;

    #[tokio::test]
    #[ignore] // requires Redis
    async fn test_publish_and_subscribe_roundtrip() {
        let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for this test");
        let mut bus = EventBus::new(&redis_url).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        bus.subscribe(
            "events:MonitorDeleted",
            Arc::new(move |event: Event| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(event);
                })
            }),
        );

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        let monitor_id = Uuid::new_v4();
        bus.publish(Event::MonitorDeleted(MonitorRef { monitor_id }))
            .await
            .unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .expect("handler should run")
            .expect("channel should deliver");

        match received {
            Event::MonitorDeleted(r) => assert_eq!(r.monitor_id, monitor_id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    #[ignore] // requires Redis
    async fn test_panicking_handler_does_not_stop_subscription() {
        let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for this test");
        let mut bus = EventBus::new(&redis_url).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();
        bus.subscribe(
            "events:ProxyDeleted",
            Arc::new(move |_event: Event| {
                let tx = tx.clone();
                Box::pin(async move {
                    let _ = tx.send(());
                    panic!("boom");
                })
            }),
        );

        tokio::time::sleep(std::time::Duration::from_millis(200)).await;

        for _ in 0..2 {
            bus.publish(Event::ProxyDeleted {
                proxy_id: Uuid::new_v4(),
            })
            .await
            .unwrap();
        }

        let mut received = 0;
        while tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .is_ok()
        {
            received += 1;
            if received == 2 {
                break;
            }
        }

        assert_eq!(received, 2, "handler should run again after panicking once");
    }
}
