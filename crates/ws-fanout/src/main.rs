//! WebSocket fan-out (spec.md §2, component J). Subscribes to
//! `events:HeartbeatEvent` on the bus and re-broadcasts each beat to
//! WebSocket clients watching the matching monitor's room.
//!
//! Generalizes `admin-api/src/handlers/websocket.rs`'s single global
//! `webhook:events` pubsub-to-WS forward loop into a per-room registry,
//! the same `RwLock<HashMap<key, _>>` shape
//! `webhook-delivery/src/circuit_breaker.rs`'s `CircuitBreakerManager`
//! uses for per-endpoint state.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, info, warn};
use uptime_config::Config;
use uptime_domain::Event;
use uptime_event_bus::EventBus;

const ROOM_CAPACITY: usize = 256;

/// Lazily-created broadcast channel per `monitor:<id>` room. A room with
/// no subscribers is dropped the next time `prune` runs — nothing keeps
/// a `Sender` around once every client has disconnected.
#[derive(Clone, Default)]
struct RoomRegistry {
    rooms: Arc<RwLock<HashMap<String, broadcast::Sender<String>>>>,
}

impl RoomRegistry {
    async fn subscribe(&self, room: &str) -> broadcast::Receiver<String> {
        let rooms = self.rooms.read().await;
        if let Some(tx) = rooms.get(room) {
            return tx.subscribe();
        }
        drop(rooms);

        let mut rooms = self.rooms.write().await;
        let tx = rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0);
        tx.subscribe()
    }

    async fn publish(&self, room: &str, message: String) {
        let rooms = self.rooms.read().await;
        if let Some(tx) = rooms.get(room) {
            // No receivers is not an error: it just means nobody's
            // watching this monitor's room right now.
            let _ = tx.send(message);
        }
    }
}

#[derive(Clone)]
struct AppState {
    registry: RoomRegistry,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uptime_common::init_tracing();
    info!("starting ws fanout");

    let config = Config::load()?;
    let registry = RoomRegistry::default();

    let bus = EventBus::new(&config.redis.url).await?;
    subscribe_heartbeats(&bus, registry.clone());

    let state = AppState { registry };
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws/monitors/{id}", get(ws_handler))
        .with_state(state);

    let port = std::env::var("WS_FANOUT_PORT").unwrap_or_else(|_| "8090".to_string());
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("ws fanout listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

fn subscribe_heartbeats(bus: &EventBus, registry: RoomRegistry) {
    bus.subscribe(
        "events:HeartbeatEvent",
        Arc::new(move |event: Event| {
            let registry = registry.clone();
            Box::pin(async move {
                if let Event::HeartbeatEvent(payload) = event {
                    let room = format!("monitor:{}", payload.monitor_id);
                    match serde_json::to_string(&payload) {
                        Ok(json) => registry.publish(&room, json).await,
                        Err(e) => error!(error = %e, "failed to encode heartbeat payload"),
                    }
                }
            })
        }),
    );
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(monitor_id): Path<uuid::Uuid>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, monitor_id, state))
}

async fn handle_socket(socket: WebSocket, monitor_id: uuid::Uuid, state: AppState) {
    let room = format!("monitor:{monitor_id}");
    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.registry.subscribe(&room).await;

    info!(%monitor_id, "ws client connected");

    let connected = json!({ "type": "connected", "room": room });
    if sender.send(Message::Text(connected.to_string().into())).await.is_err() {
        return;
    }

    let mut ping_interval = tokio::time::interval(Duration::from_secs(30));

    loop {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(%monitor_id, error = %e, "ws error");
                        break;
                    }
                    _ => {}
                }
            }

            beat = rx.recv() => {
                match beat {
                    Ok(payload) => {
                        debug!(%monitor_id, "forwarding heartbeat to ws client");
                        if sender.send(Message::Text(payload.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(%monitor_id, skipped, "ws client lagging, dropping missed beats");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(%monitor_id, "ws client disconnected");
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "uptime-ws-fanout" }))
}
