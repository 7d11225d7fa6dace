//! REST surface (spec.md §4.G): the push endpoint, health/version, and
//! monitor CRUD stubs that publish lifecycle events for the scheduler to
//! react to. Router composition, CORS, and graceful shutdown follow
//! `admin-api/src/main.rs`; handler/status-mapping style follows
//! `admin-api/src/health.rs`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uptime_config::Config;
use uptime_domain::{
    CreateMonitorRequest, Event, HeartbeatStatus, IngestPayload, MonitorRef, QueueName, Task,
    UpdateMonitorRequest,
};
use uptime_event_bus::EventBus;
use uptime_queue::{EnqueueOutcome, Queue};
use uptime_storage::MonitorStore;
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
struct AppState {
    monitor_store: Arc<MonitorStore>,
    queue: Arc<Mutex<Queue>>,
    event_bus: Arc<Mutex<EventBus>>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uptime_common::init_tracing();
    info!("starting api server");

    let config = Config::load()?;

    let db_pool =
        uptime_common::create_pool(&config.database.url, config.database.max_connections).await?;
    uptime_common::run_migrations(&db_pool).await?;
    let monitor_store = Arc::new(MonitorStore::new(db_pool));

    let redis_client = uptime_common::RedisClient::new(&config.redis.url).await?;
    let queue = Arc::new(Mutex::new(Queue::new(redis_client.manager())));
    let event_bus = Arc::new(Mutex::new(EventBus::new(&config.redis.url).await?));

    let state = AppState {
        monitor_store,
        queue,
        event_bus,
    };

    let app = create_router(state);

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("api server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/version", get(version))
        .route("/push/{token}", get(push_heartbeat))
        .route(
            "/api/v1/monitors",
            post(create_monitor).get(list_monitors),
        )
        .route(
            "/api/v1/monitors/{id}",
            get(get_monitor).put(update_monitor).delete(delete_monitor),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "success" }))
}

async fn version() -> Json<Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Debug, Deserialize)]
struct PushQuery {
    status: Option<String>,
    msg: Option<String>,
    ping: Option<i32>,
}

/// `GET /push/:token?status=&msg=&ping=` (spec.md §4.G). A push monitor
/// has no executor of its own — hitting this URL *is* the check.
async fn push_heartbeat(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<PushQuery>,
) -> (StatusCode, Json<Value>) {
    let monitor = match state.monitor_store.find_by_push_token(&token).await {
        Ok(Some(m)) => m,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown token" }))),
        Err(e) => {
            error!(error = %e, "push: failed to look up token");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    if !monitor.active {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "monitor inactive" })),
        );
    }

    let status = match query.status.as_deref() {
        None | Some("up") => HeartbeatStatus::Up,
        Some("down") => HeartbeatStatus::Down,
        Some(other) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("unrecognized status: {other}") })),
            );
        }
    };

    let now = chrono::Utc::now();
    let payload = match serde_json::to_value(IngestPayload {
        monitor_id: monitor.id,
        status,
        msg: query.msg.unwrap_or_default(),
        ping_ms: query.ping.unwrap_or(0),
        start_time: now,
        end_time: now,
        tls_info: None,
        check_cert_expiry: false,
    }) {
        Ok(v) => v,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    let task = Task {
        task_type: "monitor:ingest".to_string(),
        payload,
        queue: QueueName::Ingest,
        max_retry: 3,
        timeout_seconds: 120,
        retention_seconds: 3600,
        task_id: Some(format!(
            "ingest:push:{}:{}",
            monitor.id,
            now.timestamp_nanos_opt().unwrap_or_default()
        )),
    };

    let mut queue = state.queue.lock().await;
    match queue.enqueue_unique(&task, 300).await {
        Ok(EnqueueOutcome::Enqueued { .. } | EnqueueOutcome::Duplicate) => {
            (StatusCode::OK, Json(json!({ "ok": "true" })))
        }
        Err(e) => {
            error!(monitor_id = %monitor.id, error = %e, "push: enqueue failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn create_monitor(
    State(state): State<AppState>,
    Json(req): Json<CreateMonitorRequest>,
) -> (StatusCode, Json<Value>) {
    if let Err(e) = req.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })));
    }

    let now = chrono::Utc::now();
    let monitor = uptime_domain::Monitor {
        id: Uuid::new_v4(),
        monitor_type: req.monitor_type,
        name: req.name,
        interval_seconds: req.interval_seconds,
        timeout_seconds: req.timeout_seconds,
        max_retries: req.max_retries,
        retry_interval_seconds: req.retry_interval_seconds,
        resend_interval: req.resend_interval,
        active: true,
        config: req.config,
        proxy_id: req.proxy_id,
        push_token: Some(Uuid::new_v4().to_string()),
        check_cert_expiry: false,
        created_at: now,
        updated_at: now,
    };

    if let Err(e) = monitor.validate_invariants() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e })));
    }

    if let Err(e) = state.monitor_store.insert(&monitor).await {
        error!(error = %e, "failed to insert monitor");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        );
    }

    publish(&state, Event::MonitorCreated(MonitorRef { monitor_id: monitor.id })).await;

    (StatusCode::OK, Json(serde_json::to_value(&monitor).unwrap_or_default()))
}

async fn list_monitors(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.monitor_store.list_active().await {
        Ok(monitors) => (StatusCode::OK, Json(json!({ "monitors": monitors }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn get_monitor(State(state): State<AppState>, Path(id): Path<Uuid>) -> (StatusCode, Json<Value>) {
    match state.monitor_store.get(id).await {
        Ok(Some(monitor)) => (StatusCode::OK, Json(serde_json::to_value(&monitor).unwrap_or_default())),
        Ok(None) => (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn update_monitor(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateMonitorRequest>,
) -> (StatusCode, Json<Value>) {
    if let Err(e) = req.validate() {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })));
    }

    let existing = match state.monitor_store.get(id).await {
        Ok(Some(m)) => m,
        Ok(None) => return (StatusCode::NOT_FOUND, Json(json!({ "error": "not found" }))),
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    // Active-flag toggles are the only part of an update the scheduler
    // needs to learn about immediately; field edits land on the next
    // scheduled check via the monitor row the worker/ingester already
    // read live.
    if let Some(active) = req.active {
        if active != existing.active {
            if let Err(e) = state.monitor_store.set_active(id, active).await {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": e.to_string() })),
                );
            }
        }
    }

    publish(&state, Event::MonitorUpdated(MonitorRef { monitor_id: id })).await;

    match state.monitor_store.get(id).await {
        Ok(Some(monitor)) => (StatusCode::OK, Json(serde_json::to_value(&monitor).unwrap_or_default())),
        _ => (StatusCode::OK, Json(json!({ "ok": "true" }))),
    }
}

async fn delete_monitor(State(state): State<AppState>, Path(id): Path<Uuid>) -> (StatusCode, Json<Value>) {
    if let Err(e) = state.monitor_store.delete(id).await {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        );
    }

    publish(&state, Event::MonitorDeleted(MonitorRef { monitor_id: id })).await;
    (StatusCode::OK, Json(json!({ "ok": "true" })))
}

async fn publish(state: &AppState, event: Event) {
    let mut bus = state.event_bus.lock().await;
    if let Err(e) = bus.publish(event).await {
        warn!(error = %e, "failed to publish monitor lifecycle event");
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { warn!("received ctrl+c, shutting down"); }
        _ = terminate => { warn!("received terminate signal, shutting down"); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_query_defaults_to_up() {
        let query = PushQuery {
            status: None,
            msg: None,
            ping: None,
        };
        let status = match query.status.as_deref() {
            None | Some("up") => HeartbeatStatus::Up,
            Some("down") => HeartbeatStatus::Down,
            Some(_) => unreachable!(),
        };
        assert_eq!(status, HeartbeatStatus::Up);
    }
}
