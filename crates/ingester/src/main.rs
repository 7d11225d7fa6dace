//! Ingester pool (spec.md §4.F) — converts raw probe results into
//! heartbeats.
//!
//! Each worker fiber drains the dedicated `ingester` lane via
//! `Queue::dequeue_single`, never the four check-task lanes. The
//! previous-heartbeat read, retry/pending rewrite, and new-heartbeat
//! insert all happen inside one Postgres transaction holding
//! `pg_advisory_xact_lock(hashtext(monitor_id))`, so two ingester
//! replicas racing on the same monitor serialize instead of corrupting
//! `retries`/`down_count`. Worker-pool startup follows the same
//! barrier + health-server-first shape as the check worker.

use axum::{Json, Router, routing::get};
use chrono::Utc;
use redis::aio::ConnectionManager;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::signal;
use tokio::sync::Barrier;
use tracing::{error, info, warn};
use uptime_common::error::Result as CommonResult;
use uptime_config::Config;
use uptime_domain::{
    CertificateExpiryPayload, Event, Heartbeat, HeartbeatEventPayload, HeartbeatStatus,
    IngestPayload, MonitorStatusChangedPayload, QueueName, Task,
};
use uptime_event_bus::EventBus;
use uptime_queue::Queue;
use uptime_storage::{HeartbeatStore, MonitorStore, StatsStore};
use uuid::Uuid;

#[derive(Clone)]
struct ServiceState {
    ready: Arc<AtomicBool>,
    workers_initialized: Arc<AtomicUsize>,
    worker_count: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uptime_common::init_tracing();
    info!("starting ingester");

    let config = Config::load()?;

    let db_pool =
        uptime_common::create_pool(&config.database.url, config.database.max_connections).await?;
    uptime_common::run_migrations(&db_pool).await?;
    let heartbeat_store = Arc::new(HeartbeatStore::new(db_pool.clone()));
    let stats_store = Arc::new(StatsStore::new(db_pool.clone()));
    let monitor_store = Arc::new(MonitorStore::new(db_pool));

    let redis_client = uptime_common::RedisClient::new(&config.redis.url).await?;
    let manager: ConnectionManager = redis_client.manager();
    let event_bus = Arc::new(tokio::sync::Mutex::new(EventBus::new(&config.redis.url).await?));

    let worker_count = config.queue.concurrency;
    let state = ServiceState {
        ready: Arc::new(AtomicBool::new(false)),
        workers_initialized: Arc::new(AtomicUsize::new(0)),
        worker_count,
    };

    let health_port = std::env::var("INGESTER_HEALTH_PORT").unwrap_or_else(|_| "8080".to_string());
    let health_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port, health_state).await {
            error!("health server failed: {}", e);
        }
    });

    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let init_barrier = Arc::new(Barrier::new(worker_count + 1));

    let mut handles = Vec::new();
    for worker_id in 0..worker_count {
        let manager = manager.clone();
        let heartbeat_store = heartbeat_store.clone();
        let stats_store = stats_store.clone();
        let monitor_store = monitor_store.clone();
        let event_bus = event_bus.clone();
        let config = config.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let barrier = init_barrier.clone();
        let state = state.clone();

        handles.push(tokio::spawn(async move {
            state.workers_initialized.fetch_add(1, Ordering::SeqCst);
            barrier.wait().await;

            let mut queue = Queue::new(manager);
            worker_loop(
                worker_id,
                &mut queue,
                &heartbeat_store,
                &stats_store,
                &monitor_store,
                &event_bus,
                &config,
                &mut shutdown_rx,
            )
            .await;
        }));
    }

    info!(worker_count, "waiting for ingester workers to initialize");
    init_barrier.wait().await;
    state.ready.store(true, Ordering::SeqCst);
    info!("ingester pool ready");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received ctrl+c, shutting down");
        }
        _ = async {
            for handle in &mut handles {
                let _ = handle.await;
            }
        } => {
            warn!("all ingester workers stopped");
        }
    }

    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        for handle in handles {
            let _ = handle.await;
        }
    })
    .await;

    Ok(())
}

async fn worker_loop(
    worker_id: usize,
    queue: &mut Queue,
    heartbeat_store: &HeartbeatStore,
    stats_store: &StatsStore,
    monitor_store: &MonitorStore,
    event_bus: &Arc<tokio::sync::Mutex<EventBus>>,
    config: &Config,
    shutdown_rx: &mut tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!(worker_id, "shutdown signal received");
            break;
        }

        let task = match queue.dequeue_single(QueueName::Ingest, 5.0).await {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(e) => {
                error!(worker_id, error = %e, "dequeue failed, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        if task.task_type != "monitor:ingest" {
            warn!(worker_id, task_type = %task.task_type, "unexpected task type, dropping");
            continue;
        }

        if let Err(e) = handle_ingest(
            heartbeat_store,
            stats_store,
            monitor_store,
            event_bus,
            config,
            &task,
        )
        .await
        {
            error!(worker_id, error = %e, "failed to process ingest task");
        }
    }
}

async fn handle_ingest(
    heartbeat_store: &HeartbeatStore,
    stats_store: &StatsStore,
    monitor_store: &MonitorStore,
    event_bus: &Arc<tokio::sync::Mutex<EventBus>>,
    config: &Config,
    task: &Task,
) -> CommonResult<()> {
    let payload: IngestPayload = serde_json::from_value(task.payload.clone())?;
    let monitor_id = payload.monitor_id;

    if heartbeat_store.is_under_maintenance(monitor_id).await? {
        let outcome = build_maintenance_heartbeat(&payload);
        persist_and_record(heartbeat_store, stats_store, monitor_id, &outcome).await?;
        publish_events(event_bus, monitor_id, None, &outcome).await;
        return Ok(());
    }

    // Retry/resend tunables live on the monitor row, not in the queue
    // payload (the check worker doesn't know them at enqueue time) — read
    // them fresh so a config change since the last beat takes effect
    // immediately.
    let (max_retries, resend_interval) = match monitor_store.get(monitor_id).await? {
        Some(m) => (m.max_retries, m.resend_interval),
        None => {
            warn!(%monitor_id, "ingesting for unknown monitor, using defaults");
            (0, 0)
        }
    };

    let outcome = heartbeat_store
        .with_monitor_lock(monitor_id, |tx| {
            let payload = payload.clone();
            Box::pin(async move {
                let previous = uptime_storage::HeartbeatStore::latest_for_monitor(tx, monitor_id).await?;
                let outcome = apply_beat_rules(&payload, previous.as_ref(), max_retries, resend_interval);
                uptime_storage::HeartbeatStore::insert(tx, &outcome.heartbeat).await?;
                Ok(BeatOutcome {
                    previous_status: previous.as_ref().map(|h| h.status),
                    ..outcome
                })
            })
        })
        .await?;

    stats_store
        .record(
            monitor_id,
            outcome.heartbeat.status,
            outcome.heartbeat.ping_ms,
            outcome.heartbeat.time,
        )
        .await?;

    if let (Some(tls_info), true) = (&payload.tls_info, payload.check_cert_expiry) {
        maybe_emit_certificate_expiry(event_bus, monitor_id, tls_info, config).await;
    }

    publish_events(event_bus, monitor_id, outcome.previous_status, &outcome).await;
    Ok(())
}

/// Everything `apply_beat_rules` produces for one ingest task.
struct BeatOutcome {
    heartbeat: Heartbeat,
    previous_status: Option<HeartbeatStatus>,
    notify: bool,
}

/// Steps 2-5 of the beat-rule state machine: inherit counters, apply the
/// retry/pending rewrite, decide importance and whether to notify.
fn apply_beat_rules(
    payload: &IngestPayload,
    previous: Option<&Heartbeat>,
    max_retries: i32,
    resend_interval: i32,
) -> BeatOutcome {
    let prev_status = previous.map(|h| h.status);
    let mut retries = previous.map(|h| h.retries).unwrap_or(0);
    let mut down_count = previous.map(|h| h.down_count).unwrap_or(0);

    let mut status = payload.status;
    if status == HeartbeatStatus::Down {
        retries += 1;
        if max_retries > 0 && retries <= max_retries {
            status = HeartbeatStatus::Pending;
        }
    } else {
        retries = 0;
    }

    let important = HeartbeatStatus::is_important_transition(prev_status, status);
    if important {
        down_count = 0;
    }

    let mut notify = HeartbeatStatus::triggers_notify(prev_status, status);
    if !notify && status == HeartbeatStatus::Down && resend_interval > 0 {
        down_count += 1;
        if down_count >= resend_interval {
            notify = true;
            down_count = 0;
        }
    }

    let duration_ms = (payload.end_time - payload.start_time).num_milliseconds().max(0);

    let heartbeat = Heartbeat {
        id: Uuid::new_v4(),
        monitor_id: payload.monitor_id,
        status,
        msg: payload.msg.clone(),
        ping_ms: payload.ping_ms,
        time: payload.start_time,
        end_time: payload.end_time,
        duration_ms,
        retries,
        down_count,
        important,
        notified: notify,
    };

    BeatOutcome {
        heartbeat,
        previous_status: prev_status,
        notify,
    }
}

fn build_maintenance_heartbeat(payload: &IngestPayload) -> BeatOutcome {
    let duration_ms = (payload.end_time - payload.start_time).num_milliseconds().max(0);
    BeatOutcome {
        heartbeat: Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: payload.monitor_id,
            status: HeartbeatStatus::Maintenance,
            msg: payload.msg.clone(),
            ping_ms: payload.ping_ms,
            time: payload.start_time,
            end_time: payload.end_time,
            duration_ms,
            retries: 0,
            down_count: 0,
            important: false,
            notified: false,
        },
        previous_status: None,
        notify: false,
    }
}

async fn persist_and_record(
    heartbeat_store: &HeartbeatStore,
    stats_store: &StatsStore,
    monitor_id: Uuid,
    outcome: &BeatOutcome,
) -> CommonResult<()> {
    heartbeat_store
        .with_monitor_lock(monitor_id, |tx| {
            let heartbeat = outcome.heartbeat.clone();
            Box::pin(async move { uptime_storage::HeartbeatStore::insert(tx, &heartbeat).await })
        })
        .await?;

    stats_store
        .record(
            monitor_id,
            outcome.heartbeat.status,
            outcome.heartbeat.ping_ms,
            outcome.heartbeat.time,
        )
        .await?;

    Ok(())
}

/// Whether a beat's status is worth a `MonitorStatusChanged` event. A
/// first beat the retry rule rewrote to `Pending` doesn't count — the
/// monitor hasn't settled into a status yet, mirroring the importance
/// suppression in `HeartbeatStatus::is_important_transition`.
fn status_changed(previous_status: Option<HeartbeatStatus>, status: HeartbeatStatus) -> bool {
    match previous_status {
        None => status != HeartbeatStatus::Pending,
        Some(p) => p != status,
    }
}

async fn publish_events(
    event_bus: &Arc<tokio::sync::Mutex<EventBus>>,
    monitor_id: Uuid,
    previous_status: Option<HeartbeatStatus>,
    outcome: &BeatOutcome,
) {
    let mut bus = event_bus.lock().await;

    if status_changed(previous_status, outcome.heartbeat.status) {
        let _ = bus
            .publish(Event::MonitorStatusChanged(MonitorStatusChangedPayload {
                monitor_id,
                previous_status,
                new_status: outcome.heartbeat.status,
                at: outcome.heartbeat.time,
            }))
            .await;
    }

    if outcome.notify {
        let _ = bus
            .publish(Event::ImportantHeartbeat(HeartbeatEventPayload {
                monitor_id,
                heartbeat: outcome.heartbeat.clone(),
            }))
            .await;
    }

    let _ = bus
        .publish(Event::HeartbeatEvent(HeartbeatEventPayload {
            monitor_id,
            heartbeat: outcome.heartbeat.clone(),
        }))
        .await;
}

async fn maybe_emit_certificate_expiry(
    event_bus: &Arc<tokio::sync::Mutex<EventBus>>,
    monitor_id: Uuid,
    tls_info: &uptime_domain::TlsInfo,
    config: &Config,
) {
    let days_remaining = (tls_info.valid_to - Utc::now()).num_days();
    if days_remaining > config.ingester.cert_expiry_warning_days {
        return;
    }

    info!(%monitor_id, days_remaining, "certificate nearing expiry");
    let mut bus = event_bus.lock().await;
    let _ = bus
        .publish(Event::CertificateExpiry(CertificateExpiryPayload {
            monitor_id,
            valid_to: tls_info.valid_to,
            days_remaining,
        }))
        .await;
}

async fn start_health_server(port: String, state: ServiceState) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(move || readiness_check(state.clone())));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("health server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "uptime-ingester" }))
}

async fn readiness_check(state: ServiceState) -> Json<Value> {
    Json(json!({
        "ready": state.ready.load(Ordering::SeqCst),
        "workers_initialized": state.workers_initialized.load(Ordering::SeqCst),
        "workers_total": state.worker_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn payload_with(status: HeartbeatStatus) -> IngestPayload {
        let now = Utc::now();
        IngestPayload {
            monitor_id: Uuid::new_v4(),
            status,
            msg: "probe result".to_string(),
            ping_ms: 42,
            start_time: now,
            end_time: now + ChronoDuration::milliseconds(42),
            tls_info: None,
            check_cert_expiry: false,
        }
    }

    #[test]
    fn test_first_beat_up_is_important_but_quiet() {
        let outcome = apply_beat_rules(&payload_with(HeartbeatStatus::Up), None, 0, 0);
        assert!(outcome.heartbeat.important);
        assert!(!outcome.notify);
        assert_eq!(outcome.heartbeat.status, HeartbeatStatus::Up);
    }

    #[test]
    fn test_first_beat_down_without_retries_notifies() {
        let outcome = apply_beat_rules(&payload_with(HeartbeatStatus::Down), None, 0, 0);
        assert_eq!(outcome.heartbeat.status, HeartbeatStatus::Down);
        assert!(outcome.heartbeat.important);
        assert!(outcome.notify);
    }

    #[test]
    fn test_first_beat_down_rewritten_to_pending_is_quiet() {
        let outcome = apply_beat_rules(&payload_with(HeartbeatStatus::Down), None, 2, 0);
        assert_eq!(outcome.heartbeat.status, HeartbeatStatus::Pending);
        assert_eq!(outcome.heartbeat.retries, 1);
        assert!(!outcome.heartbeat.important);
        assert!(!outcome.notify);
        assert!(!status_changed(outcome.previous_status, outcome.heartbeat.status));
    }

    #[test]
    fn test_down_rewritten_to_pending_while_retries_remain() {
        let previous = Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: Uuid::new_v4(),
            status: HeartbeatStatus::Up,
            msg: String::new(),
            ping_ms: 10,
            time: Utc::now(),
            end_time: Utc::now(),
            duration_ms: 10,
            retries: 0,
            down_count: 0,
            important: true,
            notified: true,
        };

        let outcome = apply_beat_rules(&payload_with(HeartbeatStatus::Down), Some(&previous), 3, 0);
        assert_eq!(outcome.heartbeat.status, HeartbeatStatus::Pending);
        assert_eq!(outcome.heartbeat.retries, 1);
        assert!(!outcome.notify);
    }

    #[test]
    fn test_down_becomes_down_once_retries_exhausted() {
        let previous = Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: Uuid::new_v4(),
            status: HeartbeatStatus::Pending,
            msg: String::new(),
            ping_ms: 10,
            time: Utc::now(),
            end_time: Utc::now(),
            duration_ms: 10,
            retries: 3,
            down_count: 0,
            important: false,
            notified: false,
        };

        let outcome = apply_beat_rules(&payload_with(HeartbeatStatus::Down), Some(&previous), 3, 0);
        assert_eq!(outcome.heartbeat.status, HeartbeatStatus::Down);
        assert_eq!(outcome.heartbeat.retries, 4, "retries keeps climbing past max_retries, it doesn't reset");
        assert!(outcome.notify);
        assert!(outcome.heartbeat.important);
    }

    #[test]
    fn test_non_important_down_resends_after_interval() {
        let previous = Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: Uuid::new_v4(),
            status: HeartbeatStatus::Down,
            msg: String::new(),
            ping_ms: 10,
            time: Utc::now(),
            end_time: Utc::now(),
            duration_ms: 10,
            retries: 0,
            down_count: 2,
            important: false,
            notified: false,
        };

        let outcome = apply_beat_rules(&payload_with(HeartbeatStatus::Down), Some(&previous), 0, 3);
        assert_eq!(outcome.heartbeat.down_count, 0);
        assert!(outcome.notify);
    }

    #[test]
    fn test_up_to_up_resets_retries_and_is_quiet() {
        let previous = Heartbeat {
            id: Uuid::new_v4(),
            monitor_id: Uuid::new_v4(),
            status: HeartbeatStatus::Up,
            msg: String::new(),
            ping_ms: 10,
            time: Utc::now(),
            end_time: Utc::now(),
            duration_ms: 10,
            retries: 0,
            down_count: 0,
            important: true,
            notified: true,
        };

        let outcome = apply_beat_rules(&payload_with(HeartbeatStatus::Up), Some(&previous), 3, 5);
        assert!(!outcome.heartbeat.important);
        assert!(!outcome.notify);
        assert_eq!(outcome.heartbeat.retries, 0);
    }
}
