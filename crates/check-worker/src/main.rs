//! Check worker pool (spec.md §4.E).
//!
//! Each worker fiber dequeues from `critical,healthcheck,default,low` in
//! strict priority via `Queue::dequeue`'s multi-key BRPOP, runs the
//! resolved executor, and forwards the result to the ingester as a
//! `monitor:ingest` task. Worker-pool startup (readiness barrier, health
//! server first) follows `webhook-delivery/src/main.rs`.

use axum::{Json, Router, routing::get};
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
use uptime_domain::{IngestPayload, Monitor, Proxy, QueueName, Task};
use uptime_executors::ExecutorRegistry;
use uptime_queue::Queue;
use uptime_storage::{MonitorStore, ProxyStore};
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
    info!("starting check worker");

    let config = Config::load()?;

    let db_pool = uptime_common::create_pool(&config.database.url, config.database.max_connections).await?;
    uptime_common::run_migrations(&db_pool).await?;
    let monitor_store = Arc::new(MonitorStore::new(db_pool.clone()));
    let proxy_store = Arc::new(ProxyStore::new(db_pool));
    let registry = Arc::new(ExecutorRegistry::with_defaults());

    let redis_client = uptime_common::RedisClient::new(&config.redis.url).await?;
    let manager: ConnectionManager = redis_client.manager();

    let worker_count = config.queue.concurrency;
    let state = ServiceState {
        ready: Arc::new(AtomicBool::new(false)),
        workers_initialized: Arc::new(AtomicUsize::new(0)),
        worker_count,
    };

    let health_port = std::env::var("CHECK_WORKER_HEALTH_PORT").unwrap_or_else(|_| "8080".to_string());
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
        let monitor_store = monitor_store.clone();
        let proxy_store = proxy_store.clone();
        let registry = registry.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();
        let barrier = init_barrier.clone();
        let state = state.clone();

        handles.push(tokio::spawn(async move {
            state.workers_initialized.fetch_add(1, Ordering::SeqCst);
            barrier.wait().await;

            let mut queue = Queue::new(manager);
            worker_loop(worker_id, &mut queue, &monitor_store, &proxy_store, &registry, &mut shutdown_rx).await;
        }));
    }

    info!(worker_count, "waiting for workers to initialize");
    init_barrier.wait().await;
    state.ready.store(true, Ordering::SeqCst);
    info!("check worker pool ready");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received ctrl+c, shutting down");
        }
        _ = async {
            for handle in &mut handles {
                let _ = handle.await;
            }
        } => {
            warn!("all workers stopped");
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
    monitor_store: &MonitorStore,
    proxy_store: &ProxyStore,
    registry: &ExecutorRegistry,
    shutdown_rx: &mut tokio::sync::broadcast::Receiver<()>,
) {
    loop {
        if shutdown_rx.try_recv().is_ok() {
            info!(worker_id, "shutdown signal received");
            break;
        }

        let task = match queue.dequeue(5.0).await {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(e) => {
                error!(worker_id, error = %e, "dequeue failed, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        if task.task_type != "monitor:healthcheck" {
            warn!(worker_id, task_type = %task.task_type, "unexpected task type, dropping");
            continue;
        }

        if let Err(e) = handle_healthcheck(queue, monitor_store, proxy_store, registry, &task).await {
            error!(worker_id, error = %e, "failed to process healthcheck task");
        }
    }
}

async fn handle_healthcheck(
    queue: &mut Queue,
    monitor_store: &MonitorStore,
    proxy_store: &ProxyStore,
    registry: &ExecutorRegistry,
    task: &Task,
) -> CommonResult<()> {
    let monitor_id: Uuid = match task.payload.get("monitor_id").and_then(|v| v.as_str()) {
        Some(s) => s.parse().map_err(|_| {
            uptime_common::error::Error::Validation("invalid monitor_id in healthcheck payload".to_string())
        })?,
        None => return Ok(()),
    };

    let monitor = match monitor_store.get(monitor_id).await? {
        Some(m) if m.active => m,
        _ => {
            info!(%monitor_id, "monitor not found or inactive, dropping check");
            return Ok(());
        }
    };

    let executor = match registry.get(&monitor.monitor_type) {
        Some(e) => e,
        None => {
            error!(%monitor_id, monitor_type = %monitor.monitor_type, "no executor registered, dropping check");
            return Ok(());
        }
    };

    let proxy = resolve_proxy(proxy_store, &monitor).await;

    // Executors enforce `monitor.timeout_seconds` internally (spec.md
    // §4.C) so they can report a proper Down result instead of being cut
    // off mid-flight by an outer timeout.
    let result = executor.execute(&monitor, proxy.as_ref()).await;

    let ingest_task = Task {
        task_type: "monitor:ingest".to_string(),
        payload: serde_json::to_value(IngestPayload {
            monitor_id,
            status: result.status,
            msg: result.message,
            ping_ms: result.ping_ms,
            start_time: result.start_time,
            end_time: result.end_time,
            tls_info: result.tls_info,
            check_cert_expiry: monitor.check_cert_expiry,
        })?,
        queue: QueueName::Ingest,
        max_retry: 3,
        timeout_seconds: 120,
        retention_seconds: 3600,
        task_id: None,
    };

    queue.enqueue(&ingest_task).await?;
    Ok(())
}

async fn resolve_proxy(proxy_store: &ProxyStore, monitor: &Monitor) -> Option<Proxy> {
    let proxy_id = monitor.proxy_id?;
    match proxy_store.get(proxy_id).await {
        Ok(Some(proxy)) if proxy.active => Some(proxy),
        Ok(Some(_)) => {
            warn!(%proxy_id, "referenced proxy is inactive, running unproxied");
            None
        }
        Ok(None) => {
            warn!(%proxy_id, "referenced proxy not found, running unproxied");
            None
        }
        Err(e) => {
            error!(%proxy_id, error = %e, "proxy lookup failed, running unproxied");
            None
        }
    }
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
    Json(json!({ "status": "healthy", "service": "uptime-check-worker" }))
}

async fn readiness_check(state: ServiceState) -> Json<Value> {
    Json(json!({
        "ready": state.ready.load(Ordering::SeqCst),
        "workers_initialized": state.workers_initialized.load(Ordering::SeqCst),
        "workers_total": state.worker_count,
    }))
}
