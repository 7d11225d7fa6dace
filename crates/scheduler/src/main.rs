//! Producer/scheduler binary.
//!
//! One leader among any number of replicas runs the claim/reclaim ticks;
//! standbys just keep renewing their bid. Monitor lifecycle events (create,
//! update, delete) keep `sched:due` in sync without a poll loop.

use axum::{Json, Router, routing::get};
use redis::aio::ConnectionManager;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use uptime_config::Config;
use uptime_domain::{Event, HealthcheckPayload, QueueName, Task};
use uptime_event_bus::EventBus;
use uptime_queue::Queue;
use uptime_scheduler::{LeaderElection, ScheduleStore, slot_epoch};
use uptime_storage::MonitorStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    uptime_common::init_tracing();
    info!("starting scheduler");

    let config = Config::load()?;

    let db_pool = uptime_common::create_pool(&config.database.url, config.database.max_connections).await?;
    uptime_common::run_migrations(&db_pool).await?;
    let monitor_store = Arc::new(MonitorStore::new(db_pool));

    let redis_client = uptime_common::RedisClient::new(&config.redis.url).await?;
    let manager: ConnectionManager = redis_client.manager();

    let is_leader = Arc::new(AtomicBool::new(false));

    let health_port = std::env::var("SCHEDULER_HEALTH_PORT").unwrap_or_else(|_| "8080".to_string());
    let health_leader_flag = is_leader.clone();
    tokio::spawn(async move {
        if let Err(e) = start_health_server(health_port, health_leader_flag).await {
            error!("health server failed: {}", e);
        }
    });

    let leader_task = tokio::spawn(leader_loop(
        manager.clone(),
        config.scheduler.leader_ttl_seconds,
        config.scheduler.leader_renewal_interval_seconds,
        is_leader.clone(),
    ));

    let claim_task = tokio::spawn(claim_loop(
        manager.clone(),
        monitor_store.clone(),
        config.clone(),
        is_leader.clone(),
    ));

    let reclaim_task = tokio::spawn(reclaim_loop(
        manager.clone(),
        config.scheduler.reclaim_interval_seconds,
        config.scheduler.batch_claim_size,
        is_leader.clone(),
    ));

    let bus = EventBus::new(&config.redis.url).await?;
    subscribe_monitor_lifecycle(&bus, manager.clone(), monitor_store.clone(), config.clone(), is_leader.clone());

    info!("scheduler ready");

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("received ctrl+c, shutting down");
        }
        _ = async {
            let _ = leader_task.await;
            let _ = claim_task.await;
            let _ = reclaim_task.await;
        } => {
            warn!("a scheduler task exited unexpectedly");
        }
    }

    Ok(())
}

async fn leader_loop(
    manager: ConnectionManager,
    ttl_seconds: u64,
    renewal_interval_seconds: u64,
    is_leader: Arc<AtomicBool>,
) {
    let mut election = LeaderElection::new(manager, ttl_seconds);
    info!(instance_id = election.instance_id(), "leader election starting");

    loop {
        match election.try_renew().await {
            Ok(won) => {
                let was_leader = is_leader.swap(won, Ordering::SeqCst);
                if won && !was_leader {
                    info!("became leader");
                } else if !won && was_leader {
                    warn!("lost leadership");
                }
            }
            Err(e) => {
                error!(error = %e, "leader renewal failed");
                is_leader.store(false, Ordering::SeqCst);
            }
        }

        tokio::time::sleep(Duration::from_secs(renewal_interval_seconds)).await;
    }
}

async fn claim_loop(
    manager: ConnectionManager,
    monitor_store: Arc<MonitorStore>,
    config: Config,
    is_leader: Arc<AtomicBool>,
) {
    let mut schedule = ScheduleStore::new(manager.clone());
    let mut queue = Queue::new(manager);
    let tick = Duration::from_millis(config.scheduler.claim_tick_interval_ms);

    loop {
        if is_leader.load(Ordering::SeqCst) {
            match schedule.claim_due(config.scheduler.batch_claim_size, config.scheduler.lease_ttl_seconds as i64 * 1000).await {
                Ok(ids) => {
                    for monitor_id in ids {
                        if let Err(e) = process_claimed(&mut schedule, &mut queue, &monitor_store, monitor_id).await {
                            error!(%monitor_id, error = %e, "failed to process claimed monitor");
                        }
                    }
                }
                Err(e) => error!(error = %e, "claim tick failed"),
            }
        }

        tokio::time::sleep(tick).await;
    }
}

async fn process_claimed(
    schedule: &mut ScheduleStore,
    queue: &mut Queue,
    monitor_store: &MonitorStore,
    monitor_id: uuid::Uuid,
) -> anyhow::Result<()> {
    let monitor = monitor_store.get(monitor_id).await?;

    let monitor = match monitor {
        Some(m) if m.active => m,
        _ => {
            schedule.drop_leased(monitor_id).await?;
            return Ok(());
        }
    };

    let now_ms = schedule.now_ms().await?;
    let epoch = slot_epoch(now_ms, monitor.interval_seconds);

    let task = Task {
        task_type: "monitor:healthcheck".to_string(),
        payload: serde_json::to_value(HealthcheckPayload {
            monitor_id,
            scheduled_at: chrono::Utc::now(),
        })?,
        queue: QueueName::Healthcheck,
        max_retry: 0,
        timeout_seconds: monitor.timeout_seconds as u64,
        retention_seconds: 3600,
        task_id: Some(format!("check:{monitor_id}:{epoch}")),
    };

    queue
        .enqueue_unique(&task, monitor.interval_seconds as u64)
        .await?;

    let next_due_ms = now_ms + (monitor.interval_seconds as i64 * 1000);
    schedule.reschedule(monitor_id, next_due_ms).await?;

    Ok(())
}

async fn reclaim_loop(manager: ConnectionManager, interval_seconds: u64, batch_size: usize, is_leader: Arc<AtomicBool>) {
    let mut schedule = ScheduleStore::new(manager);
    loop {
        if is_leader.load(Ordering::SeqCst) {
            match schedule.reclaim_expired(batch_size).await {
                Ok(n) if n > 0 => info!(reclaimed = n, "reclaimed expired leases"),
                Ok(_) => {}
                Err(e) => error!(error = %e, "reclaim tick failed"),
            }
        }
        tokio::time::sleep(Duration::from_secs(interval_seconds)).await;
    }
}

fn subscribe_monitor_lifecycle(
    bus: &EventBus,
    manager: ConnectionManager,
    monitor_store: Arc<MonitorStore>,
    config: Config,
    is_leader: Arc<AtomicBool>,
) {
    for channel in ["events:MonitorCreated", "events:MonitorUpdated"] {
        let manager = manager.clone();
        let monitor_store = monitor_store.clone();
        let config = config.clone();
        let is_leader = is_leader.clone();

        bus.subscribe(
            channel,
            Arc::new(move |event: Event| {
                let manager = manager.clone();
                let monitor_store = monitor_store.clone();
                let config = config.clone();
                let is_leader = is_leader.clone();

                Box::pin(async move {
                    if !is_leader.load(Ordering::SeqCst) {
                        return;
                    }

                    let monitor_id = match event {
                        Event::MonitorCreated(r) | Event::MonitorUpdated(r) => r.monitor_id,
                        _ => return,
                    };

                    let mut schedule = ScheduleStore::new(manager);
                    match monitor_store.get(monitor_id).await {
                        Ok(Some(m)) if m.active => {
                            let jitter_ms = (rand::random::<u64>()
                                % (config.scheduler.max_jitter_seconds * 1000 + 1))
                                as i64;
                            if let Err(e) = schedule.schedule(monitor_id, jitter_ms).await {
                                error!(%monitor_id, error = %e, "failed to schedule monitor");
                            }
                        }
                        Ok(_) => {
                            if let Err(e) = schedule.unschedule(monitor_id).await {
                                error!(%monitor_id, error = %e, "failed to unschedule inactive monitor");
                            }
                        }
                        Err(e) => error!(%monitor_id, error = %e, "failed to load monitor for scheduling"),
                    }
                })
            }),
        );
    }

    let manager = manager.clone();
    bus.subscribe(
        "events:MonitorDeleted",
        Arc::new(move |event: Event| {
            let manager = manager.clone();
            Box::pin(async move {
                if let Event::MonitorDeleted(r) = event {
                    let mut schedule = ScheduleStore::new(manager);
                    if let Err(e) = schedule.unschedule(r.monitor_id).await {
                        error!(monitor_id = %r.monitor_id, error = %e, "failed to unschedule deleted monitor");
                    }
                }
            })
        }),
    );
}

async fn start_health_server(port: String, is_leader: Arc<AtomicBool>) -> anyhow::Result<()> {
    let app = Router::new()
        .route("/health", get(move || health_check(is_leader.clone())));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("health server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_check(is_leader: Arc<AtomicBool>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "uptime-scheduler",
        "leader": is_leader.load(Ordering::SeqCst),
    }))
}
