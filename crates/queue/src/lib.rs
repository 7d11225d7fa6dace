//! Priority task queue over Redis lists (spec.md §4.B).
//!
//! Four named lists, `queue:<name>`, drained in strict priority order via a
//! single multi-key `BRPOP` — Redis returns the first non-empty key in the
//! argument list, which gives strict priority for free (no round-robin).
//! Per-task metadata lives in a Redis hash `queue:task:<id>` so
//! `GetTaskInfo`/`DeleteTask`/`CancelTask` can operate without scanning the
//! list. Uniqueness is a `SET NX EX` guard key, generalizing the
//! SADD+EXPIRE dedup idiom used elsewhere in this pipeline for event
//! dedup.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::json;
use tracing::{debug, warn};
use uptime_common::error::{Error, Result};
use uptime_domain::{QueueName, Task};
use uuid::Uuid;

pub struct Queue {
    manager: ConnectionManager,
}

/// Outcome of an `enqueue_unique` call. `Duplicate` is success-by-
/// suppression, never an error (spec.md §4.B).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued { instance_id: String },
    Duplicate,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TaskInfo {
    pub instance_id: String,
    pub queue: String,
    pub task_type: String,
    pub status: String,
    pub enqueued_at: chrono::DateTime<chrono::Utc>,
}

/// Per-queue summary returned by `get_queue_info`/`list_queues`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct QueueInfo {
    pub name: String,
    pub length: usize,
    pub paused: bool,
}

fn list_key(queue: QueueName) -> String {
    format!("queue:{}", queue.as_str())
}

fn unique_key(task_id: &str) -> String {
    format!("queue:unique:{task_id}")
}

fn task_hash_key(instance_id: &str) -> String {
    format!("queue:task:{instance_id}")
}

fn paused_key(queue: QueueName) -> String {
    format!("queue:paused:{}", queue.as_str())
}

impl Queue {
    pub fn new(manager: ConnectionManager) -> Self {
        Self { manager }
    }

    /// Unconditional enqueue; returns the generated instance id.
    pub async fn enqueue(&mut self, task: &Task) -> Result<String> {
        let instance_id = Uuid::new_v4().to_string();
        self.push(&instance_id, task).await?;
        Ok(instance_id)
    }

    /// Enqueue only if `task.task_id` hasn't been seen within `unique_ttl`
    /// seconds. A collision is success-by-suppression, not an error
    /// (spec.md §4.B, §8 scenario 6).
    pub async fn enqueue_unique(
        &mut self,
        task: &Task,
        unique_ttl_secs: u64,
    ) -> Result<EnqueueOutcome> {
        let task_id = task
            .task_id
            .as_deref()
            .ok_or_else(|| Error::Validation("enqueue_unique requires task_id".to_string()))?;

        let key = unique_key(task_id);
        let won: bool = redis::cmd("SET")
            .arg(&key)
            .arg("1")
            .arg("NX")
            .arg("EX")
            .arg(unique_ttl_secs)
            .query_async::<Option<String>>(&mut self.manager)
            .await
            .map(|r| r.is_some())?;

        if !won {
            debug!(task_id, "enqueue_unique suppressed duplicate");
            return Ok(EnqueueOutcome::Duplicate);
        }

        let instance_id = Uuid::new_v4().to_string();
        self.push(&instance_id, task).await?;
        Ok(EnqueueOutcome::Enqueued { instance_id })
    }

    async fn push(&mut self, instance_id: &str, task: &Task) -> Result<()> {
        let raw = serde_json::to_string(task)?;
        let list = list_key(task.queue);

        self.manager.lpush::<_, _, ()>(&list, &raw).await?;

        let hash = task_hash_key(instance_id);
        let info = json!({
            "instance_id": instance_id,
            "queue": task.queue.as_str(),
            "task_type": task.task_type,
            "status": "pending",
            "enqueued_at": chrono::Utc::now(),
            "raw": raw,
        });
        self.manager
            .hset::<_, _, _, ()>(&hash, "info", info.to_string())
            .await?;
        self.manager
            .expire::<_, ()>(&hash, task.retention_seconds as i64)
            .await?;

        Ok(())
    }

    /// Block until a task is available on any unpaused queue, in strict
    /// priority order, or the timeout elapses.
    pub async fn dequeue(&mut self, timeout_secs: f64) -> Result<Option<Task>> {
        let mut lists = Vec::new();
        for queue in QueueName::ALL {
            if !self.is_paused(queue).await? {
                lists.push(list_key(queue));
            }
        }

        if lists.is_empty() {
            tokio::time::sleep(std::time::Duration::from_secs_f64(timeout_secs)).await;
            return Ok(None);
        }

        let result: Option<(String, String)> = self.manager.brpop(&lists, timeout_secs).await?;

        match result {
            Some((_key, raw)) => {
                let task: Task = serde_json::from_str(&raw)?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    /// Block on a single named queue only, ignoring the others. Used by
    /// pools that own a dedicated lane outside the strict-priority
    /// rotation (the ingester pool on `QueueName::Ingest`).
    pub async fn dequeue_single(&mut self, queue: QueueName, timeout_secs: f64) -> Result<Option<Task>> {
        if self.is_paused(queue).await? {
            tokio::time::sleep(std::time::Duration::from_secs_f64(timeout_secs)).await;
            return Ok(None);
        }

        let lists = [list_key(queue)];
        let result: Option<(String, String)> = self.manager.brpop(&lists, timeout_secs).await?;

        match result {
            Some((_key, raw)) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn pause_queue(&mut self, queue: QueueName) -> Result<()> {
        self.manager.set::<_, _, ()>(paused_key(queue), "1").await?;
        Ok(())
    }

    pub async fn unpause_queue(&mut self, queue: QueueName) -> Result<()> {
        self.manager.del::<_, ()>(paused_key(queue)).await?;
        Ok(())
    }

    pub async fn is_paused(&mut self, queue: QueueName) -> Result<bool> {
        let value: Option<String> = self.manager.get(paused_key(queue)).await?;
        Ok(value.is_some())
    }

    pub async fn queue_length(&mut self, queue: QueueName) -> Result<usize> {
        let len: usize = self.manager.llen(list_key(queue)).await?;
        Ok(len)
    }

    pub async fn get_queue_info(&mut self, queue: QueueName) -> Result<QueueInfo> {
        Ok(QueueInfo {
            name: queue.as_str().to_string(),
            length: self.queue_length(queue).await?,
            paused: self.is_paused(queue).await?,
        })
    }

    /// Summaries for all four named queues, in priority order.
    pub async fn list_queues(&mut self) -> Result<Vec<QueueInfo>> {
        let mut infos = Vec::with_capacity(QueueName::ALL.len());
        for queue in QueueName::ALL {
            infos.push(self.get_queue_info(queue).await?);
        }
        Ok(infos)
    }

    /// Tasks a worker has dequeued but not yet finished. This queue has no
    /// leased/in-flight state distinct from "gone from the list" — a task
    /// is either pending in the list or already handed to a worker with no
    /// record kept here — so this always returns empty.
    pub async fn list_active_tasks(&mut self, _queue: QueueName) -> Result<Vec<Task>> {
        Ok(Vec::new())
    }

    /// Tasks held back for future delivery. There is no delay/cron queue
    /// in this implementation — the scheduler enqueues directly onto the
    /// priority lists when a check is due — so this always returns empty.
    pub async fn list_scheduled_tasks(&mut self, _queue: QueueName) -> Result<Vec<Task>> {
        Ok(Vec::new())
    }

    pub async fn get_task_info(&mut self, instance_id: &str) -> Result<Option<TaskInfo>> {
        let raw: Option<String> = self
            .manager
            .hget(task_hash_key(instance_id), "info")
            .await?;

        match raw {
            Some(raw) => {
                let value: serde_json::Value = serde_json::from_str(&raw)?;
                Ok(Some(TaskInfo {
                    instance_id: value["instance_id"].as_str().unwrap_or_default().into(),
                    queue: value["queue"].as_str().unwrap_or_default().into(),
                    task_type: value["task_type"].as_str().unwrap_or_default().into(),
                    status: value["status"].as_str().unwrap_or_default().into(),
                    enqueued_at: serde_json::from_value(value["enqueued_at"].clone())
                        .unwrap_or_else(|_| chrono::Utc::now()),
                }))
            }
            None => Ok(None),
        }
    }

    /// Removes task metadata. Does not retract an already-pushed list
    /// entry — a worker that dequeues it will find the metadata gone and
    /// should treat that as "deleted mid-flight" (spec.md §8 scenario 4).
    pub async fn delete_task(&mut self, instance_id: &str) -> Result<()> {
        self.manager.del::<_, ()>(task_hash_key(instance_id)).await?;
        Ok(())
    }

    /// Same semantics as `delete_task` for this list-based queue: there is
    /// no separate "active" state to unwind, only metadata.
    pub async fn cancel_task(&mut self, instance_id: &str) -> Result<()> {
        if self.get_task_info(instance_id).await?.is_none() {
            warn!(instance_id, "cancel_task: no such task");
        }
        self.delete_task(instance_id).await
    }

    pub async fn list_pending(&mut self, queue: QueueName, limit: isize) -> Result<Vec<Task>> {
        let raws: Vec<String> = self
            .manager
            .lrange(list_key(queue), 0, limit.max(1) - 1)
            .await?;

        raws.iter()
            .map(|raw| serde_json::from_str(raw).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_task(task_id: Option<&str>) -> Task {
        Task {
            task_type: "monitor:healthcheck".to_string(),
            payload: json!({"monitor_id": "11111111-1111-1111-1111-111111111111"}),
            queue: QueueName::Healthcheck,
            max_retry: 3,
            timeout_seconds: 30,
            retention_seconds: 3600,
            task_id: task_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_enqueue_unique_requires_task_id() {
        if let Ok(redis_url) = std::env::var("REDIS_URL") {
            let client = redis::Client::open(redis_url).unwrap();
            let manager = ConnectionManager::new(client).await.unwrap();
            let mut queue = Queue::new(manager);

            let task = sample_task(None);
            let result = queue.enqueue_unique(&task, 30).await;
            assert!(result.is_err());
        }
    }

    #[tokio::test]
    #[ignore] // requires Redis
    async fn test_enqueue_unique_suppresses_duplicate() {
        let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for this test");
        let client = redis::Client::open(redis_url).unwrap();
        let manager = ConnectionManager::new(client).await.unwrap();
        let mut queue = Queue::new(manager);

        let task = sample_task(Some("check:test-monitor:42"));

        let first = queue.enqueue_unique(&task, 30).await.unwrap();
        let second = queue.enqueue_unique(&task, 30).await.unwrap();

        assert!(matches!(first, EnqueueOutcome::Enqueued { .. }));
        assert_eq!(second, EnqueueOutcome::Duplicate);
    }

    #[tokio::test]
    #[ignore] // requires Redis
    async fn test_list_queues_reports_length_and_pause_state() {
        let redis_url = std::env::var("REDIS_URL").expect("REDIS_URL must be set for this test");
        let client = redis::Client::open(redis_url).unwrap();
        let manager = ConnectionManager::new(client).await.unwrap();
        let mut queue = Queue::new(manager);

        queue.pause_queue(QueueName::Low).await.unwrap();

        let infos = queue.list_queues().await.unwrap();
        assert_eq!(infos.len(), QueueName::ALL.len());

        let low = infos.iter().find(|i| i.name == QueueName::Low.as_str()).unwrap();
        assert!(low.paused);

        queue.unpause_queue(QueueName::Low).await.unwrap();

        assert!(queue.list_active_tasks(QueueName::Low).await.unwrap().is_empty());
        assert!(queue.list_scheduled_tasks(QueueName::Low).await.unwrap().is_empty());
    }
}
