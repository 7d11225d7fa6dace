//! `sched:due` / `sched:lease` scheduling state (spec.md §4.D).
//!
//! Claim and reclaim are each a single Lua script so the scan-then-move is
//! atomic — two leader instances racing on a renewal boundary can never
//! both claim the same monitor.

use redis::Script;
use redis::aio::ConnectionManager;
use uptime_common::error::Result;
use uuid::Uuid;

const DUE_KEY: &str = "sched:due";
const LEASE_KEY: &str = "sched:lease";

static CLAIM_SCRIPT: &str = r#"
local due = KEYS[1]
local lease = KEYS[2]
local now = tonumber(ARGV[1])
local lease_until = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local ids = redis.call('ZRANGEBYSCORE', due, '-inf', now, 'LIMIT', 0, limit)
for _, id in ipairs(ids) do
    redis.call('ZREM', due, id)
    redis.call('ZADD', lease, lease_until, id)
end
return ids
"#;

static RESCHEDULE_SCRIPT: &str = r#"
local lease = KEYS[1]
local due = KEYS[2]
local id = ARGV[1]
local next_due = tonumber(ARGV[2])
redis.call('ZREM', lease, id)
redis.call('ZADD', due, next_due, id)
return 1
"#;

static RECLAIM_SCRIPT: &str = r#"
local lease = KEYS[1]
local due = KEYS[2]
local now = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local ids = redis.call('ZRANGEBYSCORE', lease, '-inf', now, 'LIMIT', 0, limit)
for _, id in ipairs(ids) do
    redis.call('ZREM', lease, id)
    redis.call('ZADD', due, now, id)
end
return #ids
"#;

pub struct ScheduleStore {
    manager: ConnectionManager,
    claim_script: Script,
    reschedule_script: Script,
    reclaim_script: Script,
}

impl ScheduleStore {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager,
            claim_script: Script::new(CLAIM_SCRIPT),
            reschedule_script: Script::new(RESCHEDULE_SCRIPT),
            reclaim_script: Script::new(RECLAIM_SCRIPT),
        }
    }

    /// Monotonic server time, read from Redis so replicas never rely on
    /// their own clock (spec.md §4.D tie-breaks).
    pub async fn now_ms(&mut self) -> Result<i64> {
        let (secs, micros): (i64, i64) = redis::cmd("TIME").query_async(&mut self.manager).await?;
        Ok(secs * 1000 + micros / 1000)
    }

    /// Inserts (or re-inserts) a monitor into `due` at `now + jitter_ms`.
    pub async fn schedule(&mut self, monitor_id: Uuid, jitter_ms: i64) -> Result<()> {
        let now = self.now_ms().await?;
        let score = (now + jitter_ms) as f64;
        redis::cmd("ZADD")
            .arg(DUE_KEY)
            .arg(score)
            .arg(monitor_id.to_string())
            .query_async::<()>(&mut self.manager)
            .await?;
        Ok(())
    }

    /// Removes a monitor from both scheduling sets entirely.
    pub async fn unschedule(&mut self, monitor_id: Uuid) -> Result<()> {
        let id = monitor_id.to_string();
        redis::cmd("ZREM")
            .arg(DUE_KEY)
            .arg(&id)
            .query_async::<()>(&mut self.manager)
            .await?;
        redis::cmd("ZREM")
            .arg(LEASE_KEY)
            .arg(&id)
            .query_async::<()>(&mut self.manager)
            .await?;
        Ok(())
    }

    /// Claim tick: moves due monitors into `lease` for `lease_ttl_ms`.
    pub async fn claim_due(&mut self, batch_size: usize, lease_ttl_ms: i64) -> Result<Vec<Uuid>> {
        let now = self.now_ms().await?;
        let lease_until = now + lease_ttl_ms;
        let ids: Vec<String> = self
            .claim_script
            .key(DUE_KEY)
            .key(LEASE_KEY)
            .arg(now)
            .arg(lease_until)
            .arg(batch_size)
            .invoke_async(&mut self.manager)
            .await?;

        Ok(ids.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect())
    }

    /// Moves a claimed monitor from `lease` back into `due` at
    /// `now + interval_ms`, the only success path out of a lease.
    pub async fn reschedule(&mut self, monitor_id: Uuid, next_due_ms: i64) -> Result<()> {
        self.reschedule_script
            .key(LEASE_KEY)
            .key(DUE_KEY)
            .arg(monitor_id.to_string())
            .arg(next_due_ms)
            .invoke_async::<i64>(&mut self.manager)
            .await?;
        Ok(())
    }

    /// Drops a claimed monitor without rescheduling — used when the
    /// monitor turned out to be inactive or missing entirely.
    pub async fn drop_leased(&mut self, monitor_id: Uuid) -> Result<()> {
        redis::cmd("ZREM")
            .arg(LEASE_KEY)
            .arg(monitor_id.to_string())
            .query_async::<()>(&mut self.manager)
            .await?;
        Ok(())
    }

    /// Reclaim tick: anything still leased past its lease deadline goes
    /// straight back to `due` at `now`, so a crashed leader's in-flight
    /// claims are picked up by whoever becomes leader next.
    pub async fn reclaim_expired(&mut self, batch_size: usize) -> Result<usize> {
        let now = self.now_ms().await?;
        let n: i64 = self
            .reclaim_script
            .key(LEASE_KEY)
            .key(DUE_KEY)
            .arg(now)
            .arg(batch_size)
            .invoke_async(&mut self.manager)
            .await?;
        Ok(n.max(0) as usize)
    }
}

/// The monitor's interval-aligned bucket, used as the unique-enqueue
/// dedup suffix so two producers claiming the same monitor in the same
/// interval window can never both emit a task for it.
pub fn slot_epoch(now_ms: i64, interval_seconds: i32) -> i64 {
    let interval_ms = (interval_seconds.max(1) as i64) * 1000;
    now_ms / interval_ms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_epoch_groups_by_interval() {
        let interval = 60;
        let a = slot_epoch(1_000, interval);
        let b = slot_epoch(59_000, interval);
        let c = slot_epoch(61_000, interval);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
