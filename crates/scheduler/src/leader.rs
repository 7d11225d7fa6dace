//! Single-leader election over one Redis key (spec.md §4.D).
//!
//! Renewal is a CAS: the script only writes `producer:leader` if it's
//! absent or already held by this instance, so a stale leader that wakes
//! up after its lease expired can never clobber the new leader's key.

use redis::Script;
use redis::aio::ConnectionManager;
use uptime_common::error::Result;
use uuid::Uuid;

const LEADER_KEY: &str = "producer:leader";

static RENEW_SCRIPT: &str = r#"
local key = KEYS[1]
local id = ARGV[1]
local ttl = ARGV[2]
local current = redis.call('GET', key)
if current == false or current == id then
    redis.call('SET', key, id, 'EX', ttl)
    return 1
else
    return 0
end
"#;

pub struct LeaderElection {
    manager: ConnectionManager,
    instance_id: String,
    ttl_secs: u64,
    script: Script,
}

impl LeaderElection {
    pub fn new(manager: ConnectionManager, ttl_secs: u64) -> Self {
        Self {
            manager,
            instance_id: Uuid::new_v4().to_string(),
            ttl_secs,
            script: Script::new(RENEW_SCRIPT),
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Attempts to (re)claim leadership. Returns true if this instance is
    /// leader after the call.
    pub async fn try_renew(&mut self) -> Result<bool> {
        let won: i64 = self
            .script
            .key(LEADER_KEY)
            .arg(&self.instance_id)
            .arg(self.ttl_secs)
            .invoke_async(&mut self.manager)
            .await?;
        Ok(won == 1)
    }
}
