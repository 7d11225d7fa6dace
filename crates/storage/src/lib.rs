//! Monitor/heartbeat/stats persistence over a shared Postgres pool
//! (spec.md §4.H).

pub mod heartbeat_store;
pub mod monitor_store;
pub mod proxy_store;
pub mod stats_store;

pub use heartbeat_store::HeartbeatStore;
pub use monitor_store::MonitorStore;
pub use proxy_store::ProxyStore;
pub use stats_store::StatsStore;
