//! Core types shared across every service: monitors, heartbeats, queue
//! tasks and the domain event envelope.

pub mod event;
pub mod heartbeat;
pub mod monitor;
pub mod proxy;
pub mod task;

pub use event::{
    CertificateExpiryPayload, Event, HeartbeatEventPayload, MonitorRef,
    MonitorStatusChangedPayload,
};
pub use heartbeat::{Heartbeat, HeartbeatStatus};
pub use monitor::{CreateMonitorRequest, Monitor, UpdateMonitorRequest};
pub use proxy::Proxy;
pub use task::{HealthcheckPayload, IngestPayload, QueueName, Task, TlsInfo};
