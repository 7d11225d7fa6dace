use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::heartbeat::{Heartbeat, HeartbeatStatus};

/// Tagged-union domain event. Reconstructed from JSON on the subscriber
/// side, since handlers may live in another process (spec.md §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    MonitorCreated(MonitorRef),
    MonitorUpdated(MonitorRef),
    MonitorDeleted(MonitorRef),
    ProxyUpdated { proxy_id: Uuid },
    ProxyDeleted { proxy_id: Uuid },
    HeartbeatEvent(HeartbeatEventPayload),
    MonitorStatusChanged(MonitorStatusChangedPayload),
    ImportantHeartbeat(HeartbeatEventPayload),
    CertificateExpiry(CertificateExpiryPayload),
}

impl Event {
    /// The channel a subscriber opens: `events:<EventType>` (spec.md §6).
    pub fn channel_name(&self) -> &'static str {
        match self {
            Event::MonitorCreated(_) => "events:MonitorCreated",
            Event::MonitorUpdated(_) => "events:MonitorUpdated",
            Event::MonitorDeleted(_) => "events:MonitorDeleted",
            Event::ProxyUpdated { .. } => "events:ProxyUpdated",
            Event::ProxyDeleted { .. } => "events:ProxyDeleted",
            Event::HeartbeatEvent(_) => "events:HeartbeatEvent",
            Event::MonitorStatusChanged(_) => "events:MonitorStatusChanged",
            Event::ImportantHeartbeat(_) => "events:ImportantHeartbeat",
            Event::CertificateExpiry(_) => "events:CertificateExpiry",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorRef {
    pub monitor_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatEventPayload {
    pub monitor_id: Uuid,
    pub heartbeat: Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatusChangedPayload {
    pub monitor_id: Uuid,
    pub previous_status: Option<HeartbeatStatus>,
    pub new_status: HeartbeatStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateExpiryPayload {
    pub monitor_id: Uuid,
    pub valid_to: DateTime<Utc>,
    pub days_remaining: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_roundtrips_through_json() {
        let event = Event::ProxyUpdated {
            proxy_id: Uuid::new_v4(),
        };

        let json = serde_json::to_string(&event).unwrap();
        let decoded: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(event.channel_name(), decoded.channel_name());
    }

    #[test]
    fn test_channel_naming_convention() {
        let event = Event::MonitorDeleted(MonitorRef {
            monitor_id: Uuid::new_v4(),
        });
        assert_eq!(event.channel_name(), "events:MonitorDeleted");
    }
}
