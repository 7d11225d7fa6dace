use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
pub enum HeartbeatStatus {
    Up,
    Down,
    Pending,
    Maintenance,
}

/// One per completed check or retry attempt. Append-only: never updated
/// after creation (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Heartbeat {
    pub id: Uuid,
    pub monitor_id: Uuid,
    pub status: HeartbeatStatus,
    pub msg: String,
    pub ping_ms: i32,
    pub time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: i64,
    pub retries: i32,
    pub down_count: i32,
    pub important: bool,
    pub notified: bool,
}

impl HeartbeatStatus {
    /// Whether the transition from `prev` (absent on the first beat) to
    /// `self` crosses a state boundary worth flagging (spec.md §4.F.4).
    /// A first beat is important unless the retry rule rewrote it to
    /// `Pending` — that beat is still finding its footing, not crossing
    /// a boundary.
    pub fn is_important_transition(prev: Option<HeartbeatStatus>, curr: HeartbeatStatus) -> bool {
        use HeartbeatStatus::*;
        match prev {
            None => curr != Pending,
            Some(p) => matches!(
                (p, curr),
                (Up, Down) | (Down, Up) | (Pending, Up) | (Pending, Down)
            ),
        }
    }

    /// Whether the transition should trigger a notification outright,
    /// independent of the `resend_interval` counter (spec.md §4.F.5). A
    /// first beat only notifies when it's Down — there's nothing to
    /// alert on for a monitor's first Up or Pending result.
    pub fn triggers_notify(prev: Option<HeartbeatStatus>, curr: HeartbeatStatus) -> bool {
        use HeartbeatStatus::*;
        match prev {
            None => curr == Down,
            Some(p) => matches!((p, curr), (Up, Down) | (Down, Up) | (Pending, Down)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HeartbeatStatus::*;

    #[test]
    fn test_first_beat_is_important_and_notifies() {
        assert!(HeartbeatStatus::is_important_transition(None, Up));
        assert!(HeartbeatStatus::triggers_notify(None, Down));
    }

    #[test]
    fn test_first_beat_up_is_important_but_quiet() {
        assert!(HeartbeatStatus::is_important_transition(None, Up));
        assert!(!HeartbeatStatus::triggers_notify(None, Up));
    }

    #[test]
    fn test_first_beat_pending_is_neither_important_nor_notifying() {
        assert!(!HeartbeatStatus::is_important_transition(None, Pending));
        assert!(!HeartbeatStatus::triggers_notify(None, Pending));
    }

    #[test]
    fn test_pending_to_pending_not_important() {
        assert!(!HeartbeatStatus::is_important_transition(
            Some(Pending),
            Pending
        ));
        assert!(!HeartbeatStatus::triggers_notify(Some(Pending), Pending));
    }

    #[test]
    fn test_pending_to_down_notifies_but_is_important() {
        assert!(HeartbeatStatus::is_important_transition(
            Some(Pending),
            Down
        ));
        assert!(HeartbeatStatus::triggers_notify(Some(Pending), Down));
    }

    #[test]
    fn test_down_to_up_recovers() {
        assert!(HeartbeatStatus::is_important_transition(Some(Down), Up));
        assert!(HeartbeatStatus::triggers_notify(Some(Down), Up));
    }
}
