//! Producer/scheduler (spec.md §4.D): leader election plus the due/lease
//! ZSETs that fan active monitors out to `monitor:healthcheck` tasks at
//! their configured interval.

pub mod leader;
pub mod schedule;

pub use leader::LeaderElection;
pub use schedule::{ScheduleStore, slot_epoch};
