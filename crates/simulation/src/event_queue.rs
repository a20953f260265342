//! Deterministic event ordering.

use meridian_core::EventPriority;
use std::time::Duration;

/// Index type for simulation-only node routing.
pub type NodeIndex = u32;

/// Global ordering key for queued events.
///
/// Events sort by delivery time, then priority (internal before timers
/// before network before client), then insertion sequence, then node. The
/// sequence counter makes the order total, so iteration is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EventKey {
    pub time: Duration,
    pub priority: EventPriority,
    pub sequence: u64,
    pub node: NodeIndex,
}
