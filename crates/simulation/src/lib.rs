//! Deterministic simulation of a Meridian validator network.
//!
//! Nodes are pure state machines; this crate supplies the missing world:
//! a global event queue ordered by (time, priority, sequence), a simulated
//! network with latency, jitter, loss, and partitions, per-node ledger
//! stores, a shared tx-set exchange, and (when configured) a shared
//! in-memory arbiter store. Given the same seed, a simulation produces
//! identical results every run.

mod event_queue;
mod network;
mod runner;
mod storage;

pub use event_queue::{EventKey, NodeIndex};
pub use network::{NetworkConfig, SimulatedNetwork};
pub use runner::{SimulationConfig, SimulationRunner, SimulationStats};
pub use storage::SimLedgerStore;
