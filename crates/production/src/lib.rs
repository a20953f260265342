//! Production runtime for a Meridian validator.
//!
//! Bridges the deterministic node state machine to the real world: a tokio
//! event loop, wall-clock timers, RocksDB ledger storage, and channel
//! endpoints for the network overlay and acquisition subsystem (which live
//! outside this crate). Ledger application and arbiter calls run on the
//! blocking pool; their results re-enter the event loop, so the state
//! machine itself never blocks.

mod config;
mod runner;
mod storage;
mod telemetry;
mod timers;

pub use config::{ConfigError, ValidatorConfig};
pub use runner::{FetchRequest, ProductionRunner, RunnerHandle};
pub use storage::{RocksDbLedgerStore, StorageError};
pub use telemetry::init_tracing;
pub use timers::TimerManager;
