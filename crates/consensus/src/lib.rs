//! Per-round ledger consensus engine.
//!
//! This crate implements the round state machine that takes a node from a
//! closed prior ledger to the next accepted ledger:
//!
//! - `Event::RoundTimer` → drive the open/establish/finished/accepted phases
//! - `Event::ProposalReceived` → track peer positions and dispute votes
//! - `Event::TxSetAcquired` → install sets, create disputes
//! - `Event::LedgerApplied` → finalize: persist, validate, report
//!
//! All I/O is performed by the runner via returned `Action`s.
//!
//! # Terminology
//!
//! - **Round**: one pass from "prior ledger closed" to "next ledger
//!   accepted". Rounds never overlap on a node.
//!
//! - **Position**: the tx-set id a node wants in the next ledger, plus its
//!   close-time estimate, carried by signed proposals.
//!
//! - **Dispute**: a transaction some acquired position disagrees with ours
//!   about. Disputes tally peer votes; ours follows the rising avalanche
//!   threshold so stuck rounds resolve.
//!
//! - **View**: which prior ledger the network is building on, measured by
//!   trusted validations. A shifted view resets the round.
//!
//! # Convergence
//!
//! Two interchangeable strategies, fixed per process:
//!
//! - **Builtin (avalanche)**: converged when enough proposers share our
//!   position and a close-time bucket reaches quorum.
//! - **External arbiter**: first node to publish its position for the
//!   sequence wins; everyone else adopts the published record.

mod config;
mod dispute;
mod round;
mod strategy;
mod tally;
mod timing;

pub use config::{AvalancheLevel, AvalancheSchedule, ConsensusConfig, ConsensusKind};
pub use dispute::DisputedTx;
pub use round::{PrevRoundStats, RoundContext, RoundPhase, RoundState};
pub use strategy::{ArbiterProgress, CloseTimeMode, RoundStrategy};
pub use tally::ValidationTally;
pub use timing::{check_consensus, participants_needed, should_close_ledger};
