//! External consensus arbiter.
//!
//! An optional coordination service used to short-circuit round agreement:
//! the first node to publish its position for a ledger sequence wins, and
//! every other node adopts the published record. Records live under an
//! ephemeral node per sequence —
//! `/<namespace>/consensus/<seq>` holding `"<tx>-<prev>-<close_time>"` —
//! so a crashed writer's claim disappears with its session.
//!
//! The state machine never talks to the store directly: it emits
//! `Action::PublishPosition` and the runner calls [`ArbiterClient::publish`],
//! feeding the [`ArbiterOutcome`] back as an event. The client itself is a
//! process-wide handle ([`ArbiterHandle`]): initialized at the first round,
//! shared across rounds, torn down at shutdown.

mod client;
mod key;
mod store;

pub use client::{ArbiterClient, ArbiterConfig, ArbiterHandle};
pub use key::{PositionParseError, PublishedPosition, RoundKey};
pub use store::{
    CoordinationStore, CreateResult, MemoryCoordinationStore, SessionId, StoreError,
};
