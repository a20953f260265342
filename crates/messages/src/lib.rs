//! Network messages for the consensus protocol.
//!
//! Content-level message definitions only; transport and relay live outside
//! the core. Every message encodes to opaque binary via SBOR.

mod have_tx_set;
mod proposal;
mod status_change;
mod transaction;
mod validation;

pub use have_tx_set::{HaveTxSetGossip, TxSetStatus};
pub use proposal::ProposalGossip;
pub use status_change::{NodeEvent, StatusChangeGossip};
pub use transaction::{TransactionGossip, TransactionStatus};
pub use validation::ValidationGossip;

/// Marker for messages that travel on the wire.
pub trait NetworkMessage {
    /// Stable identifier used for topic routing and telemetry.
    fn message_type_id() -> &'static str;
}
