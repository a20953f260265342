//! Node state machine.

use crate::open_ledger::OpenLedgerState;
use meridian_consensus::{
    ConsensusConfig, PrevRoundStats, RoundContext, RoundPhase, RoundState, ValidationTally,
};
use meridian_core::{Action, Event, OutboundMessage, StateMachine, TimerId};
use meridian_messages::TransactionGossip;
use meridian_types::{
    CloseTime, Hash, KeyPair, Ledger, LedgerId, LedgerSeq, NodeId, Proposal, Transaction,
    ValidatorRegistry,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Stored proposals kept per peer for playback after a view shift.
const STORED_PROPOSALS_PER_PEER: usize = 16;

/// Validations older than this are pruned from the tally.
const VALIDATION_MAX_AGE_SECS: u64 = 300;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Combined node state machine.
///
/// Owns the node-lifetime state (open ledger, validation tally, replay
/// buffer, held ledgers, clock offset) and the current consensus round,
/// replacing the round whenever one completes or is abandoned.
pub struct NodeStateMachine {
    config: ConsensusConfig,
    registry: Arc<ValidatorRegistry>,
    keys: Option<KeyPair>,

    round: RoundState,
    open_ledger: OpenLedgerState,
    tally: ValidationTally,

    /// Closed ledgers we hold, by id.
    ledgers: HashMap<LedgerId, Arc<Ledger>>,

    /// Recent trusted proposals for playback, bounded per peer.
    stored: Vec<Proposal>,

    /// Transport hashes of validations we broadcast; relayed copies of our
    /// own validations are recognized and dropped.
    suppressed: HashSet<Hash>,

    last_close_time: CloseTime,
    last_validation: Option<(LedgerId, LedgerSeq)>,
    prev_round: PrevRoundStats,

    /// Wall-clock seconds corresponding to `now == 0`.
    epoch_base: u64,
    /// Accumulated close-time clock adjustment.
    clock_offset: i64,

    now: Duration,
    startup_actions: Vec<Action>,
}

/// Build a `RoundContext` from the node's fields without borrowing the
/// round itself.
macro_rules! round_ctx {
    ($self:expr) => {
        RoundContext {
            open_txs: $self.open_ledger.transactions(),
            tally: &$self.tally,
            held_ledgers: &$self.ledgers,
            stored_proposals: &$self.stored,
            last_close_time: $self.last_close_time,
            last_validation: $self.last_validation,
            load_fee: None,
            serve_range: serve_range(&$self.ledgers),
        }
    };
}

impl std::fmt::Debug for NodeStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeStateMachine")
            .field("round", &self.round)
            .field("open_txs", &self.open_ledger.len())
            .field("held_ledgers", &self.ledgers.len())
            .field("now", &self.now)
            .finish()
    }
}

impl NodeStateMachine {
    /// Create a node bound to a prior closed ledger.
    ///
    /// * `keys` - validation identity; `None` runs in observer mode.
    /// * `epoch_base` - wall-clock seconds corresponding to runner time 0.
    pub fn new(
        config: ConsensusConfig,
        registry: Arc<ValidatorRegistry>,
        keys: Option<KeyPair>,
        prev_ledger: Arc<Ledger>,
        epoch_base: u64,
    ) -> Self {
        let tally = ValidationTally::new();
        let mut ledgers = HashMap::new();
        ledgers.insert(prev_ledger.id(), prev_ledger.clone());
        let open_ledger = OpenLedgerState::new();
        let stored: Vec<Proposal> = Vec::new();
        let last_close_time = prev_ledger.header.close_time;

        let ctx = RoundContext {
            open_txs: open_ledger.transactions(),
            tally: &tally,
            held_ledgers: &ledgers,
            stored_proposals: &stored,
            last_close_time,
            last_validation: None,
            load_fee: None,
            serve_range: serve_range(&ledgers),
        };
        let (round, startup_actions) = RoundState::start(
            config.clone(),
            registry.clone(),
            keys.clone(),
            true,
            prev_ledger.clone(),
            prev_ledger.id(),
            PrevRoundStats::default(),
            None,
            Duration::ZERO,
            epoch_base,
            &ctx,
        );

        Self {
            config,
            registry,
            keys,
            round,
            open_ledger,
            tally,
            ledgers,
            stored,
            suppressed: HashSet::new(),
            last_close_time,
            last_validation: None,
            prev_round: PrevRoundStats::default(),
            epoch_base,
            clock_offset: 0,
            now: Duration::ZERO,
            startup_actions,
        }
    }

    /// Kick off timers and any round start-up actions.
    pub fn initialize(&mut self) -> Vec<Action> {
        let mut actions = std::mem::take(&mut self.startup_actions);
        actions.push(Action::SetTimer {
            id: TimerId::Round,
            duration: self.config.tick_interval,
        });
        actions.push(Action::SetTimer {
            id: TimerId::Cleanup,
            duration: CLEANUP_INTERVAL,
        });
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn round(&self) -> &RoundState {
        &self.round
    }

    pub fn open_ledger(&self) -> &OpenLedgerState {
        &self.open_ledger
    }

    pub fn tally(&self) -> &ValidationTally {
        &self.tally
    }

    pub fn node_id(&self) -> Option<NodeId> {
        self.keys.as_ref().map(|keys| keys.node_id())
    }

    pub fn held_ledger(&self, id: &LedgerId) -> Option<&Arc<Ledger>> {
        self.ledgers.get(id)
    }

    pub fn latest_ledger(&self) -> Arc<Ledger> {
        self.round.prev_ledger()
    }

    /// Network close-time clock, including the consensus-driven offset.
    pub fn network_time(&self) -> u64 {
        let base = self.epoch_base as i64 + self.now.as_secs() as i64 + self.clock_offset;
        base.max(0) as u64
    }

    /// Apply a clock nudge (the runner executes `Action::AdjustClock`).
    pub fn adjust_clock(&mut self, offset_secs: i64) {
        self.clock_offset += offset_secs;
        debug!(offset_secs, total = self.clock_offset, "Clock adjusted");
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Round lifecycle
    // ═══════════════════════════════════════════════════════════════════════

    fn start_round(&mut self, prev_ledger: Arc<Ledger>, prev_ledger_id: LedgerId) -> Vec<Action> {
        let network_time = self.network_time();
        let ctx = round_ctx!(self);
        let (round, actions) = RoundState::start(
            self.config.clone(),
            self.registry.clone(),
            self.keys.clone(),
            true,
            prev_ledger,
            prev_ledger_id,
            self.prev_round,
            None,
            self.now,
            network_time,
            &ctx,
        );
        self.round = round;
        actions
    }

    /// A round accepted `ledger`: record it, reseed the open ledger, and
    /// start the next round on top of it.
    fn finish_round(&mut self, ledger: Arc<Ledger>, retriable: Vec<Transaction>) -> Vec<Action> {
        info!(ledger = %ledger.id(), seq = %ledger.seq(), "Round complete");

        self.prev_round = PrevRoundStats {
            proposers: self.round.proposers(),
            duration: self.round.converge_duration(),
        };
        self.ledgers.insert(ledger.id(), ledger.clone());
        self.last_close_time = ledger.header.close_time;

        // Disputes we voted against get the first crack at the next ledger.
        let mut reseed = self.round.no_vote_disputes();
        reseed.extend(retriable);
        self.open_ledger.rebuild(&ledger, reseed);

        self.start_round(ledger.clone(), ledger.id())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event handlers
    // ═══════════════════════════════════════════════════════════════════════

    fn on_round_timer(&mut self) -> Vec<Action> {
        let mut actions = {
            let ctx = round_ctx!(self);
            self.round.on_tick(&ctx)
        };
        if !self.round.close_time().is_none() {
            self.last_close_time = self.round.close_time();
        }
        actions.push(Action::SetTimer {
            id: TimerId::Round,
            duration: self.config.tick_interval,
        });
        actions
    }

    fn on_cleanup_timer(&mut self) -> Vec<Action> {
        self.tally
            .prune(self.network_time().saturating_sub(VALIDATION_MAX_AGE_SECS));
        vec![Action::SetTimer {
            id: TimerId::Cleanup,
            duration: CLEANUP_INTERVAL,
        }]
    }

    fn on_proposal(&mut self, proposal: Proposal) -> Vec<Action> {
        if !self.registry.is_trusted(&proposal.peer()) {
            trace!(peer = ?proposal.peer(), "Ignoring untrusted proposal");
            return Vec::new();
        }
        if !proposal.verify() {
            debug!(peer = ?proposal.peer(), "Dropping proposal with bad signature");
            return Vec::new();
        }
        self.store_proposal(proposal.clone());
        self.round.on_proposal(proposal)
    }

    fn store_proposal(&mut self, proposal: Proposal) {
        let peer = proposal.peer();
        let peer_count = self.stored.iter().filter(|p| p.peer() == peer).count();
        if peer_count >= STORED_PROPOSALS_PER_PEER {
            // Drop that peer's oldest stored proposal.
            if let Some(oldest) = self.stored.iter().position(|p| p.peer() == peer) {
                self.stored.remove(oldest);
            }
        }
        self.stored.push(proposal);
    }

    fn on_validation(&mut self, validation: meridian_types::Validation) -> Vec<Action> {
        let gossip = meridian_messages::ValidationGossip::new(validation.clone());
        if self.suppressed.contains(&gossip.transport_hash()) {
            trace!("Suppressing relayed copy of our own validation");
            return Vec::new();
        }
        if !self.registry.is_trusted(&validation.node()) {
            trace!(node = ?validation.node(), "Ignoring untrusted validation");
            return Vec::new();
        }
        if !validation.verify() {
            debug!(node = ?validation.node(), "Dropping validation with bad signature");
            return Vec::new();
        }
        self.tally.record(&validation);
        Vec::new()
    }

    fn on_ledger_applied(
        &mut self,
        prev_ledger: LedgerId,
        ledger: Arc<Ledger>,
        retriable: Vec<Transaction>,
    ) -> Vec<Action> {
        let mut actions = {
            let ctx = round_ctx!(self);
            self.round.on_ledger_applied(prev_ledger, ledger.clone(), &ctx)
        };
        if self.round.phase() == RoundPhase::Accepted {
            actions.extend(self.finish_round(ledger, retriable));
        }
        actions
    }

    fn on_apply_failed(&mut self, prev_ledger: LedgerId, missing_node: bool) -> Vec<Action> {
        let mut actions = self.round.on_apply_failed(prev_ledger, missing_node);
        if prev_ledger == self.round.prev_ledger_id() {
            // Abandon: a fresh round restarts cleanly from the same prior
            // ledger on the next tick.
            warn!(missing_node, "Restarting round after failed application");
            let prev = self.round.prev_ledger();
            let target = self.round.prev_ledger_id();
            actions.extend(self.start_round(prev, target));
        }
        actions
    }

    fn on_submit_transaction(&mut self, tx: Transaction) -> Vec<Action> {
        if !self.open_ledger.add(tx.clone()) {
            return Vec::new();
        }
        // Relay local submissions so peers can include them too.
        vec![Action::Broadcast {
            message: OutboundMessage::Transaction(TransactionGossip::new(
                tx,
                self.network_time(),
            )),
        }]
    }

    /// Record validations we broadcast, for relay suppression and the
    /// partial-validation check.
    fn note_outgoing(&mut self, actions: &[Action]) {
        for action in actions {
            if let Action::Broadcast {
                message: OutboundMessage::Validation(gossip),
            } = action
            {
                self.suppressed.insert(gossip.transport_hash());
                if gossip.validation().is_full() {
                    self.last_validation = Some((
                        gossip.validation().ledger_id(),
                        gossip.validation().ledger_seq(),
                    ));
                }
            }
        }
    }
}

impl StateMachine for NodeStateMachine {
    fn handle(&mut self, event: Event) -> Vec<Action> {
        self.round.set_now(self.now, self.network_time());

        let actions = match event {
            Event::RoundTimer => self.on_round_timer(),
            Event::CleanupTimer => self.on_cleanup_timer(),

            Event::ProposalReceived { proposal } => self.on_proposal(proposal),
            Event::ValidationReceived { validation } => self.on_validation(validation),
            Event::HaveTxSetReceived { id, .. } => {
                if self.round.wants_tx_set(&id) {
                    vec![Action::AcquireTxSet { id }]
                } else {
                    Vec::new()
                }
            }
            Event::TransactionReceived { tx } => {
                self.open_ledger.add(tx);
                Vec::new()
            }
            Event::SubmitTransaction { tx } => self.on_submit_transaction(tx),

            Event::TxSetAcquired { set } => self.round.on_tx_set_acquired(set),
            Event::TxSetUnavailable { id } => self.round.on_tx_set_unavailable(id),
            Event::LedgerAcquired { ledger } => {
                self.ledgers.insert(ledger.id(), ledger.clone());
                self.round.on_ledger_acquired(ledger)
            }

            Event::LedgerApplied {
                prev_ledger,
                ledger,
                retriable,
            } => self.on_ledger_applied(prev_ledger, ledger, retriable),
            Event::LedgerApplyFailed {
                prev_ledger,
                missing_node,
            } => self.on_apply_failed(prev_ledger, missing_node),

            Event::ArbiterResponse { seq, outcome } => {
                self.round.on_arbiter_response(seq, outcome)
            }
        };

        self.note_outgoing(&actions);
        actions
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

fn serve_range(ledgers: &HashMap<LedgerId, Arc<Ledger>>) -> (u64, u64) {
    let mut range: Option<(u64, u64)> = None;
    for ledger in ledgers.values() {
        let seq = ledger.seq().0;
        range = Some(match range {
            None => (seq, seq),
            Some((first, last)) => (first.min(seq), last.max(seq)),
        });
    }
    range.unwrap_or((0, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::test_utils::{test_keypair, test_transaction};
    use meridian_types::{CloseTime, ValidatorRegistry};

    fn node() -> NodeStateMachine {
        let registry = Arc::new(ValidatorRegistry::from_keys(
            (0u8..4).map(|seed| test_keypair(seed).public_key()),
        ));
        NodeStateMachine::new(
            ConsensusConfig::default(),
            registry,
            Some(test_keypair(0)),
            Arc::new(Ledger::genesis(CloseTime(1000))),
            1005,
        )
    }

    #[test]
    fn test_initialize_sets_timers() {
        let mut node = node();
        let actions = node.initialize();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SetTimer { id: TimerId::Round, .. })));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SetTimer { id: TimerId::Cleanup, .. })));
    }

    #[test]
    fn test_round_timer_reschedules() {
        let mut node = node();
        node.initialize();
        node.set_time(Duration::from_secs(1));
        let actions = node.handle(Event::RoundTimer);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::SetTimer { id: TimerId::Round, .. })));
    }

    #[test]
    fn test_submission_relays_once() {
        let mut node = node();
        node.initialize();
        let tx = test_transaction(1);
        let first = node.handle(Event::SubmitTransaction { tx: tx.clone() });
        assert!(first
            .iter()
            .any(|a| matches!(a, Action::Broadcast { message: OutboundMessage::Transaction(_) })));
        let second = node.handle(Event::SubmitTransaction { tx });
        assert!(second.is_empty());
        assert_eq!(node.open_ledger().len(), 1);
    }

    #[test]
    fn test_clock_adjustment_moves_network_time() {
        let mut node = node();
        node.set_time(Duration::from_secs(10));
        let before = node.network_time();
        node.adjust_clock(5);
        assert_eq!(node.network_time(), before + 5);
        node.adjust_clock(-7);
        assert_eq!(node.network_time(), before - 2);
    }

    #[test]
    fn test_untrusted_validation_not_tallied() {
        let mut node = node();
        let validation = meridian_types::Validation::sign(
            &test_keypair(99),
            meridian_types::ValidationContent {
                ledger_id: LedgerId(Hash::digest(b"ledger")),
                ledger_seq: LedgerSeq(1),
                sign_time: 1010,
                full: true,
                load_fee: None,
                fee_vote: None,
                amendments: vec![],
            },
        );
        node.handle(Event::ValidationReceived { validation });
        assert!(node.tally().is_empty());
    }
}
