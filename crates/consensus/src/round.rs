//! The per-round consensus state machine.
//!
//! One `RoundState` drives a single round from "the prior ledger is closed"
//! to "a new ledger is accepted":
//!
//! 1. **Open** — watch the open ledger and peers until the close decision
//!    fires, then snapshot our initial position and broadcast it.
//! 2. **Establish** — ingest peer positions, maintain disputes, update our
//!    votes against the rising threshold (or consult the external arbiter),
//!    and test convergence.
//! 3. **Finished** — ledger application is in flight on the host job queue.
//! 4. **Accepted** — the new ledger is built, validated, and reported.
//!
//! The round owns all per-round state exclusively; a view shift clears it
//! and re-enters open. All I/O happens through returned [`Action`]s.

use crate::config::ConsensusConfig;
use crate::dispute::DisputedTx;
use crate::strategy::RoundStrategy;
use crate::tally::ValidationTally;
use crate::timing::{check_consensus, participants_needed, should_close_ledger};
use meridian_core::{Action, ArbiterOutcome, Event, LedgerReplay, OutboundMessage};
use meridian_messages::{
    HaveTxSetGossip, NodeEvent, ProposalGossip, StatusChangeGossip, TransactionGossip,
    ValidationGossip,
};
use meridian_types::{
    is_flag_seq, next_close_resolution, round_close_time, CloseTime, Hash, KeyPair, Ledger,
    LedgerId, LedgerSeq, NodeId, Proposal, ProposeSeq, Transaction, TxSet, TxSetBuilder, TxSetId,
    Validation, ValidationContent, ValidatorRegistry,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Round phase; strictly forward-moving within a round. A view shift resets
/// the round to `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundPhase {
    Open,
    Establish,
    Finished,
    Accepted,
}

/// Statistics from the previous round, feeding this round's timing.
#[derive(Debug, Clone, Copy)]
pub struct PrevRoundStats {
    pub proposers: usize,
    pub duration: Duration,
}

impl Default for PrevRoundStats {
    fn default() -> Self {
        Self {
            proposers: 0,
            duration: Duration::from_secs(15),
        }
    }
}

/// Host-owned context the round reads each event.
#[derive(Debug)]
pub struct RoundContext<'a> {
    /// Transactions currently in the open ledger.
    pub open_txs: &'a [Transaction],
    /// Trusted-validation tally.
    pub tally: &'a ValidationTally,
    /// Closed ledgers the host holds, by id.
    pub held_ledgers: &'a HashMap<LedgerId, Arc<Ledger>>,
    /// Recent trusted proposals, replayed after a view shift.
    pub stored_proposals: &'a [Proposal],
    /// When the host last saw a ledger close (fallback close-time basis).
    pub last_close_time: CloseTime,
    /// The ledger our most recent validation endorsed.
    pub last_validation: Option<(LedgerId, LedgerSeq)>,
    /// Local load fee level to report in validations, if elevated.
    pub load_fee: Option<u32>,
    /// Ledger sequence range this node serves to peers.
    pub serve_range: (u64, u64),
}

/// A tx-set acquisition result, kept for the round's lifetime.
#[derive(Debug, Clone)]
enum AcquiredSet {
    Set(Arc<TxSet>),
    Failed,
}

/// Our evolving position. The signed proposal is derived on broadcast.
#[derive(Debug, Clone)]
struct OurPosition {
    tx_set: TxSetId,
    close_time: CloseTime,
    seq: ProposeSeq,
    bowed_out: bool,
}

/// The per-round consensus engine.
pub struct RoundState {
    config: ConsensusConfig,
    registry: Arc<ValidatorRegistry>,
    keys: Option<KeyPair>,
    strategy: RoundStrategy,

    phase: RoundPhase,
    proposing: bool,
    validating: bool,
    consensus_fail: bool,

    /// The prior closed ledger we hold.
    prev_ledger: Arc<Ledger>,
    /// The prior ledger id the network agrees on. Differs from
    /// `prev_ledger.id()` while we chase the correct one.
    prev_ledger_id: LedgerId,
    have_correct_lcl: bool,
    acquiring_ledger: Option<LedgerId>,

    close_resolution: u64,
    /// Our recorded close time, set when we close the open ledger.
    close_time: CloseTime,
    prev_round: PrevRoundStats,
    replay: Option<LedgerReplay>,

    our_position: Option<OurPosition>,
    acquired: HashMap<TxSetId, AcquiredSet>,
    compares: HashSet<TxSetId>,
    // Ordered maps keep action emission deterministic.
    peer_positions: BTreeMap<NodeId, Proposal>,
    peer_position_times: BTreeMap<NodeId, Duration>,
    disputes: BTreeMap<Hash, DisputedTx>,
    /// Close-time votes from initial proposals, for the clock nudge.
    close_time_votes: BTreeMap<u64, usize>,
    dead_nodes: HashSet<NodeId>,
    have_close_time_consensus: bool,
    relayed_disputes: HashSet<Hash>,
    partial_validation_sent: bool,

    /// Phase timer: reset at round start and again when the ledger closes.
    started_at: Duration,
    converge_duration: Duration,
    close_percent: u32,
    now: Duration,
    network_time: u64,

    new_ledger: Option<Arc<Ledger>>,
}

impl std::fmt::Debug for RoundState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundState")
            .field("phase", &self.phase)
            .field("building_seq", &self.building_seq())
            .field("prev_ledger_id", &self.prev_ledger_id)
            .field("have_correct_lcl", &self.have_correct_lcl)
            .field("proposing", &self.proposing)
            .field("peers", &self.peer_positions.len())
            .field("disputes", &self.disputes.len())
            .finish()
    }
}

impl RoundState {
    /// Begin a round on top of `prev_ledger`, targeting the network's
    /// `prev_ledger_id`. Returns the round plus start-up actions (ledger
    /// acquisition, replayed-proposal effects, a possible immediate tick).
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        config: ConsensusConfig,
        registry: Arc<ValidatorRegistry>,
        keys: Option<KeyPair>,
        synced: bool,
        prev_ledger: Arc<Ledger>,
        prev_ledger_id: LedgerId,
        prev_round: PrevRoundStats,
        replay: Option<LedgerReplay>,
        now: Duration,
        network_time: u64,
        ctx: &RoundContext<'_>,
    ) -> (Self, Vec<Action>) {
        let validating = keys.is_some();
        let proposing = validating && synced;
        let have_correct_lcl = prev_ledger.id() == prev_ledger_id;
        let close_resolution = next_close_resolution(
            prev_ledger.header.close_time_resolution,
            prev_ledger.header.close_agree,
            prev_ledger.seq().next(),
        );
        let strategy = RoundStrategy::for_kind(config.kind);

        info!(
            prev = %prev_ledger_id,
            seq = %prev_ledger.seq().next(),
            proposing,
            validating,
            "Entering consensus round"
        );

        let mut round = Self {
            config,
            registry,
            keys,
            strategy,
            phase: RoundPhase::Open,
            proposing,
            validating,
            consensus_fail: false,
            prev_ledger,
            prev_ledger_id,
            have_correct_lcl,
            acquiring_ledger: None,
            close_resolution,
            close_time: CloseTime::NONE,
            prev_round: PrevRoundStats {
                proposers: prev_round.proposers,
                duration: prev_round.duration.max(Duration::from_millis(1)),
            },
            replay,
            our_position: None,
            acquired: HashMap::new(),
            compares: HashSet::new(),
            peer_positions: BTreeMap::new(),
            peer_position_times: BTreeMap::new(),
            disputes: BTreeMap::new(),
            close_time_votes: BTreeMap::new(),
            dead_nodes: HashSet::new(),
            have_close_time_consensus: false,
            relayed_disputes: HashSet::new(),
            partial_validation_sent: false,
            started_at: now,
            converge_duration: Duration::ZERO,
            close_percent: 0,
            now,
            network_time,
            new_ledger: None,
        };

        let mut actions = Vec::new();
        if !round.have_correct_lcl {
            info!(correct = %prev_ledger_id, "Started without the correct prior ledger");
            actions.extend(round.handle_lcl(prev_ledger_id, ctx));
        }

        actions.extend(round.replay_stored(ctx));

        if round.peer_positions.len() > round.prev_round.proposers / 2 {
            // Most proposers already closed; we may be behind. Tick now.
            actions.push(Action::EnqueueInternal {
                event: Event::RoundTimer,
            });
        }

        (round, actions)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn prev_ledger_id(&self) -> LedgerId {
        self.prev_ledger_id
    }

    /// The prior closed ledger this round is working from.
    pub fn prev_ledger(&self) -> Arc<Ledger> {
        self.prev_ledger.clone()
    }

    /// Whether an announced set is one a tracked peer position references
    /// and we have not acquired.
    pub fn wants_tx_set(&self, id: &TxSetId) -> bool {
        !self.acquired.contains_key(id)
            && self.peer_positions.values().any(|p| p.tx_set() == *id)
    }

    /// The sequence of the ledger this round builds.
    pub fn building_seq(&self) -> LedgerSeq {
        self.prev_ledger.seq().next()
    }

    pub fn have_correct_lcl(&self) -> bool {
        self.have_correct_lcl
    }

    pub fn consensus_fail(&self) -> bool {
        self.consensus_fail
    }

    pub fn is_proposing(&self) -> bool {
        self.proposing
    }

    pub fn is_validating(&self) -> bool {
        self.validating
    }

    pub fn proposers(&self) -> usize {
        self.peer_positions.len()
    }

    pub fn dispute_count(&self) -> usize {
        self.disputes.len()
    }

    pub fn disputes(&self) -> impl Iterator<Item = &DisputedTx> {
        self.disputes.values()
    }

    pub fn peer_position(&self, peer: &NodeId) -> Option<&Proposal> {
        self.peer_positions.get(peer)
    }

    pub fn our_position(&self) -> Option<(TxSetId, CloseTime)> {
        self.our_position
            .as_ref()
            .map(|pos| (pos.tx_set, pos.close_time))
    }

    pub fn close_time(&self) -> CloseTime {
        self.close_time
    }

    pub fn converge_duration(&self) -> Duration {
        self.converge_duration
    }

    pub fn new_ledger(&self) -> Option<&Arc<Ledger>> {
        self.new_ledger.as_ref()
    }

    /// Disputed transactions we voted against; they seed the next open
    /// ledger as retriables.
    pub fn no_vote_disputes(&self) -> Vec<Transaction> {
        self.disputes
            .values()
            .filter(|dispute| !dispute.our_vote())
            .map(|dispute| dispute.transaction().clone())
            .collect()
    }

    /// Set the round's clocks. Called by the host before each event.
    pub fn set_now(&mut self, now: Duration, network_time: u64) {
        self.now = now;
        self.network_time = network_time;
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tick driving
    // ═══════════════════════════════════════════════════════════════════════

    /// The only driver of phase transitions.
    pub fn on_tick(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.phase != RoundPhase::Finished && self.phase != RoundPhase::Accepted {
            actions.extend(self.check_lcl(ctx));
        }

        let elapsed = self.now.saturating_sub(self.started_at);
        self.close_percent =
            (elapsed.as_millis() * 100 / self.prev_round.duration.as_millis().max(1)) as u32;

        match self.phase {
            RoundPhase::Open => {
                if self.have_correct_lcl {
                    actions.extend(self.pre_close(ctx));
                }
            }
            RoundPhase::Establish => {
                if elapsed >= self.config.min_consensus {
                    actions.extend(self.establish(ctx));
                }
            }
            // Ledger application is in flight; its completion event moves
            // the round forward.
            RoundPhase::Finished => {}
            RoundPhase::Accepted => {}
        }

        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Open → Establish: close decision
    // ═══════════════════════════════════════════════════════════════════════

    fn pre_close(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        let any_transactions = !ctx.open_txs.is_empty();
        let proposers_closed = self.peer_positions.len();
        let proposers_validated = ctx.tally.count(&self.prev_ledger_id);

        // Time since the previous ledger's close. Use the consensus close
        // time when it was agreed, otherwise the close we observed locally.
        let header = &self.prev_ledger.header;
        let previous_close_correct = self.have_correct_lcl
            && header.close_agree
            && header.close_time != header.parent_close_time.plus_secs(1);
        let close_basis = if previous_close_correct {
            header.close_time
        } else {
            ctx.last_close_time
        };
        let since_close_ms = (self.network_time as i64 - close_basis.0 as i64) * 1000;

        let idle_interval_ms = self
            .config
            .idle_interval
            .as_millis()
            .max(2 * self.close_resolution as u128 * 1000) as u64;
        let open_ms = self.now.saturating_sub(self.started_at).as_millis() as u64;

        if should_close_ledger(
            any_transactions,
            self.prev_round.proposers,
            proposers_closed,
            proposers_validated,
            self.prev_round.duration.as_millis() as u64,
            since_close_ms,
            open_ms,
            idle_interval_ms,
            self.config.min_close.as_millis() as u64,
        ) {
            self.close_ledger(ctx)
        } else {
            Vec::new()
        }
    }

    fn close_ledger(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        let mut actions = self.check_our_validation(ctx);

        self.phase = RoundPhase::Establish;
        self.started_at = self.now;
        self.close_time = CloseTime(self.network_time);

        info!(close_time = %self.close_time, "Closing ledger");
        let prev = self.prev_ledger.clone();
        actions.push(self.status_change(NodeEvent::ClosingLedger, &prev, ctx));
        actions.extend(self.take_initial_position(ctx));
        actions
    }

    fn take_initial_position(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        let mut builder = TxSetBuilder::new();
        for tx in ctx.open_txs {
            builder.insert(tx.clone());
        }

        let building_seq = self.building_seq();
        if self.proposing && self.have_correct_lcl && is_flag_seq(building_seq) {
            // Flag ledger: carry our fee and amendment votes.
            builder.insert(Transaction::fee_vote(building_seq.0, &self.config.fee_vote));
            for amendment in &self.config.amendments {
                builder.insert(Transaction::amendment_vote(building_seq.0, amendment));
            }
        }

        let set = Arc::new(builder.seal());
        info!(position = %set.id().0, txs = set.len(), "Taking initial position");

        let mut actions = self.install_set(set.clone(), true);

        self.our_position = Some(OurPosition {
            tx_set: set.id(),
            close_time: self.close_time,
            seq: ProposeSeq::INITIAL,
            bowed_out: false,
        });

        // Align dispute votes with the snapshot (disputes may already exist
        // from replayed rounds).
        for dispute in self.disputes.values_mut() {
            dispute.set_our_vote(set.contains(&dispute.id()));
        }

        // Any peer already on a contrary acquired position creates disputes.
        let mut seen = HashSet::new();
        let peer_sets: Vec<Arc<TxSet>> = self
            .peer_positions
            .values()
            .filter(|p| p.tx_set() != set.id() && seen.insert(p.tx_set()))
            .filter_map(|p| match self.acquired.get(&p.tx_set()) {
                Some(AcquiredSet::Set(peer_set)) => Some(peer_set.clone()),
                _ => None,
            })
            .collect();
        for peer_set in peer_sets {
            if self.compares.insert(peer_set.id()) {
                actions.extend(self.create_disputes(&set, &peer_set));
            }
        }

        actions.extend(self.propose());
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Establish: position updates and convergence
    // ═══════════════════════════════════════════════════════════════════════

    fn establish(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        match self.strategy {
            RoundStrategy::Avalanche => self.establish_builtin(ctx),
            RoundStrategy::Arbiter(_) => self.establish_arbiter(),
        }
    }

    fn establish_builtin(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        let mut actions = self.update_our_positions();

        if !self.have_tx_consensus(ctx) {
            return actions;
        }
        if !self.have_close_time_consensus {
            info!("We have TX consensus but not CT consensus");
            return actions;
        }

        info!(participants = self.peer_positions.len(), "Converge cutoff");
        actions.extend(self.begin_accept());
        actions
    }

    /// The avalanche convergence test: enough peers share our position and
    /// the close time is agreed.
    fn have_tx_consensus(&self, ctx: &RoundContext<'_>) -> bool {
        let Some(position) = &self.our_position else {
            return false;
        };
        let agreeing_peers = self
            .peer_positions
            .values()
            .filter(|p| p.tx_set() == position.tx_set)
            .count();
        let moved_on = ctx.tally.moved_on(self.prev_ledger.seq());

        check_consensus(
            self.prev_round.proposers,
            self.peer_positions.len(),
            agreeing_peers + 1, // ourselves
            moved_on,
            self.prev_round.duration.as_millis() as u64,
            self.now.saturating_sub(self.started_at).as_millis() as u64,
            self.config.min_consensus.as_millis() as u64,
            self.config.converge_pct,
            self.config.min_proposers,
        )
    }

    /// Recompute our dispute votes and close-time agreement, publishing a
    /// new position when either changed.
    fn update_our_positions(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        let Some(position) = self.our_position.clone() else {
            return actions;
        };

        // Sweep stale peer positions; their votes no longer count.
        let cutoff = self.now.saturating_sub(self.config.propose_freshness);
        let stale: Vec<NodeId> = self
            .peer_position_times
            .iter()
            .filter(|(_, &seen)| seen < cutoff)
            .map(|(peer, _)| *peer)
            .collect();
        for peer in stale {
            debug!(?peer, "Sweeping stale peer position");
            for dispute in self.disputes.values_mut() {
                dispute.unvote(&peer);
            }
            self.peer_positions.remove(&peer);
            self.peer_position_times.remove(&peer);
        }

        // Bucket fresh close times at the current resolution.
        let mut buckets: BTreeMap<u64, usize> = BTreeMap::new();
        for proposal in self.peer_positions.values() {
            let bucket = round_close_time(proposal.close_time(), self.close_resolution).0;
            *buckets.entry(bucket).or_default() += 1;
        }

        // Update disputed-transaction votes against the rising threshold.
        let mut new_set: Option<TxSetBuilder> = None;
        let our_set = match self.acquired.get(&position.tx_set) {
            Some(AcquiredSet::Set(set)) => set.clone(),
            _ => {
                // Transient: our set is re-acquiring after an adopted
                // position; position work resumes when it lands.
                debug!(position = %position.tx_set.0, "Own position set not acquired yet");
                return actions;
            }
        };
        for dispute in self.disputes.values_mut() {
            if dispute.update_vote(self.close_percent, self.proposing, &self.config.avalanche) {
                let builder = new_set.get_or_insert_with(|| our_set.to_builder());
                if dispute.our_vote() {
                    builder.insert(dispute.transaction().clone());
                } else {
                    builder.remove(&dispute.id());
                }
            }
        }

        // Close-time agreement.
        let our_rounded = round_close_time(position.close_time, self.close_resolution);
        let mut close_time = our_rounded;
        if self.peer_positions.is_empty() {
            self.have_close_time_consensus = true;
        } else {
            let mut participants = self.peer_positions.len();
            if self.proposing {
                *buckets.entry(our_rounded.0).or_default() += 1;
                participants += 1;
            }
            let needed_weight = self.config.avalanche.required_pct(self.close_percent);
            let thresh_vote = participants_needed(participants, needed_weight);
            let thresh_consensus =
                participants_needed(participants, self.config.close_time_converge_pct);

            let best = buckets
                .iter()
                .max_by_key(|(_, &count)| count)
                .map(|(&bucket, &count)| (bucket, count));
            if let Some((bucket, count)) = best {
                if count >= thresh_vote {
                    close_time = CloseTime(bucket);
                }
                self.have_close_time_consensus = count >= thresh_consensus;
                trace!(
                    bucket,
                    count,
                    thresh_vote,
                    thresh_consensus,
                    agreed = self.have_close_time_consensus,
                    "Close time tally"
                );
            } else {
                self.have_close_time_consensus = false;
            }
        }

        // Publish when the set or close time moved.
        let set_changed = new_set.is_some();
        let close_changed = close_time != our_rounded;
        if (set_changed || close_changed) && !position.bowed_out {
            let sealed = new_set.map(|builder| Arc::new(builder.seal()));
            let new_id = sealed.as_ref().map(|set| set.id()).unwrap_or(position.tx_set);
            {
                let our = self.our_position.as_mut().expect("position checked above");
                our.tx_set = new_id;
                our.close_time = close_time;
                our.seq = our.seq.next();
            }
            debug!(position = %new_id.0, close_time = %close_time, "Position changed");
            if let Some(set) = sealed {
                actions.extend(self.install_set(set, true));
            }
            actions.extend(self.propose());
        }

        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Establish: external arbiter variant
    // ═══════════════════════════════════════════════════════════════════════

    fn establish_arbiter(&mut self) -> Vec<Action> {
        // The arbiter record carries the close time; no tally runs.
        self.have_close_time_consensus = true;

        let Some(position) = self.our_position.clone() else {
            return Vec::new();
        };
        if position.bowed_out {
            return Vec::new();
        }

        let RoundStrategy::Arbiter(progress) = &self.strategy else {
            return Vec::new();
        };
        let (pending_adopt, agreed, in_flight) =
            (progress.pending_adopt, progress.agreed, progress.in_flight);

        // Retry a pending adoption whose set has since arrived.
        if let Some((tx_set, close_time)) = pending_adopt {
            return match self.acquired.get(&tx_set) {
                Some(AcquiredSet::Set(_)) => {
                    self.with_progress(|p| {
                        p.pending_adopt = None;
                        p.agreed = true;
                    });
                    self.adopt_position(tx_set, close_time);
                    self.begin_accept()
                }
                Some(AcquiredSet::Failed) => {
                    // Unacquirable published set: we cannot adopt, so we
                    // cannot validate this round.
                    warn!(set = %tx_set.0, "Published set unacquirable");
                    self.with_progress(|p| p.pending_adopt = None);
                    self.consensus_fail = true;
                    self.begin_accept()
                }
                None => Vec::new(),
            };
        }

        if agreed {
            return self.begin_accept();
        }

        if !in_flight {
            self.with_progress(|p| p.in_flight = true);
            debug!(seq = %self.building_seq(), "Publishing position to arbiter");
            return vec![Action::PublishPosition {
                seq: self.building_seq(),
                prev_ledger: self.prev_ledger_id,
                tx_set: position.tx_set,
                close_time: position.close_time,
            }];
        }

        Vec::new()
    }

    fn with_progress(&mut self, update: impl FnOnce(&mut crate::strategy::ArbiterProgress)) {
        if let RoundStrategy::Arbiter(progress) = &mut self.strategy {
            update(progress);
        }
    }

    /// Handle the arbiter's answer to our publish.
    pub fn on_arbiter_response(&mut self, seq: LedgerSeq, outcome: ArbiterOutcome) -> Vec<Action> {
        if seq != self.building_seq() || self.phase != RoundPhase::Establish {
            debug!(%seq, "Stale arbiter response");
            return Vec::new();
        }
        if !matches!(self.strategy, RoundStrategy::Arbiter(_)) {
            warn!("Arbiter response under builtin consensus");
            return Vec::new();
        }
        self.with_progress(|p| p.in_flight = false);

        match outcome {
            ArbiterOutcome::Agreed => {
                info!("Arbiter agreed with our position");
                self.with_progress(|p| p.agreed = true);
                self.begin_accept()
            }
            ArbiterOutcome::Exists {
                tx_set,
                close_time,
            } => match self.acquired.get(&tx_set) {
                Some(AcquiredSet::Set(_)) => {
                    info!(set = %tx_set.0, "Adopting published position");
                    self.with_progress(|p| p.agreed = true);
                    self.adopt_position(tx_set, close_time);
                    self.begin_accept()
                }
                _ => {
                    info!(set = %tx_set.0, "Published set not acquired, fetching");
                    self.with_progress(|p| p.pending_adopt = Some((tx_set, close_time)));
                    vec![Action::AcquireTxSet { id: tx_set }]
                }
            },
            ArbiterOutcome::Retry => {
                debug!("Arbiter asked us to retry");
                Vec::new()
            }
            ArbiterOutcome::Error => {
                // We are stale relative to the published record: accept the
                // round without emitting a validation.
                warn!("Arbiter reports a conflicting prior ledger");
                self.consensus_fail = true;
                self.begin_accept()
            }
        }
    }

    fn adopt_position(&mut self, tx_set: TxSetId, close_time: CloseTime) {
        if let Some(position) = self.our_position.as_mut() {
            if position.tx_set != tx_set || position.close_time != close_time {
                position.tx_set = tx_set;
                position.close_time = close_time;
                position.seq = position.seq.next();
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Acceptance
    // ═══════════════════════════════════════════════════════════════════════

    /// Convergence reached: dispatch ledger application and enter finished.
    fn begin_accept(&mut self) -> Vec<Action> {
        let Some(position) = self.our_position.clone() else {
            error!("Converged without a position");
            return vec![Action::ReportFault {
                description: "converged without a position".to_string(),
            }];
        };
        let set = match self.acquired.get(&position.tx_set) {
            Some(AcquiredSet::Set(set)) => set.clone(),
            _ => {
                error!(set = %position.tx_set.0, "We don't have a consensus set");
                return vec![Action::ReportFault {
                    description: "consensus set not acquired".to_string(),
                }];
            }
        };

        self.phase = RoundPhase::Finished;
        self.converge_duration = self.now.saturating_sub(self.started_at);

        let parent_close = self.prev_ledger.header.close_time;
        let (close_time, close_agree) = match &self.replay {
            Some(replay) => (replay.close_time, replay.close_agree),
            None => {
                if position.close_time.is_none() {
                    // We agreed to disagree on the close time.
                    (parent_close.plus_secs(1), false)
                } else {
                    let rounded = round_close_time(position.close_time, self.close_resolution);
                    (rounded.max(parent_close.plus_secs(1)), true)
                }
            }
        };

        debug!(
            set = %set.id().0,
            %close_time,
            close_agree,
            "Dispatching ledger application"
        );
        vec![Action::ApplyTransactions {
            parent: self.prev_ledger.clone(),
            tx_set: set,
            close_time,
            close_agree,
            close_resolution: self.close_resolution,
            replay: self.replay.clone(),
        }]
    }

    /// Ledger application completed: finalize the round.
    pub fn on_ledger_applied(
        &mut self,
        prev_ledger: LedgerId,
        ledger: Arc<Ledger>,
        ctx: &RoundContext<'_>,
    ) -> Vec<Action> {
        if prev_ledger != self.prev_ledger_id || self.phase != RoundPhase::Finished {
            debug!(%prev_ledger, "Discarding stale application result");
            return Vec::new();
        }

        let mut actions = vec![Action::PersistLedger {
            ledger: ledger.clone(),
        }];
        actions.push(self.status_change(NodeEvent::AcceptedLedger, &ledger, ctx));

        debug!(
            proposing = self.proposing,
            validating = self.validating,
            correct_lcl = self.have_correct_lcl,
            fail = self.consensus_fail,
            new_ledger = %ledger.id(),
            "Round report"
        );

        if self.validating && self.have_correct_lcl && !self.consensus_fail {
            actions.extend(self.emit_validation(&ledger, ctx));
        } else {
            info!(ledger = %ledger.id(), "Built ledger without validating");
        }

        if self.validating {
            actions.push(self.clock_nudge());
        }

        self.new_ledger = Some(ledger.clone());
        self.phase = RoundPhase::Accepted;
        actions.push(Action::RoundComplete {
            ledger_id: ledger.id(),
            seq: ledger.seq(),
            proposers: self.peer_positions.len(),
            duration: self.converge_duration,
            have_correct_lcl: self.have_correct_lcl,
        });
        actions
    }

    fn emit_validation(&self, ledger: &Ledger, ctx: &RoundContext<'_>) -> Vec<Action> {
        let Some(keys) = &self.keys else {
            return Vec::new();
        };
        let flag = is_flag_seq(ledger.seq());
        let validation = Validation::sign(
            keys,
            ValidationContent {
                ledger_id: ledger.id(),
                ledger_seq: ledger.seq(),
                sign_time: self.network_time,
                full: true,
                load_fee: ctx.load_fee,
                fee_vote: flag.then_some(self.config.fee_vote),
                amendments: if flag {
                    self.config.amendments.clone()
                } else {
                    Vec::new()
                },
            },
        );
        info!(ledger = %ledger.id(), "CNF Val");
        vec![Action::Broadcast {
            message: OutboundMessage::Validation(ValidationGossip::new(validation)),
        }]
    }

    /// Compare our close time with the network's votes and nudge the clock
    /// toward the weighted mean.
    fn clock_nudge(&self) -> Action {
        let mut close_total = self.close_time.0 as u128;
        let mut close_count = 1u128;
        for (&vote, &count) in &self.close_time_votes {
            trace!(vote, count, "Close time vote");
            close_count += count as u128;
            close_total += vote as u128 * count as u128;
        }
        close_total += close_count / 2;
        close_total /= close_count;
        let offset = close_total as i64 - self.close_time.0 as i64;
        info!(offset, votes = close_count as u64, "Close time offset estimated");
        Action::AdjustClock {
            offset_secs: offset,
        }
    }

    /// Ledger application failed on the authenticated tree: abandon.
    pub fn on_apply_failed(&mut self, prev_ledger: LedgerId, missing_node: bool) -> Vec<Action> {
        if prev_ledger != self.prev_ledger_id {
            return Vec::new();
        }
        error!(missing_node, "Ledger application failed, abandoning round");
        let mut actions = self.leave_consensus();
        actions.push(Action::ReportFault {
            description: if missing_node {
                "missing node during ledger application".to_string()
            } else {
                "ledger application failed".to_string()
            },
        });
        actions
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Peer proposals
    // ═══════════════════════════════════════════════════════════════════════

    pub fn on_proposal(&mut self, proposal: Proposal) -> Vec<Action> {
        let peer = proposal.peer();
        if !self.registry.is_trusted(&peer) {
            trace!(?peer, "Proposal from untrusted node");
            return Vec::new();
        }
        if !proposal.verify() {
            debug!(?peer, "Proposal signature invalid");
            return Vec::new();
        }
        if !proposal.extends(&self.prev_ledger_id) {
            trace!(?peer, prev = %proposal.prev_ledger(), "Proposal for another prior ledger");
            return Vec::new();
        }
        if self.dead_nodes.contains(&peer) {
            info!(?peer, "Position from dead node");
            return Vec::new();
        }
        if let Some(current) = self.peer_positions.get(&peer) {
            if proposal.seq() <= current.seq() {
                trace!(?peer, seq = proposal.seq().0, "Stale proposal");
                return Vec::new();
            }
        }

        if proposal.is_bow_out() {
            info!(?peer, "Peer bows out");
            for dispute in self.disputes.values_mut() {
                dispute.unvote(&peer);
            }
            self.peer_positions.remove(&peer);
            self.peer_position_times.remove(&peer);
            self.dead_nodes.insert(peer);
            return Vec::new();
        }

        if proposal.is_initial() {
            // Record the close time estimate.
            trace!(close_time = %proposal.close_time(), "Peer reports close time");
            *self
                .close_time_votes
                .entry(proposal.close_time().0)
                .or_default() += 1;
        }

        trace!(?peer, seq = proposal.seq().0, set = %proposal.tx_set().0, "Processing peer proposal");
        let set_id = proposal.tx_set();
        self.peer_positions.insert(peer, proposal);
        self.peer_position_times.insert(peer, self.now);

        match self.acquired.get(&set_id) {
            Some(AcquiredSet::Set(set)) => {
                for dispute in self.disputes.values_mut() {
                    dispute.set_vote(peer, set.contains(&dispute.id()));
                }
                Vec::new()
            }
            Some(AcquiredSet::Failed) => Vec::new(),
            None => {
                debug!(set = %set_id.0, "Don't have tx set for peer");
                vec![Action::AcquireTxSet { id: set_id }]
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Tx-set acquisition and disputes
    // ═══════════════════════════════════════════════════════════════════════

    pub fn on_tx_set_acquired(&mut self, set: Arc<TxSet>) -> Vec<Action> {
        debug!(set = %set.id().0, "We have acquired tx set");
        self.install_set(set, false)
    }

    pub fn on_tx_set_unavailable(&mut self, id: TxSetId) -> Vec<Action> {
        warn!(set = %id.0, "Tx set unavailable or invalid");
        self.acquired.entry(id).or_insert(AcquiredSet::Failed);
        Vec::new()
    }

    /// Register a set for the round: publish availability, create disputes
    /// against our position, and refresh the votes of peers proposing it.
    fn install_set(&mut self, set: Arc<TxSet>, locally_built: bool) -> Vec<Action> {
        let id = set.id();
        if let Some(AcquiredSet::Set(_)) = self.acquired.get(&id) {
            return Vec::new();
        }
        // A previous failure is superseded by the real set.
        self.acquired.remove(&id);

        let mut actions = Vec::new();
        if locally_built {
            actions.push(Action::ShareTxSet { set: set.clone() });
        }
        actions.push(Action::Broadcast {
            message: OutboundMessage::HaveTxSet(HaveTxSetGossip::have(id)),
        });

        let position = self.our_position.clone();
        match &position {
            Some(position)
                if !position.bowed_out
                    && id != position.tx_set
                    && !self.compares.contains(&id) =>
            {
                match self.acquired.get(&position.tx_set) {
                    Some(AcquiredSet::Set(ours)) => {
                        let ours = ours.clone();
                        self.compares.insert(id);
                        actions.extend(self.create_disputes(&ours, &set));
                    }
                    _ => warn!("Not creating disputes: own position set missing"),
                }
            }
            Some(position) if position.bowed_out => {
                warn!("Not creating disputes: not participating")
            }
            Some(_) => debug!("Not creating disputes: identical position"),
            None => debug!("Not creating disputes: no position yet"),
        }

        self.acquired.insert(id, AcquiredSet::Set(set.clone()));

        // Adjust tracking for each peer that takes this position.
        let peers: Vec<NodeId> = self
            .peer_positions
            .values()
            .filter(|p| p.tx_set() == id)
            .map(|p| p.peer())
            .collect();
        if peers.is_empty() && !locally_built {
            warn!(set = %id.0, "By the time we got the set no peers were proposing it");
        }
        for dispute in self.disputes.values_mut() {
            let set_has = set.contains(&dispute.id());
            for peer in &peers {
                dispute.set_vote(*peer, set_has);
            }
        }

        actions
    }

    fn create_disputes(&mut self, ours: &TxSet, theirs: &TxSet) -> Vec<Action> {
        let differences = ours.compare(theirs);
        debug!(
            ours = %ours.id().0,
            theirs = %theirs.id().0,
            count = differences.len(),
            "Differences found"
        );
        let mut actions = Vec::new();
        for difference in differences.into_values() {
            actions.extend(self.add_disputed(difference.transaction().clone()));
        }
        actions
    }

    fn add_disputed(&mut self, tx: Transaction) -> Vec<Action> {
        let tx_id = tx.id();
        if self.disputes.contains_key(&tx_id) {
            return Vec::new();
        }
        debug!(tx = ?tx_id, "Transaction is disputed");

        let our_vote = match &self.our_position {
            Some(position) => match self.acquired.get(&position.tx_set) {
                Some(AcquiredSet::Set(ours)) => ours.contains(&tx_id),
                _ => false,
            },
            None => false,
        };

        let mut dispute = DisputedTx::new(tx.clone(), our_vote);
        for (peer, proposal) in &self.peer_positions {
            if let Some(AcquiredSet::Set(set)) = self.acquired.get(&proposal.tx_set()) {
                dispute.set_vote(*peer, set.contains(&tx_id));
            }
        }
        self.disputes.insert(tx_id, dispute);

        // Relay the disputed transaction once per round.
        if self.relayed_disputes.insert(tx_id) {
            return vec![Action::Broadcast {
                message: OutboundMessage::Transaction(TransactionGossip::new(
                    tx,
                    self.network_time,
                )),
            }];
        }
        Vec::new()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Prior-ledger view management
    // ═══════════════════════════════════════════════════════════════════════

    fn check_lcl(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        let parent = if self.have_correct_lcl {
            // Don't jump back past our parent.
            Some(self.prev_ledger.header.parent_id)
        } else {
            None
        };
        let (winner, count) =
            ctx.tally
                .preferred(self.prev_ledger_id, parent, self.prev_ledger.seq());

        if winner != self.prev_ledger_id {
            warn!(
                phase = ?self.phase,
                count,
                from = %self.prev_ledger_id,
                to = %winner,
                correct = self.have_correct_lcl,
                "View of consensus changed"
            );
            self.handle_lcl(winner, ctx)
        } else if self.prev_ledger.id() != self.prev_ledger_id {
            // Still chasing the ledger the network is on.
            self.handle_lcl(winner, ctx)
        } else {
            Vec::new()
        }
    }

    /// Switch to a new prior ledger: bow out, clear round state, replay
    /// proposals, and acquire the ledger if we don't hold it.
    fn handle_lcl(&mut self, new_lcl: LedgerId, ctx: &RoundContext<'_>) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.prev_ledger_id != new_lcl {
            // First time seeing this ledger: reset the round.
            self.prev_ledger_id = new_lcl;

            if self.have_correct_lcl && self.proposing && self.our_position.is_some() {
                info!("Bowing out of consensus");
                actions.extend(self.leave_consensus());
            }
            self.proposing = false;
            self.our_position = None;
            self.peer_positions.clear();
            self.peer_position_times.clear();
            self.disputes.clear();
            self.compares.clear();
            self.close_time_votes.clear();
            self.dead_nodes.clear();
            self.have_close_time_consensus = false;
            self.strategy.reset();
            self.phase = RoundPhase::Open;
            self.started_at = self.now;

            // To get back in sync:
            actions.extend(self.replay_stored(ctx));
        }

        if self.prev_ledger.id() == self.prev_ledger_id {
            self.have_correct_lcl = true;
            return actions;
        }

        // We need to switch the ledger we're working from.
        match ctx.held_ledgers.get(&self.prev_ledger_id) {
            Some(ledger) => {
                self.adopt_prev_ledger(ledger.clone());
            }
            None => {
                if self.acquiring_ledger != Some(self.prev_ledger_id) {
                    warn!(ledger = %self.prev_ledger_id, "Need consensus ledger");
                    self.acquiring_ledger = Some(self.prev_ledger_id);
                    self.have_correct_lcl = false;
                    actions.push(Action::AcquireLedger {
                        id: self.prev_ledger_id,
                    });
                }
            }
        }
        actions
    }

    /// The acquisition subsystem delivered a ledger.
    pub fn on_ledger_acquired(&mut self, ledger: Arc<Ledger>) -> Vec<Action> {
        if ledger.id() == self.prev_ledger_id && self.prev_ledger.id() != self.prev_ledger_id {
            self.adopt_prev_ledger(ledger);
        }
        Vec::new()
    }

    fn adopt_prev_ledger(&mut self, ledger: Arc<Ledger>) {
        info!(ledger = %ledger.id(), "Have the consensus ledger");
        self.close_resolution = next_close_resolution(
            ledger.header.close_time_resolution,
            ledger.header.close_agree,
            ledger.seq().next(),
        );
        self.prev_ledger = ledger;
        self.have_correct_lcl = true;
        self.acquiring_ledger = None;
    }

    fn replay_stored(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        let mut actions = Vec::new();
        for proposal in ctx.stored_proposals {
            if proposal.extends(&self.prev_ledger_id) {
                actions.extend(self.on_proposal(proposal.clone()));
            }
        }
        actions
    }

    /// Send a partial validation when we hold the right ledger but our last
    /// validation predates it, so the network can see we are alive.
    fn check_our_validation(&mut self, ctx: &RoundContext<'_>) -> Vec<Action> {
        if !self.have_correct_lcl || self.partial_validation_sent {
            return Vec::new();
        }
        let Some(keys) = &self.keys else {
            return Vec::new();
        };
        if let Some((ledger_id, seq)) = ctx.last_validation {
            if seq == self.prev_ledger.seq() || ledger_id == self.prev_ledger_id {
                return Vec::new();
            }
        } else {
            // Never validated anything; the first full validation follows
            // the first accepted ledger.
            return Vec::new();
        }

        self.partial_validation_sent = true;
        let validation = Validation::sign(
            keys,
            ValidationContent {
                ledger_id: self.prev_ledger.id(),
                ledger_seq: self.prev_ledger.seq(),
                sign_time: self.network_time,
                full: false,
                load_fee: ctx.load_fee,
                fee_vote: None,
                amendments: Vec::new(),
            },
        );
        warn!(ledger = %self.prev_ledger.id(), "Sending partial validation");
        vec![Action::Broadcast {
            message: OutboundMessage::Validation(ValidationGossip::new(validation)),
        }]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Broadcast helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn propose(&self) -> Vec<Action> {
        if !self.proposing {
            return Vec::new();
        }
        let (Some(keys), Some(position)) = (&self.keys, &self.our_position) else {
            return Vec::new();
        };
        let proposal = if position.bowed_out {
            trace!("We propose: bow out");
            Proposal::new(
                keys,
                self.prev_ledger_id,
                TxSetId::NONE,
                CloseTime::NONE,
                ProposeSeq::BOW_OUT,
            )
        } else {
            trace!(position = %position.tx_set.0, "We propose");
            Proposal::new(
                keys,
                self.prev_ledger_id,
                position.tx_set,
                position.close_time,
                position.seq,
            )
        };
        vec![Action::Broadcast {
            message: OutboundMessage::Proposal(ProposalGossip::new(proposal)),
        }]
    }

    fn leave_consensus(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.proposing {
            let bowing_out = match self.our_position.as_mut() {
                Some(position) if !position.bowed_out => {
                    position.bowed_out = true;
                    true
                }
                _ => false,
            };
            if bowing_out {
                actions.extend(self.propose());
            }
            self.proposing = false;
        }
        actions
    }

    fn status_change(
        &self,
        event: NodeEvent,
        ledger: &Ledger,
        ctx: &RoundContext<'_>,
    ) -> Action {
        let event = if self.have_correct_lcl {
            event
        } else {
            NodeEvent::LostSync
        };
        Action::Broadcast {
            message: OutboundMessage::StatusChange(StatusChangeGossip {
                event,
                ledger_seq: ledger.seq(),
                network_time: self.network_time,
                prev_ledger: ledger.header.parent_id,
                ledger: ledger.id(),
                first_seq: ctx.serve_range.0,
                last_seq: ctx.serve_range.1,
            }),
        }
    }
}
