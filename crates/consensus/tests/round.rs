//! Round state machine integration tests.
//!
//! These drive a single `RoundState` directly with proposals, acquisitions,
//! and ticks, checking the protocol properties the round must uphold.

use meridian_consensus::{
    ConsensusConfig, ConsensusKind, PrevRoundStats, RoundContext, RoundPhase, RoundState,
    ValidationTally,
};
use meridian_core::{Action, ArbiterOutcome, OutboundMessage};
use meridian_types::test_utils::{test_keypair, test_transaction};
use meridian_types::{
    CloseTime, Hash, Ledger, LedgerHeader, LedgerId, LedgerSeq, Proposal, ProposeSeq, Transaction,
    TxSet, TxSetBuilder, TxSetId, ValidatorRegistry,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SELF_SEED: u8 = 0;

macro_rules! ctx {
    ($h:expr) => {
        RoundContext {
            open_txs: &$h.open_txs,
            tally: &$h.tally,
            held_ledgers: &$h.ledgers,
            stored_proposals: &$h.stored,
            last_close_time: $h.last_close_time,
            last_validation: None,
            load_fee: None,
            serve_range: (0, 0),
        }
    };
}

struct Harness {
    round: RoundState,
    tally: ValidationTally,
    ledgers: HashMap<LedgerId, Arc<Ledger>>,
    open_txs: Vec<Transaction>,
    stored: Vec<Proposal>,
    last_close_time: CloseTime,
    now: Duration,
    network_time: u64,
}

impl Harness {
    fn new(kind: ConsensusKind, prev: Ledger) -> Self {
        let prev = Arc::new(prev);
        let registry = Arc::new(ValidatorRegistry::from_keys(
            (0u8..=16).map(|seed| test_keypair(seed).public_key()),
        ));
        let mut ledgers = HashMap::new();
        ledgers.insert(prev.id(), prev.clone());

        let tally = ValidationTally::new();
        let open_txs: Vec<Transaction> = Vec::new();
        let stored: Vec<Proposal> = Vec::new();
        let last_close_time = prev.header.close_time;
        let now = Duration::from_secs(1);
        let network_time = prev.header.close_time.0 + 5;

        let config = ConsensusConfig {
            kind,
            ..ConsensusConfig::default()
        };
        let ctx = RoundContext {
            open_txs: &open_txs,
            tally: &tally,
            held_ledgers: &ledgers,
            stored_proposals: &stored,
            last_close_time,
            last_validation: None,
            load_fee: None,
            serve_range: (0, 0),
        };
        let (round, _) = RoundState::start(
            config,
            registry,
            Some(test_keypair(SELF_SEED)),
            true,
            prev.clone(),
            prev.id(),
            PrevRoundStats::default(),
            None,
            now,
            network_time,
            &ctx,
        );

        Self {
            round,
            tally,
            ledgers,
            open_txs,
            stored,
            last_close_time,
            now,
            network_time,
        }
    }

    fn genesis() -> Ledger {
        Ledger::genesis(CloseTime(1000))
    }

    fn advance(&mut self, duration: Duration) {
        self.now += duration;
        self.network_time += duration.as_secs();
        self.round.set_now(self.now, self.network_time);
    }

    fn tick(&mut self) -> Vec<Action> {
        self.round.set_now(self.now, self.network_time);
        let ctx = ctx!(self);
        self.round.on_tick(&ctx)
    }

    /// Put a transaction in the open ledger and drive the round to close.
    fn close_with(&mut self, txs: &[Transaction]) {
        self.open_txs = txs.to_vec();
        self.advance(Duration::from_millis(2_500));
        self.tick();
        assert_eq!(self.round.phase(), RoundPhase::Establish);
    }

    fn propose(
        &mut self,
        seed: u8,
        tx_set: TxSetId,
        close_time: CloseTime,
        seq: ProposeSeq,
    ) -> Vec<Action> {
        let proposal = Proposal::new(
            &test_keypair(seed),
            self.round.prev_ledger_id(),
            tx_set,
            close_time,
            seq,
        );
        self.round.set_now(self.now, self.network_time);
        self.round.on_proposal(proposal)
    }

    fn bow_out(&mut self, seed: u8) -> Vec<Action> {
        self.propose(seed, TxSetId::NONE, CloseTime::NONE, ProposeSeq::BOW_OUT)
    }

    fn give_set(&mut self, set: &Arc<TxSet>) -> Vec<Action> {
        self.round.on_tx_set_acquired(set.clone())
    }

    /// Build the ledger an `ApplyTransactions` action describes and feed it
    /// back, returning the finalization actions.
    fn apply(&mut self, actions: &[Action]) -> Vec<Action> {
        let apply = actions
            .iter()
            .find_map(|action| match action {
                Action::ApplyTransactions {
                    parent,
                    tx_set,
                    close_time,
                    close_agree,
                    close_resolution,
                    ..
                } => Some((
                    parent.clone(),
                    tx_set.clone(),
                    *close_time,
                    *close_agree,
                    *close_resolution,
                )),
                _ => None,
            })
            .expect("no ApplyTransactions action");
        let (parent, tx_set, close_time, close_agree, close_resolution) = apply;
        let ledger = Arc::new(Ledger {
            header: LedgerHeader {
                seq: parent.seq().next(),
                parent_id: parent.id(),
                tx_set_id: tx_set.id(),
                close_time,
                close_time_resolution: close_resolution,
                close_agree,
                parent_close_time: parent.header.close_time,
            },
            transactions: tx_set.canonical_order(),
        });
        let prev_id = self.round.prev_ledger_id();
        let ctx = ctx!(self);
        self.round.on_ledger_applied(prev_id, ledger, &ctx)
    }
}

fn sealed(txs: &[Transaction]) -> Arc<TxSet> {
    let mut builder = TxSetBuilder::new();
    for tx in txs {
        builder.insert(tx.clone());
    }
    Arc::new(builder.seal())
}

fn find_apply(actions: &[Action]) -> Option<(TxSetId, CloseTime, bool)> {
    actions.iter().find_map(|action| match action {
        Action::ApplyTransactions {
            tx_set,
            close_time,
            close_agree,
            ..
        } => Some((tx_set.id(), *close_time, *close_agree)),
        _ => None,
    })
}

fn find_validation(actions: &[Action]) -> Option<meridian_types::Validation> {
    actions.iter().find_map(|action| match action {
        Action::Broadcast {
            message: OutboundMessage::Validation(gossip),
        } => Some(gossip.validation().clone()),
        _ => None,
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// Proposal handling
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_proposal_seq_is_monotonic() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    h.close_with(&[test_transaction(1)]);

    let set_a = TxSetId(Hash::digest(b"set-a"));
    let set_b = TxSetId(Hash::digest(b"set-b"));

    h.propose(1, set_a, CloseTime(1010), ProposeSeq::INITIAL);
    assert_eq!(h.round.peer_position(&test_keypair(1).node_id()).unwrap().tx_set(), set_a);

    // A newer sequence replaces the position.
    h.propose(1, set_b, CloseTime(1010), ProposeSeq(5));
    assert_eq!(h.round.peer_position(&test_keypair(1).node_id()).unwrap().tx_set(), set_b);

    // A stale sequence never replaces a newer one.
    h.propose(1, set_a, CloseTime(1010), ProposeSeq(3));
    assert_eq!(h.round.peer_position(&test_keypair(1).node_id()).unwrap().tx_set(), set_b);
    // Equal sequence is stale too.
    h.propose(1, set_a, CloseTime(1010), ProposeSeq(5));
    assert_eq!(h.round.peer_position(&test_keypair(1).node_id()).unwrap().tx_set(), set_b);
}

#[test]
fn test_untrusted_and_mismatched_proposals_dropped() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    h.close_with(&[test_transaction(1)]);

    // Seed 99 is outside the registry.
    let untrusted = Proposal::new(
        &test_keypair(99),
        h.round.prev_ledger_id(),
        TxSetId(Hash::digest(b"x")),
        CloseTime(1010),
        ProposeSeq::INITIAL,
    );
    h.round.on_proposal(untrusted);
    assert_eq!(h.round.proposers(), 0);

    // Wrong prior ledger.
    let wrong_prev = Proposal::new(
        &test_keypair(1),
        LedgerId(Hash::digest(b"other-ledger")),
        TxSetId(Hash::digest(b"x")),
        CloseTime(1010),
        ProposeSeq::INITIAL,
    );
    h.round.on_proposal(wrong_prev);
    assert_eq!(h.round.proposers(), 0);
}

#[test]
fn test_bow_out_retracts_votes_and_bars_reentry() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    h.close_with(&[t1.clone()]);

    // Peer proposes a different set, creating a dispute over T2.
    let peer_set = sealed(&[t1.clone(), t2.clone()]);
    h.propose(1, peer_set.id(), CloseTime(1010), ProposeSeq::INITIAL);
    h.give_set(&peer_set);
    assert_eq!(h.round.dispute_count(), 1);
    let dispute_votes = |h: &Harness| {
        h.round
            .disputes()
            .map(|dispute| dispute.peer_votes())
            .sum::<usize>()
    };
    assert_eq!(dispute_votes(&h), 1);

    // Bow out: votes retracted, peer gone.
    h.bow_out(1);
    assert_eq!(h.round.proposers(), 0);
    assert_eq!(dispute_votes(&h), 0);

    // Subsequent proposals from the dead node are rejected for the round.
    h.propose(1, peer_set.id(), CloseTime(1010), ProposeSeq(7));
    assert_eq!(h.round.proposers(), 0);
}

#[test]
fn test_dispute_coverage_for_acquired_difference() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    h.close_with(&[t1.clone()]);

    let peer_set = sealed(&[t1, t2.clone()]);
    let actions = h.propose(1, peer_set.id(), CloseTime(1010), ProposeSeq::INITIAL);
    // The unknown set is requested from the acquisition subsystem.
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::AcquireTxSet { id } if *id == peer_set.id())));

    h.give_set(&peer_set);
    let dispute = h
        .round
        .disputes()
        .find(|d| d.id() == t2.id())
        .expect("dispute for T2");
    assert!(!dispute.our_vote());
    assert_eq!(dispute.peer_votes(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// Convergence and acceptance
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_clean_convergence_builds_and_validates() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    h.close_with(&[t1.clone()]);
    let (our_set, _) = h.round.our_position().unwrap();

    let ct = CloseTime(h.network_time);
    for seed in 1..=5 {
        h.propose(seed, our_set, ct, ProposeSeq::INITIAL);
    }

    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();
    let (set_id, close_time, close_agree) = find_apply(&actions).expect("converged");
    assert_eq!(set_id, our_set);
    assert!(close_agree);
    // Rounded to resolution and past the parent close.
    assert_eq!(close_time.0 % 30, 0);
    assert!(close_time.0 > 1000);
    assert_eq!(h.round.phase(), RoundPhase::Finished);

    let finalize = h.apply(&actions);
    assert_eq!(h.round.phase(), RoundPhase::Accepted);
    let validation = find_validation(&finalize).expect("validation broadcast");
    assert!(validation.is_full());
    assert!(!validation.has_flag_votes());
    assert!(finalize
        .iter()
        .any(|a| matches!(a, Action::RoundComplete { seq, .. } if *seq == LedgerSeq(1))));
    assert!(finalize
        .iter()
        .any(|a| matches!(a, Action::AdjustClock { .. })));
}

#[test]
fn test_no_close_time_agreement_closes_after_parent() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    h.close_with(&[t1]);
    let (our_set, _) = h.round.our_position().unwrap();

    // Every peer reports "no opinion" on the close time; the bucket of
    // zeroes wins and we agree to disagree.
    for seed in 1..=5 {
        h.propose(seed, our_set, CloseTime::NONE, ProposeSeq::INITIAL);
    }

    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();
    let (_, close_time, close_agree) = find_apply(&actions).expect("converged");
    assert!(!close_agree);
    assert_eq!(close_time, CloseTime(1001)); // parent close + 1
}

#[test]
fn test_avalanche_flip_converges_on_majority_set() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    h.close_with(&[t1.clone()]);
    let (our_set, _) = h.round.our_position().unwrap();

    // Five peers carry an extra transaction T2.
    let majority_set = sealed(&[t1, t2.clone()]);
    let ct = CloseTime(h.network_time);
    for seed in 1..=5 {
        h.propose(seed, majority_set.id(), ct, ProposeSeq::INITIAL);
    }
    h.give_set(&majority_set);
    assert_eq!(h.round.dispute_count(), 1);

    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();

    // Our vote flipped, position republished, and the round converged on
    // the majority set.
    assert!(actions.iter().any(|a| matches!(
        a,
        Action::Broadcast { message: OutboundMessage::Proposal(p) }
            if p.proposal().tx_set() == majority_set.id() && p.proposal().seq() == ProposeSeq(1)
    )));
    let (set_id, _, _) = find_apply(&actions).expect("converged");
    assert_eq!(set_id, majority_set.id());
    assert_ne!(set_id, our_set);
}

#[test]
fn test_losing_dispute_lands_in_no_vote_retriables() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    h.close_with(&[t1.clone()]);
    let (our_set, _) = h.round.our_position().unwrap();

    // One dissenting peer includes T2; the majority is with us.
    let minority_set = sealed(&[t1, t2.clone()]);
    let ct = CloseTime(h.network_time);
    for seed in 1..=4 {
        h.propose(seed, our_set, ct, ProposeSeq::INITIAL);
    }
    h.propose(5, minority_set.id(), ct, ProposeSeq::INITIAL);
    h.give_set(&minority_set);

    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();
    let (set_id, _, _) = find_apply(&actions).expect("converged");
    assert_eq!(set_id, our_set);

    // T2 stayed out and is retriable for the next open ledger.
    let retriable = h.round.no_vote_disputes();
    assert_eq!(retriable.len(), 1);
    assert_eq!(retriable[0].id(), t2.id());
}

// ═══════════════════════════════════════════════════════════════════════════
// Flag ledgers
// ═══════════════════════════════════════════════════════════════════════════

fn ledger_at_seq(seq: u64) -> Ledger {
    Ledger {
        header: LedgerHeader {
            seq: LedgerSeq(seq),
            parent_id: LedgerId(Hash::digest(b"parent")),
            tx_set_id: TxSetId::NONE,
            close_time: CloseTime(1000),
            close_time_resolution: 30,
            close_agree: true,
            parent_close_time: CloseTime(970),
        },
        transactions: Vec::new(),
    }
}

#[test]
fn test_flag_ledger_carries_votes() {
    // Building ledger 256: a flag ledger.
    let mut h = Harness::new(ConsensusKind::Builtin, ledger_at_seq(255));
    let t1 = test_transaction(1);
    h.close_with(&[t1]);
    let (our_set, _) = h.round.our_position().unwrap();

    let ct = CloseTime(h.network_time);
    for seed in 1..=5 {
        h.propose(seed, our_set, ct, ProposeSeq::INITIAL);
    }
    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();
    let finalize = h.apply(&actions);

    let validation = find_validation(&finalize).expect("validation broadcast");
    assert!(validation.has_flag_votes());
    assert!(validation.fee_vote().is_some());
}

#[test]
fn test_flag_position_includes_voting_pseudo_transactions() {
    let mut h = Harness::new(ConsensusKind::Builtin, ledger_at_seq(255));
    let t1 = test_transaction(1);
    h.close_with(&[t1.clone()]);

    // Our initial position holds the open transaction plus the fee vote.
    let expected = {
        let mut builder = TxSetBuilder::new();
        builder.insert(t1);
        builder.insert(Transaction::fee_vote(
            256,
            &ConsensusConfig::default().fee_vote,
        ));
        builder.seal()
    };
    let (our_set, _) = h.round.our_position().unwrap();
    assert_eq!(our_set, expected.id());
}

#[test]
fn test_ordinary_ledger_has_no_flag_votes() {
    let mut h = Harness::new(ConsensusKind::Builtin, ledger_at_seq(300));
    let t1 = test_transaction(1);
    h.close_with(&[t1]);
    let (our_set, _) = h.round.our_position().unwrap();
    let ct = CloseTime(h.network_time);
    for seed in 1..=5 {
        h.propose(seed, our_set, ct, ProposeSeq::INITIAL);
    }
    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();
    let finalize = h.apply(&actions);
    let validation = find_validation(&finalize).expect("validation broadcast");
    assert!(!validation.has_flag_votes());
}

// ═══════════════════════════════════════════════════════════════════════════
// View changes
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_view_shift_clears_round_state() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    h.close_with(&[t1.clone()]);

    let peer_set = sealed(&[t1, t2]);
    h.propose(1, peer_set.id(), CloseTime(1010), ProposeSeq::INITIAL);
    h.give_set(&peer_set);
    assert!(h.round.dispute_count() > 0);
    assert!(h.round.our_position().is_some());

    // Three validators move to a ledger we do not hold.
    let preferred = LedgerId(Hash::digest(b"preferred-ledger"));
    for seed in 2..=4 {
        let validation = meridian_types::Validation::sign(
            &test_keypair(seed),
            meridian_types::ValidationContent {
                ledger_id: preferred,
                ledger_seq: LedgerSeq(1),
                sign_time: h.network_time,
                full: true,
                load_fee: None,
                fee_vote: None,
                amendments: vec![],
            },
        );
        h.tally.record(&validation);
    }

    h.advance(Duration::from_secs(1));
    let actions = h.tick();

    // Bow-out broadcast, state cleared, acquisition dispatched.
    assert!(actions.iter().any(|a| matches!(
        a,
        Action::Broadcast { message: OutboundMessage::Proposal(p) } if p.proposal().is_bow_out()
    )));
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::AcquireLedger { id } if *id == preferred)));
    assert_eq!(h.round.phase(), RoundPhase::Open);
    assert_eq!(h.round.proposers(), 0);
    assert_eq!(h.round.dispute_count(), 0);
    assert!(h.round.our_position().is_none());
    assert!(!h.round.have_correct_lcl());
    assert_eq!(h.round.prev_ledger_id(), preferred);
}

#[test]
fn test_apply_failure_abandons_round() {
    let mut h = Harness::new(ConsensusKind::Builtin, Harness::genesis());
    let t1 = test_transaction(1);
    h.close_with(&[t1]);
    let (our_set, _) = h.round.our_position().unwrap();
    let ct = CloseTime(h.network_time);
    for seed in 1..=5 {
        h.propose(seed, our_set, ct, ProposeSeq::INITIAL);
    }
    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();
    assert!(find_apply(&actions).is_some());

    let correct_before = h.round.have_correct_lcl();
    let prev = h.round.prev_ledger_id();
    let failure = h.round.on_apply_failed(prev, true);
    assert!(failure
        .iter()
        .any(|a| matches!(a, Action::ReportFault { .. })));
    // The bow-out is broadcast and the LCL view is untouched.
    assert!(failure.iter().any(|a| matches!(
        a,
        Action::Broadcast { message: OutboundMessage::Proposal(p) } if p.proposal().is_bow_out()
    )));
    assert_eq!(h.round.have_correct_lcl(), correct_before);
}

// ═══════════════════════════════════════════════════════════════════════════
// External arbiter variant
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_arbiter_agreed_accepts_our_position() {
    let mut h = Harness::new(ConsensusKind::ExternalArbiter, Harness::genesis());
    let t1 = test_transaction(1);
    h.close_with(&[t1]);
    let (our_set, our_ct) = h.round.our_position().unwrap();

    h.advance(Duration::from_millis(2_100));
    let actions = h.tick();
    let publish = actions
        .iter()
        .find_map(|a| match a {
            Action::PublishPosition {
                seq,
                tx_set,
                close_time,
                ..
            } => Some((*seq, *tx_set, *close_time)),
            _ => None,
        })
        .expect("publish request");
    assert_eq!(publish, (LedgerSeq(1), our_set, our_ct));

    // Ticking again while the request is in flight does not re-publish.
    let again = h.tick();
    assert!(!again
        .iter()
        .any(|a| matches!(a, Action::PublishPosition { .. })));

    let accept = h.round.on_arbiter_response(LedgerSeq(1), ArbiterOutcome::Agreed);
    let (set_id, _, close_agree) = find_apply(&accept).expect("accepted");
    assert_eq!(set_id, our_set);
    assert!(close_agree);

    let finalize = h.apply(&accept);
    assert!(find_validation(&finalize).is_some());
}

#[test]
fn test_arbiter_exists_adopts_published_position() {
    let mut h = Harness::new(ConsensusKind::ExternalArbiter, Harness::genesis());
    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    h.close_with(&[t1.clone()]);

    h.advance(Duration::from_millis(2_100));
    h.tick();

    // Another node won the race with a set we have not acquired.
    let winning_set = sealed(&[t1, t2]);
    let outcome = ArbiterOutcome::Exists {
        tx_set: winning_set.id(),
        close_time: CloseTime(1040),
    };
    let actions = h.round.on_arbiter_response(LedgerSeq(1), outcome);
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::AcquireTxSet { id } if *id == winning_set.id())));
    assert!(find_apply(&actions).is_none());

    // Once the set arrives, the next tick adopts and accepts it.
    h.give_set(&winning_set);
    let actions = h.tick();
    let (set_id, close_time, _) = find_apply(&actions).expect("adopted");
    assert_eq!(set_id, winning_set.id());
    assert_eq!(close_time, CloseTime(1050)); // 1040 rounded up to resolution 30
}

#[test]
fn test_arbiter_error_accepts_without_validation() {
    let mut h = Harness::new(ConsensusKind::ExternalArbiter, Harness::genesis());
    let t1 = test_transaction(1);
    h.close_with(&[t1]);

    h.advance(Duration::from_millis(2_100));
    h.tick();

    let actions = h.round.on_arbiter_response(LedgerSeq(1), ArbiterOutcome::Error);
    assert!(h.round.consensus_fail());
    assert!(find_apply(&actions).is_some());

    let finalize = h.apply(&actions);
    // The ledger is accepted and reported, but no validation is emitted.
    assert!(find_validation(&finalize).is_none());
    assert!(finalize
        .iter()
        .any(|a| matches!(a, Action::RoundComplete { .. })));
}

#[test]
fn test_arbiter_retry_republishes_next_tick() {
    let mut h = Harness::new(ConsensusKind::ExternalArbiter, Harness::genesis());
    let t1 = test_transaction(1);
    h.close_with(&[t1]);

    h.advance(Duration::from_millis(2_100));
    h.tick();

    let actions = h.round.on_arbiter_response(LedgerSeq(1), ArbiterOutcome::Retry);
    assert!(actions.is_empty());

    h.advance(Duration::from_secs(1));
    let actions = h.tick();
    assert!(actions
        .iter()
        .any(|a| matches!(a, Action::PublishPosition { .. })));
}
