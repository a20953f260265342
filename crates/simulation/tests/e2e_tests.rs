//! End-to-end scenarios over the deterministic simulation.
//!
//! Five validators run full consensus rounds: close decision, proposal
//! exchange, dispute resolution, convergence, ledger build, validation.
//! Everything is synchronous and seeded; the same seed always produces the
//! same chain.

use meridian_consensus::{ConsensusConfig, RoundPhase};
use meridian_core::Event;
use meridian_simulation::{NetworkConfig, SimulationConfig, SimulationRunner};
use meridian_types::test_utils::test_transaction;
use meridian_types::{LedgerSeq, Transaction};
use std::time::Duration;
use tracing_test::traced_test;

fn quick_network() -> NetworkConfig {
    NetworkConfig {
        latency: Duration::from_millis(50),
        jitter_fraction: 0.1,
        num_nodes: 5,
        packet_loss_rate: 0.0,
    }
}

fn five_node_config() -> SimulationConfig {
    SimulationConfig {
        num_nodes: 5,
        network: quick_network(),
        ..SimulationConfig::default()
    }
}

/// The ledger id every node holds at `seq`, asserting they all match.
fn agreed_ledger_at(runner: &SimulationRunner, seq: u64) -> meridian_types::LedgerId {
    let mut ids = Vec::new();
    for node in 0..5 {
        let storage = runner.storage(node).expect("node exists");
        let latest = storage.latest();
        assert!(
            latest.seq().0 >= seq,
            "node {} is at seq {} < {}",
            node,
            latest.seq(),
            seq
        );
        let mut ledger = latest;
        while ledger.seq().0 > seq {
            ledger = storage
                .get(&ledger.header.parent_id)
                .expect("parent held")
                .clone();
        }
        ids.push(ledger.id());
    }
    assert!(
        ids.windows(2).all(|pair| pair[0] == pair[1]),
        "nodes disagree at seq {seq}: {ids:?}"
    );
    ids[0]
}

// ═══════════════════════════════════════════════════════════════════════════
// S1 — clean convergence
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_clean_convergence() {
    let mut runner = SimulationRunner::new(five_node_config(), 42);
    runner.initialize();

    let tx = test_transaction(1);
    runner.submit_transaction(0, tx.clone());

    runner.run_until(Duration::from_secs(10));

    agreed_ledger_at(&runner, 1);
    for node in 0..5 {
        let ledger = runner.storage(node).unwrap().latest();
        assert_eq!(ledger.seq(), LedgerSeq(1));
        assert_eq!(ledger.transactions.len(), 1);
        assert_eq!(ledger.transactions[0].id(), tx.id());
        assert!(ledger.header.close_agree, "close time should be agreed");
        assert_eq!(
            ledger.header.close_time.0 % ledger.header.close_time_resolution,
            0
        );
    }
    assert_eq!(runner.stats().rounds_completed, 5);
    assert_eq!(runner.stats().faults_reported, 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// S2 — a single dispute resolved against the minority
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_minority_transaction_disputed_then_retried() {
    let mut runner = SimulationRunner::new(five_node_config(), 7);
    runner.initialize();

    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    runner.submit_transaction(0, t1.clone());
    // Only node 1 knows about T2 (no relay on plain receipt).
    runner.schedule_at(1, Duration::ZERO, Event::TransactionReceived { tx: t2.clone() });

    runner.run_until(Duration::from_secs(20));

    // The first ledger carries only the majority transaction; T2 was
    // disputed out.
    let first_id = agreed_ledger_at(&runner, 1);
    let first = runner.storage(0).unwrap().get(&first_id).unwrap().clone();
    assert!(first.contains_tx(&t1.id()));
    assert!(!first.contains_tx(&t2.id()));

    // T2 went back into node 1's open ledger as a retriable, the dispute
    // relay spread it, and the next round picked it up everywhere.
    let second_id = agreed_ledger_at(&runner, 2);
    let second = runner.storage(0).unwrap().get(&second_id).unwrap().clone();
    assert!(second.contains_tx(&t2.id()));
}

// ═══════════════════════════════════════════════════════════════════════════
// S3 — avalanche flip toward the majority
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_avalanche_flip_to_majority() {
    let mut runner = SimulationRunner::new(five_node_config(), 11);
    runner.initialize();

    let t1 = test_transaction(1);
    let t2 = test_transaction(2);
    runner.submit_transaction(0, t1.clone());
    // Three of five nodes know about T2; the minority flips in.
    for node in [1, 2, 3] {
        runner.schedule_at(
            node,
            Duration::ZERO,
            Event::TransactionReceived { tx: t2.clone() },
        );
    }

    runner.run_until(Duration::from_secs(10));

    agreed_ledger_at(&runner, 1);
    let ledger = runner.storage(0).unwrap().latest();
    assert!(ledger.contains_tx(&t1.id()));
    assert!(ledger.contains_tx(&t2.id()), "minority should flip T2 in");
}

// ═══════════════════════════════════════════════════════════════════════════
// S4 — partitioned node loses the view and recovers
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_partitioned_node_rejoins_preferred_chain() {
    let mut config = five_node_config();
    // Refuse lonely agreement so the isolated node cannot fork.
    config.consensus = ConsensusConfig {
        min_proposers: 1,
        ..ConsensusConfig::default()
    };
    let mut runner = SimulationRunner::new(config, 3);
    runner.initialize();

    runner.submit_transaction(0, test_transaction(1));
    runner.run_until(Duration::from_secs(10));
    agreed_ledger_at(&runner, 1);

    // Cut node 4 off while the rest keep closing ledgers.
    runner.network_mut().isolate_node(4);
    runner.submit_transaction(0, test_transaction(2));
    runner.run_until(Duration::from_secs(40));

    let majority_tip = runner.storage(0).unwrap().latest();
    assert!(majority_tip.seq().0 >= 2);
    assert!(runner.storage(4).unwrap().latest().seq().0 < majority_tip.seq().0);

    // Heal: validations for the preferred chain pull node 4 across; it
    // acquires the missing ledgers' successors and rejoins.
    runner.network_mut().heal_all();
    runner.submit_transaction(0, test_transaction(3));
    runner.run_until(Duration::from_secs(90));

    let tip0 = runner.storage(0).unwrap().latest();
    let node4 = runner.storage(4).unwrap();
    let shared = node4.latest().seq().0.min(tip0.seq().0);
    assert!(shared >= 2, "node 4 should have rejoined");
    let mut ledger = tip0;
    while ledger.seq().0 > shared {
        ledger = runner
            .storage(0)
            .unwrap()
            .get(&ledger.header.parent_id)
            .unwrap()
            .clone();
    }
    assert_eq!(
        node4.latest().id(),
        ledger.id(),
        "node 4 should sit on the majority chain"
    );
}

// ═══════════════════════════════════════════════════════════════════════════
// S6 — missing node during application
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_missing_node_abandons_round_and_recovers() {
    let mut config = five_node_config();
    // Refuse lonely agreement so the recovering node waits for peers
    // instead of building its own chain.
    config.consensus = ConsensusConfig {
        min_proposers: 1,
        ..ConsensusConfig::default()
    };
    let mut runner = SimulationRunner::new(config, 5);
    runner.initialize();

    runner.submit_transaction(0, test_transaction(1));
    runner.storage_mut(2).unwrap().fail_next_apply();

    runner.run_until(Duration::from_secs(20));

    // The fault was absorbed: reported, round abandoned, no crash.
    assert!(runner.stats().faults_reported >= 1);

    // The other nodes accepted ledger 1; node 2 switched to the preferred
    // ledger via validations and acquired it.
    let first = runner.storage(0).unwrap().latest();
    assert_eq!(first.seq(), LedgerSeq(1));
    assert!(
        runner.storage(2).unwrap().get(&first.id()).is_some(),
        "node 2 should have acquired the ledger it failed to build"
    );
    assert_eq!(runner.node(2).unwrap().round().prev_ledger_id(), first.id());
    assert_ne!(runner.node(2).unwrap().round().phase(), RoundPhase::Finished);
}

// ═══════════════════════════════════════════════════════════════════════════
// Robustness
// ═══════════════════════════════════════════════════════════════════════════

#[traced_test]
#[test]
fn test_convergence_under_packet_loss() {
    let mut config = five_node_config();
    config.network.packet_loss_rate = 0.10;
    let mut runner = SimulationRunner::new(config, 23);
    runner.initialize();

    runner.submit_transaction(0, test_transaction(1));
    runner.run_until(Duration::from_secs(30));

    agreed_ledger_at(&runner, 1);
    assert!(runner.stats().messages_dropped > 0);
}

#[traced_test]
#[test]
fn test_empty_rounds_close_on_idle_interval() {
    let mut runner = SimulationRunner::new(five_node_config(), 9);
    runner.initialize();

    // No transactions at all: the idle interval (twice the close-time
    // resolution here) still closes a ledger eventually.
    runner.run_until(Duration::from_secs(90));

    let ledger = runner.storage(0).unwrap().latest();
    assert!(ledger.seq().0 >= 1);
    assert!(ledger.transactions.is_empty());
    agreed_ledger_at(&runner, 1);
}

#[traced_test]
#[test]
fn test_unacquirable_set_does_not_stall_round() {
    let mut runner = SimulationRunner::new(five_node_config(), 31);
    runner.initialize();

    let t1 = test_transaction(1);
    let poison = Transaction::new(b"poison-tx".to_vec());
    runner.submit_transaction(0, t1.clone());
    runner.schedule_at(
        3,
        Duration::ZERO,
        Event::TransactionReceived { tx: poison.clone() },
    );

    // Node 3's position set ({T1, poison}) is unacquirable for everyone
    // else: they proceed without its votes, node 3 flips to the majority.
    let node3_set = {
        let mut builder = meridian_types::TxSetBuilder::new();
        builder.insert(t1.clone());
        builder.insert(poison);
        builder.seal()
    };
    runner.fail_tx_set(node3_set.id());

    runner.run_until(Duration::from_secs(15));
    let first_id = agreed_ledger_at(&runner, 1);
    let first = runner.storage(0).unwrap().get(&first_id).unwrap().clone();
    assert!(first.contains_tx(&t1.id()));
    assert_eq!(first.transactions.len(), 1);
}
