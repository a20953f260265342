//! Deterministic simulation runner.
//!
//! Processes events in deterministic order and executes actions. Given the
//! same seed, a run produces identical results. Each node has its own
//! ledger store; ledger application runs inline. The tx-set exchange and
//! (under the arbiter variant) the coordination store are shared, exactly
//! as the acquisition subsystem and arbiter backend are shared in a real
//! deployment.

use crate::event_queue::{EventKey, NodeIndex};
use crate::network::{NetworkConfig, SimulatedNetwork};
use crate::storage::SimLedgerStore;
use meridian_arbiter::{
    ArbiterClient, ArbiterConfig, CoordinationStore, MemoryCoordinationStore, PublishedPosition,
};
use meridian_consensus::ConsensusConfig;
use meridian_core::{Action, ArbiterOutcome, Event, OutboundMessage, StateMachine, TimerId};
use meridian_node::NodeStateMachine;
use meridian_types::{
    CloseTime, KeyPair, Ledger, LedgerId, NodeId, Transaction, TxSet, TxSetId, ValidatorRegistry,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Latency of a tx-set or ledger acquisition round trip.
const ACQUIRE_DELAY: Duration = Duration::from_millis(50);

/// Latency of an arbiter publish round trip.
const ARBITER_DELAY: Duration = Duration::from_millis(20);

/// Simulation configuration.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub num_nodes: u32,
    pub consensus: ConsensusConfig,
    pub network: NetworkConfig,
    /// Wall-clock seconds at simulation time zero.
    pub epoch_base: u64,
    /// Close time of the genesis ledger.
    pub genesis_close: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_nodes: 5,
            consensus: ConsensusConfig::default(),
            network: NetworkConfig::default(),
            epoch_base: 1005,
            genesis_close: 1000,
        }
    }
}

/// Statistics collected during simulation.
#[derive(Debug, Default, Clone)]
pub struct SimulationStats {
    pub events_processed: u64,
    pub actions_executed: u64,
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub timers_set: u64,
    pub rounds_completed: u64,
    pub faults_reported: u64,
    pub clock_adjustments: u64,
}

/// Deterministic simulation runner.
pub struct SimulationRunner {
    nodes: Vec<NodeStateMachine>,
    node_storage: Vec<SimLedgerStore>,
    node_ids: Vec<NodeId>,

    event_queue: BTreeMap<EventKey, Event>,
    sequence: u64,
    now: Duration,

    network: SimulatedNetwork,
    rng: ChaCha8Rng,
    timers: HashMap<(NodeIndex, TimerId), EventKey>,

    /// Network-wide tx-set exchange (the inbound-transactions subsystem).
    tx_set_cache: HashMap<TxSetId, Arc<TxSet>>,
    /// Nodes waiting for a set that has not been shared yet. Ordered so
    /// fulfillment scheduling stays deterministic.
    pending_tx_sets: HashMap<TxSetId, BTreeSet<NodeIndex>>,
    /// Sets forced to fail acquisition (invalid-tree tests).
    failed_tx_sets: HashSet<TxSetId>,
    /// Network-wide closed-ledger registry for ledger acquisition.
    ledger_registry: HashMap<LedgerId, Arc<Ledger>>,
    /// Nodes waiting for a ledger nobody has published yet.
    pending_ledgers: HashMap<LedgerId, BTreeSet<NodeIndex>>,

    arbiter_clients: Vec<Option<ArbiterClient>>,
    arbiter_store: Option<Arc<MemoryCoordinationStore>>,

    stats: SimulationStats,
}

impl SimulationRunner {
    pub fn new(config: SimulationConfig, seed: u64) -> Self {
        let network = SimulatedNetwork::new(NetworkConfig {
            num_nodes: config.num_nodes,
            ..config.network.clone()
        });
        let rng = ChaCha8Rng::seed_from_u64(seed);

        // Deterministic validator keys.
        let keys: Vec<KeyPair> = (0..config.num_nodes)
            .map(|i| {
                let mut seed_bytes = [0u8; 32];
                let key_seed = seed.wrapping_add(i as u64).wrapping_mul(0x517c_c1b7_2722_0a95);
                seed_bytes[..8].copy_from_slice(&key_seed.to_le_bytes());
                seed_bytes[8..16].copy_from_slice(&(i as u64).to_le_bytes());
                KeyPair::from_seed(&seed_bytes)
            })
            .collect();
        let node_ids: Vec<NodeId> = keys.iter().map(|k| k.node_id()).collect();
        let registry = Arc::new(ValidatorRegistry::from_keys(
            keys.iter().map(|k| k.public_key()),
        ));

        let genesis = Arc::new(Ledger::genesis(CloseTime(config.genesis_close)));
        let mut ledger_registry = HashMap::new();
        ledger_registry.insert(genesis.id(), genesis.clone());

        let nodes: Vec<NodeStateMachine> = keys
            .iter()
            .map(|key| {
                NodeStateMachine::new(
                    config.consensus.clone(),
                    registry.clone(),
                    Some(key.clone()),
                    genesis.clone(),
                    config.epoch_base,
                )
            })
            .collect();
        let node_storage: Vec<SimLedgerStore> = (0..config.num_nodes)
            .map(|_| SimLedgerStore::new(genesis.clone()))
            .collect();

        // Shared arbiter backend, one session per node.
        let (arbiter_store, arbiter_clients) = if matches!(
            config.consensus.kind,
            meridian_consensus::ConsensusKind::ExternalArbiter
        ) {
            let store = Arc::new(MemoryCoordinationStore::new());
            let clients = (0..config.num_nodes)
                .map(|_| {
                    let shared: Arc<dyn CoordinationStore> = store.clone();
                    Some(ArbiterClient::new(shared, &ArbiterConfig::default()))
                })
                .collect();
            (Some(store), clients)
        } else {
            (None, (0..config.num_nodes).map(|_| None).collect())
        };

        info!(
            num_nodes = config.num_nodes,
            seed,
            kind = ?config.consensus.kind,
            "Created simulation runner"
        );

        Self {
            nodes,
            node_storage,
            node_ids,
            event_queue: BTreeMap::new(),
            sequence: 0,
            now: Duration::ZERO,
            network,
            rng,
            timers: HashMap::new(),
            tx_set_cache: HashMap::new(),
            pending_tx_sets: HashMap::new(),
            failed_tx_sets: HashSet::new(),
            ledger_registry,
            pending_ledgers: HashMap::new(),
            arbiter_clients,
            arbiter_store,
            stats: SimulationStats::default(),
        }
    }

    /// Start every node: timers plus any round start-up work.
    pub fn initialize(&mut self) {
        for node in 0..self.nodes.len() as NodeIndex {
            let actions = self.nodes[node as usize].initialize();
            self.execute_actions(node, actions);
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn node(&self, index: NodeIndex) -> Option<&NodeStateMachine> {
        self.nodes.get(index as usize)
    }

    pub fn storage(&self, index: NodeIndex) -> Option<&SimLedgerStore> {
        self.node_storage.get(index as usize)
    }

    pub fn storage_mut(&mut self, index: NodeIndex) -> Option<&mut SimLedgerStore> {
        self.node_storage.get_mut(index as usize)
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn network_mut(&mut self) -> &mut SimulatedNetwork {
        &mut self.network
    }

    pub fn arbiter_store(&self) -> Option<&Arc<MemoryCoordinationStore>> {
        self.arbiter_store.as_ref()
    }

    /// Force acquisition of a set to fail (invalid tree).
    pub fn fail_tx_set(&mut self, id: TxSetId) {
        self.failed_tx_sets.insert(id);
    }

    /// Skew a node's close-time clock (test hook).
    pub fn node_adjust_clock(&mut self, node: NodeIndex, offset_secs: i64) {
        self.nodes[node as usize].adjust_clock(offset_secs);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Event injection
    // ═══════════════════════════════════════════════════════════════════════

    /// Submit a transaction to a node's open ledger (with gossip relay).
    pub fn submit_transaction(&mut self, node: NodeIndex, tx: Transaction) {
        self.schedule(node, self.now, Event::SubmitTransaction { tx });
    }

    /// Deliver an event to one node at an absolute time.
    pub fn schedule_at(&mut self, node: NodeIndex, time: Duration, event: Event) {
        self.schedule(node, time, event);
    }

    fn schedule(&mut self, node: NodeIndex, time: Duration, event: Event) -> EventKey {
        let key = EventKey {
            time: time.max(self.now),
            priority: event.priority(),
            sequence: self.sequence,
            node,
        };
        self.sequence += 1;
        self.event_queue.insert(key, event);
        key
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════

    /// Process a single event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some((&key, _)) = self.event_queue.iter().next() else {
            return false;
        };
        let event = self.event_queue.remove(&key).expect("key just observed");

        self.now = self.now.max(key.time);
        self.stats.events_processed += 1;

        // A fired timer is no longer pending.
        if let Event::RoundTimer | Event::CleanupTimer = event {
            let timer_id = match event {
                Event::RoundTimer => TimerId::Round,
                _ => TimerId::Cleanup,
            };
            self.timers.remove(&(key.node, timer_id));
        }

        trace!(node = key.node, at = ?self.now, event = event.type_name(), "Delivering event");
        let node = &mut self.nodes[key.node as usize];
        node.set_time(self.now);
        let actions = node.handle(event);
        self.execute_actions(key.node, actions);
        true
    }

    /// Run the simulation until `deadline`.
    pub fn run_until(&mut self, deadline: Duration) {
        while let Some((&key, _)) = self.event_queue.iter().next() {
            if key.time > deadline {
                break;
            }
            self.step();
        }
        self.now = self.now.max(deadline);
    }

    fn execute_actions(&mut self, node: NodeIndex, actions: Vec<Action>) {
        for action in actions {
            self.stats.actions_executed += 1;
            self.execute_action(node, action);
        }
    }

    fn execute_action(&mut self, node: NodeIndex, action: Action) {
        match action {
            Action::Broadcast { message } => self.broadcast(node, message),

            Action::SetTimer { id, duration } => {
                if let Some(key) = self.timers.remove(&(node, id)) {
                    self.event_queue.remove(&key);
                }
                let event = match id {
                    TimerId::Round => Event::RoundTimer,
                    TimerId::Cleanup => Event::CleanupTimer,
                };
                let key = self.schedule(node, self.now + duration, event);
                self.timers.insert((node, id), key);
                self.stats.timers_set += 1;
            }

            Action::CancelTimer { id } => {
                if let Some(key) = self.timers.remove(&(node, id)) {
                    self.event_queue.remove(&key);
                }
            }

            Action::EnqueueInternal { event } => {
                self.schedule(node, self.now, event);
            }

            Action::AcquireTxSet { id } => self.acquire_tx_set(node, id),

            Action::ShareTxSet { set } => self.share_tx_set(set),

            Action::AcquireLedger { id } => self.acquire_ledger(node, id),

            Action::ApplyTransactions {
                parent,
                tx_set,
                close_time,
                close_agree,
                close_resolution,
                replay,
            } => {
                // Inline application stands in for the host job queue.
                let result = self.node_storage[node as usize].apply(
                    &parent,
                    &tx_set,
                    close_time,
                    close_agree,
                    close_resolution,
                    replay.as_ref(),
                );
                let event = match result {
                    Ok((ledger, retriable)) => Event::LedgerApplied {
                        prev_ledger: parent.id(),
                        ledger,
                        retriable,
                    },
                    Err(_) => Event::LedgerApplyFailed {
                        prev_ledger: parent.id(),
                        missing_node: true,
                    },
                };
                self.schedule(node, self.now, event);
            }

            Action::PublishPosition {
                seq,
                prev_ledger,
                tx_set,
                close_time,
            } => {
                let outcome = match &self.arbiter_clients[node as usize] {
                    Some(client) => client.publish(
                        seq,
                        &PublishedPosition {
                            tx_set,
                            prev_ledger,
                            close_time,
                        },
                    ),
                    None => {
                        warn!(node, "Publish without an arbiter client");
                        ArbiterOutcome::Retry
                    }
                };
                self.schedule(
                    node,
                    self.now + ARBITER_DELAY,
                    Event::ArbiterResponse { seq, outcome },
                );
            }

            Action::PersistLedger { ledger } => {
                self.node_storage[node as usize].insert(ledger.clone());
                self.publish_ledger(ledger);
            }

            Action::AdjustClock { offset_secs } => {
                self.nodes[node as usize].adjust_clock(offset_secs);
                self.stats.clock_adjustments += 1;
            }

            Action::RoundComplete {
                ledger_id,
                seq,
                duration,
                ..
            } => {
                debug!(node, ledger = %ledger_id, %seq, ?duration, "Round complete");
                self.stats.rounds_completed += 1;
            }

            Action::ReportFault { description } => {
                warn!(node, description, "Fault reported");
                self.stats.faults_reported += 1;
            }
        }
    }

    fn broadcast(&mut self, from: NodeIndex, message: OutboundMessage) {
        for to in self.network.all_nodes() {
            if to == from {
                continue;
            }
            match self.network.should_deliver(from, to, &mut self.rng) {
                Some(latency) => {
                    if let Some(event) = inbound_event(&message, self.node_ids[from as usize]) {
                        self.schedule(to, self.now + latency, event);
                        self.stats.messages_sent += 1;
                    }
                }
                None => self.stats.messages_dropped += 1,
            }
        }
    }

    fn share_tx_set(&mut self, set: Arc<TxSet>) {
        let id = set.id();
        self.tx_set_cache.entry(id).or_insert_with(|| set.clone());
        if let Some(waiters) = self.pending_tx_sets.remove(&id) {
            for waiter in waiters {
                self.schedule(
                    waiter,
                    self.now + ACQUIRE_DELAY,
                    Event::TxSetAcquired { set: set.clone() },
                );
            }
        }
    }

    fn acquire_tx_set(&mut self, node: NodeIndex, id: TxSetId) {
        if self.failed_tx_sets.contains(&id) {
            self.schedule(
                node,
                self.now + ACQUIRE_DELAY,
                Event::TxSetUnavailable { id },
            );
            return;
        }
        match self.tx_set_cache.get(&id) {
            Some(set) => {
                let set = set.clone();
                self.schedule(node, self.now + ACQUIRE_DELAY, Event::TxSetAcquired { set });
            }
            None => {
                // Not shared yet; fulfilled when some node shares it.
                self.pending_tx_sets.entry(id).or_default().insert(node);
            }
        }
    }

    fn acquire_ledger(&mut self, node: NodeIndex, id: LedgerId) {
        match self.ledger_registry.get(&id) {
            Some(ledger) => {
                let ledger = ledger.clone();
                self.node_storage[node as usize].insert(ledger.clone());
                self.schedule(
                    node,
                    self.now + ACQUIRE_DELAY,
                    Event::LedgerAcquired { ledger },
                );
            }
            None => {
                self.pending_ledgers.entry(id).or_default().insert(node);
            }
        }
    }

    fn publish_ledger(&mut self, ledger: Arc<Ledger>) {
        let id = ledger.id();
        self.ledger_registry
            .entry(id)
            .or_insert_with(|| ledger.clone());
        if let Some(waiters) = self.pending_ledgers.remove(&id) {
            for waiter in waiters {
                self.node_storage[waiter as usize].insert(ledger.clone());
                self.schedule(
                    waiter,
                    self.now + ACQUIRE_DELAY,
                    Event::LedgerAcquired {
                        ledger: ledger.clone(),
                    },
                );
            }
        }
    }
}

/// Convert an outbound message into the receiving node's event.
fn inbound_event(message: &OutboundMessage, sender: NodeId) -> Option<Event> {
    match message {
        OutboundMessage::Proposal(gossip) => Some(Event::ProposalReceived {
            proposal: gossip.proposal().clone(),
        }),
        OutboundMessage::Validation(gossip) => Some(Event::ValidationReceived {
            validation: gossip.validation().clone(),
        }),
        OutboundMessage::HaveTxSet(gossip) => Some(Event::HaveTxSetReceived {
            peer: sender,
            id: gossip.id,
        }),
        OutboundMessage::Transaction(gossip) => Some(Event::TransactionReceived {
            tx: gossip.transaction.clone(),
        }),
        // Status changes inform monitoring, not the consensus core.
        OutboundMessage::StatusChange(_) => None,
    }
}
