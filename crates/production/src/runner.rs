//! Tokio event loop bridging the node state machine to the real world.

use crate::storage::RocksDbLedgerStore;
use crate::timers::TimerManager;
use meridian_arbiter::{ArbiterClient, ArbiterHandle, PublishedPosition};
use meridian_core::{Action, ArbiterOutcome, Event, OutboundMessage, StateMachine};
use meridian_node::NodeStateMachine;
use meridian_types::{Ledger, LedgerId, TxSet, TxSetId};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const OUTBOUND_CHANNEL_CAPACITY: usize = 1024;

/// A request to the acquisition subsystem, which lives outside this crate
/// (it needs the network overlay). Results come back as events.
#[derive(Debug, Clone)]
pub enum FetchRequest {
    /// Fetch a transaction set; answer with `Event::TxSetAcquired` or
    /// `Event::TxSetUnavailable`.
    TxSet(TxSetId),
    /// Fetch a closed ledger; answer with `Event::LedgerAcquired`.
    Ledger(LedgerId),
    /// Cache a locally built set so peers can fetch it from us.
    ShareTxSet(Arc<TxSet>),
}

/// Endpoints the embedder drives the runner through.
///
/// The network overlay feeds inbound messages into `events` and drains
/// `outbound`; the acquisition subsystem services `fetches`.
pub struct RunnerHandle {
    pub events: mpsc::Sender<Event>,
    pub outbound: mpsc::Receiver<OutboundMessage>,
    pub fetches: mpsc::Receiver<FetchRequest>,
}

/// Production runner: single-threaded event loop over the node state
/// machine, with blocking work (ledger application, storage, arbiter
/// calls) dispatched to the blocking pool.
pub struct ProductionRunner {
    node: NodeStateMachine,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    fetch_tx: mpsc::Sender<FetchRequest>,
    timers: TimerManager,
    storage: Arc<RocksDbLedgerStore>,
    arbiter: Option<Arc<ArbiterClient>>,
    started: Instant,
    shutdown: watch::Receiver<bool>,
}

impl ProductionRunner {
    pub fn new(
        node: NodeStateMachine,
        storage: Arc<RocksDbLedgerStore>,
        arbiter: Option<Arc<ArbiterClient>>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, RunnerHandle) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let (fetch_tx, fetch_rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        let timers = TimerManager::new(event_tx.clone());

        let runner = Self {
            node,
            event_rx,
            event_tx: event_tx.clone(),
            outbound_tx,
            fetch_tx,
            timers,
            storage,
            arbiter,
            started: Instant::now(),
            shutdown,
        };
        let handle = RunnerHandle {
            events: event_tx,
            outbound: outbound_rx,
            fetches: fetch_rx,
        };
        (runner, handle)
    }

    /// Drive the node until shutdown is signalled or every event sender is
    /// dropped.
    pub async fn run(mut self) {
        info!("Runner starting");
        let startup = self.node.initialize();
        self.execute_actions(startup).await;

        loop {
            tokio::select! {
                changed = self.shutdown.changed() => {
                    if changed.is_err() || *self.shutdown.borrow() {
                        break;
                    }
                }
                event = self.event_rx.recv() => {
                    let Some(event) = event else { break };
                    self.node.set_time(self.started.elapsed());
                    let actions = self.node.handle(event);
                    self.execute_actions(actions).await;
                }
            }
        }

        self.timers.cancel_all();
        ArbiterHandle::shutdown();
        info!("Runner stopped");
    }

    async fn execute_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            self.execute_action(action).await;
        }
    }

    async fn execute_action(&mut self, action: Action) {
        match action {
            Action::Broadcast { message } => {
                if self.outbound_tx.send(message).await.is_err() {
                    warn!("Outbound channel closed, dropping broadcast");
                }
            }

            Action::SetTimer { id, duration } => self.timers.set_timer(id, duration),
            Action::CancelTimer { id } => self.timers.cancel_timer(id),

            Action::EnqueueInternal { event } => {
                let _ = self.event_tx.send(event).await;
            }

            Action::AcquireTxSet { id } => {
                let _ = self.fetch_tx.send(FetchRequest::TxSet(id)).await;
            }
            Action::ShareTxSet { set } => {
                let _ = self.fetch_tx.send(FetchRequest::ShareTxSet(set)).await;
            }
            Action::AcquireLedger { id } => {
                let _ = self.fetch_tx.send(FetchRequest::Ledger(id)).await;
            }

            Action::ApplyTransactions {
                parent,
                tx_set,
                close_time,
                close_agree,
                close_resolution,
                replay,
            } => {
                // Ledger application happens off the event loop; the result
                // re-enters as an event. The job is never cancelled.
                let event_tx = self.event_tx.clone();
                tokio::task::spawn_blocking(move || {
                    let transactions = match &replay {
                        Some(replay) => replay.transactions.clone(),
                        None => tx_set.canonical_order(),
                    };
                    let ledger = Arc::new(Ledger::build_next(
                        &parent,
                        tx_set.id(),
                        transactions,
                        close_time,
                        close_agree,
                        close_resolution,
                    ));
                    let _ = event_tx.blocking_send(Event::LedgerApplied {
                        prev_ledger: parent.id(),
                        ledger,
                        retriable: Vec::new(),
                    });
                });
            }

            Action::PublishPosition {
                seq,
                prev_ledger,
                tx_set,
                close_time,
            } => match &self.arbiter {
                Some(client) => {
                    let client = client.clone();
                    let event_tx = self.event_tx.clone();
                    tokio::task::spawn_blocking(move || {
                        let outcome = client.publish(
                            seq,
                            &PublishedPosition {
                                tx_set,
                                prev_ledger,
                                close_time,
                            },
                        );
                        let _ = event_tx.blocking_send(Event::ArbiterResponse { seq, outcome });
                    });
                }
                None => {
                    // Misconfiguration: arbiter consensus without a client.
                    // Fail the round's validation rather than spin forever.
                    error!("PublishPosition without an arbiter client");
                    let _ = self
                        .event_tx
                        .send(Event::ArbiterResponse {
                            seq,
                            outcome: ArbiterOutcome::Error,
                        })
                        .await;
                }
            },

            Action::PersistLedger { ledger } => {
                let storage = self.storage.clone();
                tokio::task::spawn_blocking(move || {
                    if let Err(error) = storage.insert(&ledger) {
                        error!(%error, ledger = %ledger.id(), "Failed to persist ledger");
                    }
                });
            }

            Action::AdjustClock { offset_secs } => self.node.adjust_clock(offset_secs),

            Action::RoundComplete {
                ledger_id,
                seq,
                proposers,
                duration,
                ..
            } => {
                info!(ledger = %ledger_id, %seq, proposers, ?duration, "Round complete");
            }

            Action::ReportFault { description } => {
                error!(description, "Consensus fault");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_consensus::ConsensusConfig;
    use meridian_types::test_utils::{test_keypair, test_transaction};
    use meridian_types::{CloseTime, ValidatorRegistry};
    use std::time::Duration;

    fn temp_store(tag: &str) -> (Arc<RocksDbLedgerStore>, std::path::PathBuf) {
        let path = std::env::temp_dir().join(format!(
            "meridian-runner-test-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&path);
        (Arc::new(RocksDbLedgerStore::open(&path).unwrap()), path)
    }

    #[tokio::test]
    async fn test_submission_reaches_outbound() {
        let (storage, path) = temp_store("submit");
        let registry = Arc::new(ValidatorRegistry::from_keys([test_keypair(0).public_key()]));
        let node = NodeStateMachine::new(
            ConsensusConfig::default(),
            registry,
            Some(test_keypair(0)),
            Arc::new(Ledger::genesis(CloseTime(1000))),
            1005,
        );
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (runner, mut handle) = ProductionRunner::new(node, storage, None, shutdown_rx);
        let task = tokio::spawn(runner.run());

        handle
            .events
            .send(Event::SubmitTransaction {
                tx: test_transaction(1),
            })
            .await
            .unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), handle.outbound.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        assert!(matches!(message, OutboundMessage::Transaction(_)));

        // Dropping the handle's sender ends the loop.
        drop(handle);
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        let _ = std::fs::remove_dir_all(&path);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_runner() {
        let (storage, path) = temp_store("shutdown");
        let registry = Arc::new(ValidatorRegistry::from_keys([test_keypair(0).public_key()]));
        let node = NodeStateMachine::new(
            ConsensusConfig::default(),
            registry,
            None,
            Arc::new(Ledger::genesis(CloseTime(1000))),
            1005,
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (runner, handle) = ProductionRunner::new(node, storage, None, shutdown_rx);
        let task = tokio::spawn(runner.run());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("runner should stop")
            .unwrap();
        drop(handle);
        let _ = std::fs::remove_dir_all(&path);
    }
}
