//! Arbiter client and the process-wide handle.

use crate::key::{PublishedPosition, RoundKey};
use crate::store::{CoordinationStore, CreateResult, SessionId};
use meridian_core::ArbiterOutcome;
use meridian_types::LedgerSeq;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Arbiter configuration.
#[derive(Debug, Clone)]
pub struct ArbiterConfig {
    /// Backend connection string (host:port list). The in-memory store
    /// ignores it.
    pub hosts: String,
    /// Namespace under which this system's records live.
    pub namespace: String,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            hosts: "127.0.0.1:2181".to_string(),
            namespace: "meridian".to_string(),
        }
    }
}

/// Client for the external consensus arbiter.
///
/// One session per client; dropping the client ends the session and with it
/// every ephemeral record it wrote.
pub struct ArbiterClient {
    store: Arc<dyn CoordinationStore>,
    session: SessionId,
    namespace: String,
}

impl ArbiterClient {
    /// Connect to a store: open a session and create the parent paths.
    ///
    /// Parent-path creation failure is transient (the backend may be down);
    /// the paths are retried lazily on the first publish.
    pub fn new(store: Arc<dyn CoordinationStore>, config: &ArbiterConfig) -> Self {
        let session = store.new_session();
        let client = Self {
            store,
            session,
            namespace: config.namespace.clone(),
        };
        if client.ensure_parents() {
            info!(namespace = %client.namespace, "Arbiter parent paths ready");
        } else {
            warn!(namespace = %client.namespace, "Arbiter backend unavailable at startup");
        }
        client
    }

    fn ensure_parents(&self) -> bool {
        RoundKey::parent_paths(&self.namespace)
            .iter()
            .all(|path| self.store.ensure_path(path).is_ok())
    }

    /// Publish our position for `seq`; first writer wins.
    ///
    /// - `Agreed`: our record was stored (or the stored record already
    ///   matches ours).
    /// - `Exists`: another node's record is in place; adopt it.
    /// - `Retry`: transient backend failure, run again next tick.
    /// - `Error`: the stored record extends a different prior ledger — we
    ///   are stale this round.
    pub fn publish(&self, seq: LedgerSeq, ours: &PublishedPosition) -> ArbiterOutcome {
        if !self.ensure_parents() {
            return ArbiterOutcome::Retry;
        }
        let path = RoundKey::new(self.namespace.clone(), seq).path();
        let value = ours.encode();

        match self.store.create_ephemeral(&path, &value, self.session) {
            Err(error) => {
                warn!(%path, %error, "Arbiter create failed, will retry");
                ArbiterOutcome::Retry
            }
            Ok(CreateResult::Created) => {
                info!(%path, "Position written to arbiter");
                ArbiterOutcome::Agreed
            }
            Ok(CreateResult::Exists) => self.adopt_existing(&path, ours, &value),
        }
    }

    fn adopt_existing(
        &self,
        path: &str,
        ours: &PublishedPosition,
        our_value: &str,
    ) -> ArbiterOutcome {
        let record = match self.store.get(path) {
            Err(error) => {
                warn!(%path, %error, "Arbiter read failed, will retry");
                return ArbiterOutcome::Retry;
            }
            // Raced against an ephemeral expiry; publish again next tick.
            Ok(None) => return ArbiterOutcome::Retry,
            Ok(Some(record)) => record,
        };
        let (stored_value, version) = record;

        let published = match PublishedPosition::parse(&stored_value) {
            Ok(published) => published,
            Err(error) => {
                // Malformed record: replace it with ours under the observed
                // version.
                warn!(%path, %error, "Malformed arbiter record, replacing");
                return match self.store.replace(path, our_value, version, self.session) {
                    Ok(true) => ArbiterOutcome::Agreed,
                    Ok(false) | Err(_) => ArbiterOutcome::Retry,
                };
            }
        };

        if published.prev_ledger != ours.prev_ledger {
            warn!(
                %path,
                stored = %published.prev_ledger,
                ours = %ours.prev_ledger,
                "Arbiter record extends a different prior ledger"
            );
            return ArbiterOutcome::Error;
        }

        if published.tx_set == ours.tx_set && published.close_time == ours.close_time {
            debug!(%path, "Arbiter record matches our position");
            return ArbiterOutcome::Agreed;
        }

        debug!(%path, tx_set = %published.tx_set.0, "Adopting published position");
        ArbiterOutcome::Exists {
            tx_set: published.tx_set,
            close_time: published.close_time,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl Drop for ArbiterClient {
    fn drop(&mut self) {
        self.store.end_session(self.session);
    }
}

impl std::fmt::Debug for ArbiterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbiterClient")
            .field("namespace", &self.namespace)
            .field("session", &self.session)
            .finish()
    }
}

static PROCESS_ARBITER: Mutex<Option<Arc<ArbiterClient>>> = Mutex::new(None);

/// Process-wide arbiter handle.
///
/// The client is shared across rounds with ref-counted lifetime: rounds
/// clone the `Arc`; `shutdown` drops the process reference and the session
/// ends once the last in-flight user releases theirs.
pub struct ArbiterHandle;

impl ArbiterHandle {
    /// Initialize at the first round. Later calls return the existing
    /// client and ignore the arguments.
    pub fn init(store: Arc<dyn CoordinationStore>, config: &ArbiterConfig) -> Arc<ArbiterClient> {
        let mut guard = PROCESS_ARBITER.lock().expect("arbiter handle lock");
        guard
            .get_or_insert_with(|| Arc::new(ArbiterClient::new(store, config)))
            .clone()
    }

    /// The process client, if initialized.
    pub fn get() -> Option<Arc<ArbiterClient>> {
        PROCESS_ARBITER.lock().expect("arbiter handle lock").clone()
    }

    /// Tear down at shutdown. Hooked into the host's shutdown path.
    pub fn shutdown() {
        PROCESS_ARBITER.lock().expect("arbiter handle lock").take();
    }
}
