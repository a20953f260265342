//! Coordination store abstraction.
//!
//! The arbiter needs very little from its backend: create-if-absent with
//! ephemeral ownership, versioned read, and versioned replace. Real
//! deployments put a coordination service behind this trait; the bundled
//! in-memory store provides the same semantics in-process and backs the
//! deterministic simulation.

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// A store session. Ephemeral nodes belong to a session and disappear when
/// the session ends (writer crash, disconnect, shutdown).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Result of an ephemeral create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateResult {
    /// No record existed; ours was stored.
    Created,
    /// A record already exists.
    Exists,
}

/// Transient store failures. Callers retry on the next tick.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("coordination store unavailable")]
    Unavailable,
}

/// Minimal coordination-store interface.
pub trait CoordinationStore: Send + Sync {
    /// Open a new session.
    fn new_session(&self) -> SessionId;

    /// End a session, removing every ephemeral node it owns.
    fn end_session(&self, session: SessionId);

    /// Create a permanent path if it does not exist. Idempotent.
    fn ensure_path(&self, path: &str) -> Result<(), StoreError>;

    /// Atomically create an ephemeral node owned by `session`.
    fn create_ephemeral(
        &self,
        path: &str,
        value: &str,
        session: SessionId,
    ) -> Result<CreateResult, StoreError>;

    /// Read a node's value and version.
    fn get(&self, path: &str) -> Result<Option<(String, u64)>, StoreError>;

    /// Replace a node's value if its version still matches. Returns false
    /// on a version conflict. Ownership moves to `session`.
    fn replace(
        &self,
        path: &str,
        value: &str,
        expected_version: u64,
        session: SessionId,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug)]
struct NodeRecord {
    value: String,
    version: u64,
    /// None for permanent nodes.
    owner: Option<SessionId>,
}

#[derive(Debug, Default)]
struct StoreInner {
    nodes: HashMap<String, NodeRecord>,
    next_session: u64,
    unavailable: bool,
}

/// In-memory coordination store with session-scoped ephemeral nodes.
///
/// Shared across nodes via `Arc` in the simulation; all operations are
/// atomic under one lock, giving the same first-writer-wins guarantee a
/// real coordination service provides.
#[derive(Debug, Default)]
pub struct MemoryCoordinationStore {
    inner: Mutex<StoreInner>,
}

impl MemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate backend unavailability; every call fails until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().expect("store lock").unavailable = unavailable;
    }

    /// Number of live nodes, permanent ones included.
    pub fn node_count(&self) -> usize {
        self.inner.lock().expect("store lock").nodes.len()
    }
}

impl CoordinationStore for MemoryCoordinationStore {
    fn new_session(&self) -> SessionId {
        let mut inner = self.inner.lock().expect("store lock");
        inner.next_session += 1;
        SessionId(inner.next_session)
    }

    fn end_session(&self, session: SessionId) {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .nodes
            .retain(|_, record| record.owner != Some(session));
    }

    fn ensure_path(&self, path: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.unavailable {
            return Err(StoreError::Unavailable);
        }
        inner.nodes.entry(path.to_string()).or_insert(NodeRecord {
            value: String::new(),
            version: 0,
            owner: None,
        });
        Ok(())
    }

    fn create_ephemeral(
        &self,
        path: &str,
        value: &str,
        session: SessionId,
    ) -> Result<CreateResult, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.unavailable {
            return Err(StoreError::Unavailable);
        }
        if inner.nodes.contains_key(path) {
            return Ok(CreateResult::Exists);
        }
        inner.nodes.insert(
            path.to_string(),
            NodeRecord {
                value: value.to_string(),
                version: 0,
                owner: Some(session),
            },
        );
        Ok(CreateResult::Created)
    }

    fn get(&self, path: &str) -> Result<Option<(String, u64)>, StoreError> {
        let inner = self.inner.lock().expect("store lock");
        if inner.unavailable {
            return Err(StoreError::Unavailable);
        }
        Ok(inner
            .nodes
            .get(path)
            .map(|record| (record.value.clone(), record.version)))
    }

    fn replace(
        &self,
        path: &str,
        value: &str,
        expected_version: u64,
        session: SessionId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().expect("store lock");
        if inner.unavailable {
            return Err(StoreError::Unavailable);
        }
        match inner.nodes.get_mut(path) {
            Some(record) if record.version == expected_version => {
                record.value = value.to_string();
                record.version += 1;
                record.owner = Some(session);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
