//! RocksDB ledger storage.
//!
//! All operations are synchronous blocking I/O; the runner calls them via
//! `spawn_blocking`.

use meridian_types::{Ledger, LedgerId};
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const CF_LEDGERS: &str = "ledgers";
const CF_SEQ_INDEX: &str = "seq_index";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rocksdb::Error),

    #[error("column family {0} not found")]
    MissingColumnFamily(&'static str),

    #[error("failed to encode ledger")]
    Encode,

    #[error("failed to decode stored ledger")]
    Decode,
}

/// RocksDB-backed closed-ledger store.
///
/// Column families:
/// - `ledgers`: ledger id → SBOR-encoded ledger
/// - `seq_index`: big-endian sequence → ledger id
pub struct RocksDbLedgerStore {
    db: Arc<DB>,
}

impl RocksDbLedgerStore {
    /// Open or create the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_LEDGERS, Options::default()),
            ColumnFamilyDescriptor::new(CF_SEQ_INDEX, Options::default()),
        ];
        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &'static str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or(StorageError::MissingColumnFamily(name))
    }

    /// Persist a ledger and index it by sequence.
    pub fn insert(&self, ledger: &Ledger) -> Result<(), StorageError> {
        let id = ledger.id();
        let encoded = sbor::basic_encode(ledger).map_err(|_| StorageError::Encode)?;
        self.db
            .put_cf(self.cf(CF_LEDGERS)?, id.0.as_bytes(), encoded)?;
        self.db.put_cf(
            self.cf(CF_SEQ_INDEX)?,
            ledger.seq().0.to_be_bytes(),
            id.0.as_bytes(),
        )?;
        debug!(ledger = %id, seq = %ledger.seq(), "Ledger persisted");
        Ok(())
    }

    pub fn get(&self, id: &LedgerId) -> Result<Option<Ledger>, StorageError> {
        let Some(bytes) = self.db.get_cf(self.cf(CF_LEDGERS)?, id.0.as_bytes())? else {
            return Ok(None);
        };
        let ledger: Ledger = sbor::basic_decode(&bytes).map_err(|_| StorageError::Decode)?;
        Ok(Some(ledger))
    }

    /// The id of the ledger stored at a sequence, if any.
    pub fn id_at_seq(&self, seq: u64) -> Result<Option<LedgerId>, StorageError> {
        let Some(bytes) = self
            .db
            .get_cf(self.cf(CF_SEQ_INDEX)?, seq.to_be_bytes())?
        else {
            return Ok(None);
        };
        let mut raw = [0u8; 32];
        if bytes.len() != 32 {
            return Err(StorageError::Decode);
        }
        raw.copy_from_slice(&bytes);
        Ok(Some(LedgerId(meridian_types::Hash::from_raw(raw))))
    }

    /// The highest-sequence ledger held, if any.
    pub fn latest(&self) -> Result<Option<Ledger>, StorageError> {
        let mut iter = self.db.iterator_cf(
            self.cf(CF_SEQ_INDEX)?,
            rocksdb::IteratorMode::End,
        );
        let Some(entry) = iter.next() else {
            return Ok(None);
        };
        let (_, id_bytes) = entry?;
        let mut raw = [0u8; 32];
        if id_bytes.len() != 32 {
            return Err(StorageError::Decode);
        }
        raw.copy_from_slice(&id_bytes);
        self.get(&LedgerId(meridian_types::Hash::from_raw(raw)))
    }
}

impl std::fmt::Debug for RocksDbLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbLedgerStore").finish()
    }
}
