//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `events` - Append-only event log (key: sequence, big-endian)
//! - `state` - Snapshot of the ledger state and chain head (single key)
//!
//! Each committed command writes its events and the new snapshot in one
//! `WriteBatch`, so a restart always sees a snapshot consistent with the log.

use crate::{
    error::{Error, Result},
    events::{ChainHead, LedgerEvent},
    state::SuretyState,
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, WriteOptions, DB,
};
use serde::{Deserialize, Serialize};

/// Column family names
const CF_EVENTS: &str = "events";
const CF_STATE: &str = "state";

const SNAPSHOT_KEY: &[u8] = b"snapshot";

/// Persisted snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Ledger state after the last committed command
    pub state: SuretyState,
    /// Chain head after the last committed event
    pub head: ChainHead,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_EVENTS, Self::cf_options_events()),
            ColumnFamilyDescriptor::new(CF_STATE, Self::cf_options_state()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self {
            db,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    fn cf_options_events() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_state() -> Options {
        let mut opts = Options::default();
        // Read on every restart, rewritten on every commit
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Persist events and the resulting snapshot atomically
    pub fn commit(&self, state: &SuretyState, head: &ChainHead, events: &[LedgerEvent]) -> Result<()> {
        let mut batch = WriteBatch::default();

        let cf_events = self.cf_handle(CF_EVENTS)?;
        for event in events {
            let value = bincode::serialize(event)?;
            batch.put_cf(cf_events, event.sequence.to_be_bytes(), &value);
        }

        let cf_state = self.cf_handle(CF_STATE)?;
        let snapshot = Snapshot {
            state: state.clone(),
            head: *head,
        };
        batch.put_cf(cf_state, SNAPSHOT_KEY, bincode::serialize(&snapshot)?);

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.write_opt(batch, &write_opts)?;

        tracing::debug!(
            events = events.len(),
            next_sequence = head.next_sequence,
            "Committed batch"
        );

        Ok(())
    }

    /// Load the last committed snapshot, if any
    pub fn load(&self) -> Result<Option<Snapshot>> {
        let cf = self.cf_handle(CF_STATE)?;

        match self.db.get_cf(cf, SNAPSHOT_KEY)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Get event by sequence number
    pub fn get_event(&self, sequence: u64) -> Result<Option<LedgerEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;

        match self.db.get_cf(cf, sequence.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Up to `limit` events starting at sequence `from`
    pub fn events_since(&self, from: u64, limit: usize) -> Result<Vec<LedgerEvent>> {
        let cf = self.cf_handle(CF_EVENTS)?;
        let start = from.to_be_bytes();

        let mut events = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(&start, Direction::Forward))
            .take(limit)
        {
            let (_, value) = item?;
            events.push(bincode::deserialize(&value)?);
        }

        Ok(events)
    }

    /// Approximate number of stored events
    pub fn approximate_event_count(&self) -> Result<u64> {
        let cf = self.cf_handle(CF_EVENTS)?;
        Ok(self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use crate::types::AccountId;
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (config, temp_dir)
    }

    fn funded(account: &str) -> EventKind {
        EventKind::AirlineFunded {
            account: AccountId::new(account),
            deposit: Decimal::from(10),
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.db.cf_handle(CF_EVENTS).is_some());
        assert!(storage.db.cf_handle(CF_STATE).is_some());
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_commit_and_load() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let (state, kinds) = SuretyState::genesis(&config);
        let (head, events) = ChainHead::default().seal(kinds).unwrap();
        storage.commit(&state, &head, &events).unwrap();

        let snapshot = storage.load().unwrap().unwrap();
        assert_eq!(snapshot.state, state);
        assert_eq!(snapshot.head, head);

        let first = storage.get_event(0).unwrap().unwrap();
        assert_eq!(first, events[0]);
        assert!(storage.get_event(head.next_sequence).unwrap().is_none());
    }

    #[test]
    fn test_events_since_orders_by_sequence() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let (state, _) = SuretyState::genesis(&config);

        // More than 256 events so byte order matters
        let kinds: Vec<_> = (0..300).map(|i| funded(&format!("airline{}", i))).collect();
        let (head, events) = ChainHead::default().seal(kinds).unwrap();
        storage.commit(&state, &head, &events).unwrap();

        let page = storage.events_since(250, 10).unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page[0].sequence, 250);
        assert_eq!(page[9].sequence, 259);

        let tail = storage.events_since(295, 100).unwrap();
        assert_eq!(tail.len(), 5);
    }

    #[test]
    fn test_reopen_keeps_data() {
        let (config, _temp) = test_config();
        let (state, kinds) = SuretyState::genesis(&config);
        let (head, events) = ChainHead::default().seal(kinds).unwrap();

        {
            let storage = Storage::open(&config).unwrap();
            storage.commit(&state, &head, &events).unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        let snapshot = storage.load().unwrap().unwrap();
        assert_eq!(snapshot.head, head);
        assert_eq!(storage.events_since(0, 100).unwrap(), events);
    }
}
