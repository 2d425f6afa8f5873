//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `operations` - Operation log (key: client_name || 0x00 || timestamp)
//! - `balances` - Materialized balances (key: client_name)
//! - `credentials` - Administrative credential (key: `admin`)
//!
//! Operation keys sort by client first and time second, so a forward scan
//! yields every client's history in chronological order and client names
//! in alphabetical order.

use crate::{
    credentials::Credential,
    error::{Error, Result},
    types::{ClientName, Operation},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Column family names
const CF_OPERATIONS: &str = "operations";
const CF_BALANCES: &str = "balances";
const CF_CREDENTIALS: &str = "credentials";

const CREDENTIAL_KEY: &[u8] = b"admin";
const KEY_SEPARATOR: u8 = 0x00;

/// Materialized balance table, ordered by client name
pub type BalanceTable = BTreeMap<ClientName, Decimal>;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_OPERATIONS, Self::cf_options_operations()),
            ColumnFamilyDescriptor::new(CF_BALANCES, Options::default()),
            ColumnFamilyDescriptor::new(CF_CREDENTIALS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_operations() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key helpers

    fn operation_key(client: &ClientName, timestamp_nanos: i64) -> Vec<u8> {
        let mut key = Self::client_prefix(client);
        // Flip the sign bit so negative timestamps still sort first
        let ordered = (timestamp_nanos as u64) ^ (1u64 << 63);
        key.extend_from_slice(&ordered.to_be_bytes());
        key
    }

    fn client_prefix(client: &ClientName) -> Vec<u8> {
        let mut key = client.as_str().as_bytes().to_vec();
        key.push(KEY_SEPARATOR);
        key
    }

    fn client_from_key(key: &[u8]) -> Result<ClientName> {
        let end = key
            .iter()
            .position(|b| *b == KEY_SEPARATOR)
            .ok_or_else(|| Error::Storage("Operation key without separator".to_string()))?;
        let name = std::str::from_utf8(&key[..end])
            .map_err(|e| Error::Storage(format!("Operation key is not UTF-8: {}", e)))?;
        Ok(ClientName::from_normalized(name.to_string()))
    }

    // Operation log reads

    /// Every logged operation, grouped by client and in chronological order
    pub fn scan_operations(&self) -> Result<Vec<Operation>> {
        let cf = self.cf_handle(CF_OPERATIONS)?;
        let mut operations = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_, value) = item?;
            operations.push(bincode::deserialize(&value)?);
        }
        Ok(operations)
    }

    /// One client's operations in chronological order
    pub fn client_operations(&self, client: &ClientName) -> Result<Vec<Operation>> {
        let cf = self.cf_handle(CF_OPERATIONS)?;
        let prefix = Self::client_prefix(client);

        let mut operations = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix.as_slice(), Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            operations.push(bincode::deserialize(&value)?);
        }
        Ok(operations)
    }

    /// Lazily yield each distinct client name in alphabetical order
    pub fn client_names(&self) -> Result<ClientNames<'_>> {
        let cf = self.cf_handle(CF_OPERATIONS)?;
        Ok(ClientNames {
            inner: Box::new(self.db.iterator_cf(cf, IteratorMode::Start)),
            last: None,
        })
    }

    // Balance table reads

    /// Materialized balance of one client, if any
    pub fn get_balance(&self, client: &ClientName) -> Result<Option<Decimal>> {
        let cf = self.cf_handle(CF_BALANCES)?;
        match self.db.get_cf(cf, client.as_str().as_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Whole materialized balance table
    pub fn balances(&self) -> Result<BalanceTable> {
        let cf = self.cf_handle(CF_BALANCES)?;
        let mut table = BalanceTable::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let name = std::str::from_utf8(&key)
                .map_err(|e| Error::Storage(format!("Balance key is not UTF-8: {}", e)))?;
            table.insert(
                ClientName::from_normalized(name.to_string()),
                bincode::deserialize(&value)?,
            );
        }
        Ok(table)
    }

    // Credentials

    /// Stored administrative credential
    pub fn get_credential(&self) -> Result<Option<Credential>> {
        let cf = self.cf_handle(CF_CREDENTIALS)?;
        match self.db.get_cf(cf, CREDENTIAL_KEY)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    /// Store the credential unless one already exists
    pub fn seed_credential(&self, credential: &Credential) -> Result<bool> {
        if self.get_credential()?.is_some() {
            return Ok(false);
        }
        let cf = self.cf_handle(CF_CREDENTIALS)?;
        self.db
            .put_cf(cf, CREDENTIAL_KEY, bincode::serialize(credential)?)?;
        Ok(true)
    }

    // Transactions

    /// Start an atomic write scope
    pub fn transaction(&self) -> Transaction<'_> {
        Transaction {
            storage: self,
            batch: WriteBatch::default(),
        }
    }
}

/// Atomic write scope
///
/// Writes are staged in a `WriteBatch` and applied together by `commit`.
/// Dropping the transaction discards everything staged.
pub struct Transaction<'a> {
    storage: &'a Storage,
    batch: WriteBatch,
}

impl Transaction<'_> {
    /// Stage an operation append
    pub fn put_operation(&mut self, operation: &Operation) -> Result<()> {
        let cf = self.storage.cf_handle(CF_OPERATIONS)?;
        let key = Storage::operation_key(&operation.client, operation.timestamp_nanos);
        self.batch.put_cf(cf, key, bincode::serialize(operation)?);
        Ok(())
    }

    /// Stage deletion of a client's logged operations
    pub fn delete_operations(&mut self, operations: &[Operation]) -> Result<()> {
        let cf = self.storage.cf_handle(CF_OPERATIONS)?;
        for operation in operations {
            self.batch.delete_cf(
                cf,
                Storage::operation_key(&operation.client, operation.timestamp_nanos),
            );
        }
        Ok(())
    }

    /// Stage a full rebuild of the balance table
    ///
    /// Zero entries are never written.
    pub fn replace_balances(&mut self, table: &BalanceTable) -> Result<()> {
        let cf = self.storage.cf_handle(CF_BALANCES)?;
        for item in self.storage.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            self.batch.delete_cf(cf, key);
        }
        for (client, amount) in table.iter().filter(|(_, amount)| !amount.is_zero()) {
            self.batch
                .put_cf(cf, client.as_str().as_bytes(), bincode::serialize(amount)?);
        }
        Ok(())
    }

    /// Number of staged writes
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    /// True if nothing is staged
    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Apply all staged writes atomically
    pub fn commit(self) -> Result<()> {
        let staged = self.batch.len();
        self.storage.db.write(self.batch)?;
        tracing::debug!(staged, "Transaction committed");
        Ok(())
    }
}

type RawIterator<'a> =
    Box<dyn Iterator<Item = std::result::Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>> + 'a>;

/// Lazy, deduplicated client name scan over the operation log
pub struct ClientNames<'a> {
    inner: RawIterator<'a>,
    last: Option<ClientName>,
}

impl Iterator for ClientNames<'_> {
    type Item = Result<ClientName>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, _) = match self.inner.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            let client = match Storage::client_from_key(&key) {
                Ok(client) => client,
                Err(e) => return Some(Err(e)),
            };
            // Keys are sorted, so repeats are always adjacent
            if self.last.as_ref() == Some(&client) {
                continue;
            }
            self.last = Some(client.clone());
            return Some(Ok(client));
        }
    }
}
