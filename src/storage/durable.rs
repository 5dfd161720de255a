//! Durable wide-column backend over [`sled`], an embedded ordered-keyspace
//! engine. Sled's keys are naturally byte-ordered within a tree, which is
//! exactly the ordering [`StorageBackend::get_slice`] needs (§4.1), so the
//! composite key scheme below maps directly onto it without a secondary
//! index.
//!
//! ## Key layout
//!
//! Every table is its own sled `Tree` (`db.open_tree(table)`). Within a
//! tree:
//! - flat rows: key = `row`
//! - super-column rows: key = `row<SEP>super_col`
//!
//! A row's super-columns therefore sort contiguously and
//! [`sled::Tree::range`] gives us the slice directly.
//!
//! ## Batching
//!
//! Sled has its own (synchronous) `Batch` type; we adapt it to this crate's
//! scoped-batch API the same way the rest of the ecosystem adapts
//! closure-based transactional stores: queue logical operations while a
//! batch is open, then apply each queued operation as a `sled::Batch` per
//! affected tree and `apply_batch` it atomically on commit.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, Result, UsageError};
use crate::key::SEP;
use super::{ColumnMap, StorageBackend, TableSpec};

#[derive(Debug, Clone)]
enum BatchOp {
    Insert { table: String, row: String, columns: ColumnMap },
    InsertSuper { table: String, row: String, super_col: String, columns: ColumnMap },
    RemoveRow { table: String, row: String },
    RemoveSuper { table: String, row: String, super_col: String },
    RemoveColumns { table: String, row: String, super_col: Option<String>, columns: Vec<String> },
}

/// Durable [`StorageBackend`] backed by a sled database on disk.
pub struct SledBackend {
    db: sled::Db,
    batch: Mutex<Option<Vec<BatchOp>>>,
}

fn encode_columns(columns: &ColumnMap) -> Result<Vec<u8>> {
    bincode::serialize(columns).map_err(|e| Error::backend_failure(SledCodecError(e.to_string())))
}

fn decode_columns(bytes: &[u8]) -> Result<ColumnMap> {
    bincode::deserialize(bytes).map_err(|e| Error::backend_failure(SledCodecError(e.to_string())))
}

#[derive(Debug)]
struct SledCodecError(String);

impl std::fmt::Display for SledCodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sled value codec error: {}", self.0)
    }
}
impl std::error::Error for SledCodecError {}

fn super_row_key(row: &str, super_col: &str) -> String {
    format!("{row}{SEP}{super_col}")
}

fn split_super_row_key(key: &str, row: &str) -> Option<String> {
    key.strip_prefix(row).and_then(|rest| rest.strip_prefix(SEP)).map(str::to_string)
}

impl SledBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path).map_err(Error::backend_failure)?;
        Ok(Self { db, batch: Mutex::new(None) })
    }

    /// An entirely in-memory sled instance, useful where a path-backed
    /// store is wanted (e.g. to exercise the durable code path) without
    /// touching disk.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open().map_err(Error::backend_failure)?;
        Ok(Self { db, batch: Mutex::new(None) })
    }

    fn tree(&self, table: &str) -> Result<sled::Tree> {
        self.db.open_tree(table).map_err(Error::backend_failure)
    }

    fn apply(&self, op: &BatchOp) -> Result<()> {
        match op {
            BatchOp::Insert { table, row, columns } => {
                let tree = self.tree(table)?;
                let merged = merge_columns(tree.get(row.as_bytes()).map_err(Error::backend_failure)?, columns)?;
                tree.insert(row.as_bytes(), merged).map_err(Error::backend_failure)?;
            }
            BatchOp::InsertSuper { table, row, super_col, columns } => {
                let tree = self.tree(table)?;
                let key = super_row_key(row, super_col);
                let merged = merge_columns(tree.get(key.as_bytes()).map_err(Error::backend_failure)?, columns)?;
                tree.insert(key.as_bytes(), merged).map_err(Error::backend_failure)?;
            }
            BatchOp::RemoveRow { table, row } => {
                let tree = self.tree(table)?;
                tree.remove(row.as_bytes()).map_err(Error::backend_failure)?;
                let prefix = format!("{row}{SEP}");
                for key in tree.scan_prefix(prefix.as_bytes()).keys() {
                    let key = key.map_err(Error::backend_failure)?;
                    tree.remove(key).map_err(Error::backend_failure)?;
                }
            }
            BatchOp::RemoveSuper { table, row, super_col } => {
                let tree = self.tree(table)?;
                tree.remove(super_row_key(row, super_col).as_bytes()).map_err(Error::backend_failure)?;
            }
            BatchOp::RemoveColumns { table, row, super_col, columns } => {
                let tree = self.tree(table)?;
                let key = match super_col {
                    Some(sc) => super_row_key(row, sc),
                    None => row.clone(),
                };
                if let Some(bytes) = tree.get(key.as_bytes()).map_err(Error::backend_failure)? {
                    let mut map = decode_columns(&bytes)?;
                    for c in columns {
                        map.remove(c);
                    }
                    let encoded = encode_columns(&map)?;
                    tree.insert(key.as_bytes(), encoded).map_err(Error::backend_failure)?;
                }
            }
        }
        Ok(())
    }
}

fn merge_columns(existing: Option<sled::IVec>, incoming: &ColumnMap) -> Result<Vec<u8>> {
    let mut map = match existing {
        Some(bytes) => decode_columns(&bytes)?,
        None => ColumnMap::new(),
    };
    map.extend(incoming.clone());
    encode_columns(&map)
}

#[async_trait]
impl StorageBackend for SledBackend {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.db.tree_names().iter().any(|n| n == table.as_bytes()))
    }

    async fn create_table(&self, table: &str, _spec: TableSpec) -> Result<()> {
        self.tree(table)?;
        Ok(())
    }

    async fn get(&self, table: &str, row: &str) -> Result<Option<ColumnMap>> {
        let tree = self.tree(table)?;
        match tree.get(row.as_bytes()).map_err(Error::backend_failure)? {
            Some(bytes) => Ok(Some(decode_columns(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_super(&self, table: &str, row: &str, super_col: &str) -> Result<Option<ColumnMap>> {
        let tree = self.tree(table)?;
        let key = super_row_key(row, super_col);
        match tree.get(key.as_bytes()).map_err(Error::backend_failure)? {
            Some(bytes) => Ok(Some(decode_columns(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_slice(
        &self,
        table: &str,
        row: &str,
        column_start: &str,
        column_finish: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, ColumnMap)>> {
        let tree = self.tree(table)?;
        let start = super_row_key(row, column_start);
        let end = super_row_key(row, column_finish);
        let mut out = Vec::new();
        for entry in tree.range(start.as_bytes().to_vec()..end.as_bytes().to_vec()) {
            let (key, value) = entry.map_err(Error::backend_failure)?;
            let key = String::from_utf8_lossy(&key).to_string();
            let Some(super_col) = split_super_row_key(&key, row) else { continue };
            out.push((super_col, decode_columns(&value)?));
            if let Some(n) = limit {
                if out.len() >= n {
                    break;
                }
            }
        }
        trace!(table, row, column_start, column_finish, hits = out.len(), "get_slice");
        Ok(out)
    }

    async fn insert(&self, table: &str, row: &str, columns: ColumnMap) -> Result<()> {
        let op = BatchOp::Insert { table: table.to_string(), row: row.to_string(), columns };
        let mut batch = self.batch.lock();
        match batch.as_mut() {
            Some(ops) => ops.push(op),
            None => self.apply(&op)?,
        }
        Ok(())
    }

    async fn insert_super(
        &self,
        table: &str,
        row: &str,
        super_col: &str,
        columns: ColumnMap,
    ) -> Result<()> {
        let op = BatchOp::InsertSuper {
            table: table.to_string(),
            row: row.to_string(),
            super_col: super_col.to_string(),
            columns,
        };
        let mut batch = self.batch.lock();
        match batch.as_mut() {
            Some(ops) => ops.push(op),
            None => self.apply(&op)?,
        }
        Ok(())
    }

    async fn remove_row(&self, table: &str, row: &str) -> Result<()> {
        let op = BatchOp::RemoveRow { table: table.to_string(), row: row.to_string() };
        let mut batch = self.batch.lock();
        match batch.as_mut() {
            Some(ops) => ops.push(op),
            None => self.apply(&op)?,
        }
        Ok(())
    }

    async fn remove_super(&self, table: &str, row: &str, super_col: &str) -> Result<()> {
        let op = BatchOp::RemoveSuper {
            table: table.to_string(),
            row: row.to_string(),
            super_col: super_col.to_string(),
        };
        let mut batch = self.batch.lock();
        match batch.as_mut() {
            Some(ops) => ops.push(op),
            None => self.apply(&op)?,
        }
        Ok(())
    }

    async fn remove_columns(
        &self,
        table: &str,
        row: &str,
        super_col: Option<&str>,
        columns: &[String],
    ) -> Result<()> {
        let op = BatchOp::RemoveColumns {
            table: table.to_string(),
            row: row.to_string(),
            super_col: super_col.map(String::from),
            columns: columns.to_vec(),
        };
        let mut batch = self.batch.lock();
        match batch.as_mut() {
            Some(ops) => ops.push(op),
            None => self.apply(&op)?,
        }
        Ok(())
    }

    async fn begin_batch(&self) -> Result<()> {
        let mut batch = self.batch.lock();
        if batch.is_some() {
            return Err(UsageError::BatchAlreadyOpen.into());
        }
        *batch = Some(Vec::new());
        debug!("batch opened");
        Ok(())
    }

    async fn commit_batch(&self) -> Result<()> {
        let ops = {
            let mut batch = self.batch.lock();
            batch.take().ok_or(UsageError::NoBatchOpen)?
        };
        debug!(ops = ops.len(), "batch committing");
        for op in &ops {
            self.apply(op)?;
        }
        self.db.flush_async().await.map_err(Error::backend_failure)?;
        Ok(())
    }

    async fn discard_batch(&self) -> Result<()> {
        let mut batch = self.batch.lock();
        let ops = batch.take().ok_or(UsageError::NoBatchOpen)?;
        debug!(ops = ops.len(), "batch discarded");
        Ok(())
    }
}
