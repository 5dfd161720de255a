//! In-memory wide-column storage backend.
//!
//! This is the reference implementation of [`StorageBackend`]: a nested map
//! of `table -> row -> (optional super-column) -> column -> value`, guarded
//! by a single `RwLock` per table (writes inside one table are therefore
//! atomic with respect to readers; a batch spanning several tables is
//! atomic because the batch buffer is applied while holding every table's
//! write lock it touches, in one critical section).
//!
//! ## Limitations
//!
//! - Single-process only; nothing here is durable.
//! - A batch commit locks every table it wrote to in turn; it is not a
//!   single global transaction across unrelated concurrent batches (there
//!   can only ever be one open batch at a time anyway, per §5).
//!
//! Use this backend for tests, embedding, and as the behavioral reference
//! the durable backend is checked against.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{Result, UsageError};
use super::{ColumnMap, StorageBackend, TableSpec};

/// A table's rows. Every row is either flat columns or a super-column
/// family; which one depends on [`TableSpec::super_column`] at creation
/// time, but we don't need to track that here — the two row shapes are
/// disjoint and the engine never mixes calls against one table.
#[derive(Default)]
struct Table {
    #[allow(dead_code)] // kept for parity with the durable backend's table registry
    spec: TableSpec,
    flat_rows: BTreeMap<String, ColumnMap>,
    super_rows: BTreeMap<String, BTreeMap<String, ColumnMap>>,
}

#[derive(Debug, Clone)]
enum BatchOp {
    Insert { table: String, row: String, columns: ColumnMap },
    InsertSuper { table: String, row: String, super_col: String, columns: ColumnMap },
    RemoveRow { table: String, row: String },
    RemoveSuper { table: String, row: String, super_col: String },
    RemoveColumns { table: String, row: String, super_col: Option<String>, columns: Vec<String> },
}

#[derive(Default)]
struct Inner {
    tables: RwLock<std::collections::HashMap<String, RwLock<Table>>>,
    /// `Some` while a batch is open; queued operations awaiting commit.
    batch: RwLock<Option<Vec<BatchOp>>>,
}

/// In-memory reference implementation of [`StorageBackend`].
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<Inner>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_table<R>(&self, table: &str, f: impl FnOnce(&Table) -> R) -> Option<R> {
        let tables = self.inner.tables.read();
        tables.get(table).map(|t| f(&t.read()))
    }

    fn ensure_table(&self, table: &str) {
        let mut tables = self.inner.tables.write();
        tables.entry(table.to_string()).or_insert_with(|| RwLock::new(Table::default()));
    }

    /// Queue a write if a batch is open; otherwise apply it immediately.
    /// Returns `true` if the write was queued (caller should stop).
    fn maybe_queue(&self, op: BatchOp) -> bool {
        let mut batch = self.inner.batch.write();
        if let Some(ops) = batch.as_mut() {
            ops.push(op);
            true
        } else {
            false
        }
    }

    fn apply(&self, op: &BatchOp) {
        match op {
            BatchOp::Insert { table, row, columns } => {
                self.ensure_table(table);
                let tables = self.inner.tables.read();
                let mut t = tables.get(table).unwrap().write();
                t.flat_rows.entry(row.clone()).or_default().extend(columns.clone());
            }
            BatchOp::InsertSuper { table, row, super_col, columns } => {
                self.ensure_table(table);
                let tables = self.inner.tables.read();
                let mut t = tables.get(table).unwrap().write();
                t.super_rows
                    .entry(row.clone())
                    .or_default()
                    .entry(super_col.clone())
                    .or_default()
                    .extend(columns.clone());
            }
            BatchOp::RemoveRow { table, row } => {
                if let Some(tables) = Some(self.inner.tables.read()) {
                    if let Some(t) = tables.get(table) {
                        let mut t = t.write();
                        t.flat_rows.remove(row);
                        t.super_rows.remove(row);
                    }
                }
            }
            BatchOp::RemoveSuper { table, row, super_col } => {
                let tables = self.inner.tables.read();
                if let Some(t) = tables.get(table) {
                    let mut t = t.write();
                    if let Some(cols) = t.super_rows.get_mut(row) {
                        cols.remove(super_col);
                    }
                }
            }
            BatchOp::RemoveColumns { table, row, super_col, columns } => {
                let tables = self.inner.tables.read();
                if let Some(t) = tables.get(table) {
                    let mut t = t.write();
                    match super_col {
                        Some(sc) => {
                            if let Some(cols) = t.super_rows.get_mut(row).and_then(|sr| sr.get_mut(sc)) {
                                for c in columns {
                                    cols.remove(c);
                                }
                            }
                        }
                        None => {
                            if let Some(cols) = t.flat_rows.get_mut(row) {
                                for c in columns {
                                    cols.remove(c);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.inner.tables.read().contains_key(table))
    }

    async fn create_table(&self, table: &str, spec: TableSpec) -> Result<()> {
        let mut tables = self.inner.tables.write();
        tables.entry(table.to_string()).or_insert_with(|| RwLock::new(Table { spec, ..Table::default() }));
        Ok(())
    }

    async fn get(&self, table: &str, row: &str) -> Result<Option<ColumnMap>> {
        Ok(self.with_table(table, |t| t.flat_rows.get(row).cloned()).flatten())
    }

    async fn get_super(&self, table: &str, row: &str, super_col: &str) -> Result<Option<ColumnMap>> {
        Ok(self
            .with_table(table, |t| t.super_rows.get(row).and_then(|sr| sr.get(super_col).cloned()))
            .flatten())
    }

    async fn get_slice(
        &self,
        table: &str,
        row: &str,
        column_start: &str,
        column_finish: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, ColumnMap)>> {
        let result = self
            .with_table(table, |t| {
                t.super_rows
                    .get(row)
                    .map(|sr| {
                        sr.range(column_start.to_string()..column_finish.to_string())
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default()
            })
            .unwrap_or_default();
        let result = match limit {
            Some(n) => result.into_iter().take(n).collect(),
            None => result,
        };
        trace!(table, row, column_start, column_finish, hits = result.len(), "get_slice");
        Ok(result)
    }

    async fn insert(&self, table: &str, row: &str, columns: ColumnMap) -> Result<()> {
        let op = BatchOp::Insert { table: table.to_string(), row: row.to_string(), columns };
        if !self.maybe_queue(op.clone()) {
            self.apply(&op);
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
        if !self.maybe_queue(op.clone()) {
            self.apply(&op);
        }
        Ok(())
    }

    async fn remove_row(&self, table: &str, row: &str) -> Result<()> {
        let op = BatchOp::RemoveRow { table: table.to_string(), row: row.to_string() };
        if !self.maybe_queue(op.clone()) {
            self.apply(&op);
        }
        Ok(())
    }

    async fn remove_super(&self, table: &str, row: &str, super_col: &str) -> Result<()> {
        let op = BatchOp::RemoveSuper {
            table: table.to_string(),
            row: row.to_string(),
            super_col: super_col.to_string(),
        };
        if !self.maybe_queue(op.clone()) {
            self.apply(&op);
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
        if !self.maybe_queue(op.clone()) {
            self.apply(&op);
        }
        Ok(())
    }

    async fn begin_batch(&self) -> Result<()> {
        let mut batch = self.inner.batch.write();
        if batch.is_some() {
            return Err(UsageError::BatchAlreadyOpen.into());
        }
        *batch = Some(Vec::new());
        debug!("batch opened");
        Ok(())
    }

    async fn commit_batch(&self) -> Result<()> {
        let ops = {
            let mut batch = self.inner.batch.write();
            batch.take().ok_or(UsageError::NoBatchOpen)?
        };
        debug!(ops = ops.len(), "batch committing");
        for op in &ops {
            self.apply(op);
        }
        Ok(())
    }

    async fn discard_batch(&self) -> Result<()> {
        let mut batch = self.inner.batch.write();
        let ops = batch.take().ok_or(UsageError::NoBatchOpen)?;
        debug!(ops = ops.len(), "batch discarded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(pairs: &[(&str, &str)]) -> ColumnMap {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn insert_and_get_flat_row() {
        let backend = InMemoryBackend::new();
        backend.insert("people", "alice", cols(&[("sound", "hi")])).await.unwrap();
        let row = backend.get("people", "alice").await.unwrap().unwrap();
        assert_eq!(row.get("sound").unwrap(), "hi");
    }

    #[tokio::test]
    async fn get_slice_respects_range_and_order() {
        let backend = InMemoryBackend::new();
        backend.insert_super("outbound", "person__a", "friend\u{1f}1", cols(&[("x", "1")])).await.unwrap();
        backend.insert_super("outbound", "person__a", "friend\u{1f}2", cols(&[("x", "2")])).await.unwrap();
        backend.insert_super("outbound", "person__a", "enemy\u{1f}1", cols(&[("x", "3")])).await.unwrap();

        let slice = backend
            .get_slice("outbound", "person__a", "friend\u{1f}", "friend\u{20}", None)
            .await
            .unwrap();
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[0].0, "friend\u{1f}1");
        assert_eq!(slice[1].0, "friend\u{1f}2");
    }

    #[tokio::test]
    async fn batch_is_invisible_until_commit() {
        let backend = InMemoryBackend::new();
        backend.begin_batch().await.unwrap();
        backend.insert("people", "alice", cols(&[("sound", "hi")])).await.unwrap();
        assert!(backend.get("people", "alice").await.unwrap().is_none());
        backend.commit_batch().await.unwrap();
        assert!(backend.get("people", "alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn discarded_batch_leaves_no_trace() {
        let backend = InMemoryBackend::new();
        backend.begin_batch().await.unwrap();
        backend.insert("people", "alice", cols(&[("sound", "hi")])).await.unwrap();
        backend.discard_batch().await.unwrap();
        assert!(backend.get("people", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn batches_do_not_nest() {
        let backend = InMemoryBackend::new();
        backend.begin_batch().await.unwrap();
        assert!(backend.begin_batch().await.is_err());
    }

    #[tokio::test]
    async fn remove_row_clears_flat_and_super_shapes() {
        let backend = InMemoryBackend::new();
        backend.insert("people", "alice", cols(&[("sound", "hi")])).await.unwrap();
        backend.remove_row("people", "alice").await.unwrap();
        assert!(backend.get("people", "alice").await.unwrap().is_none());
    }
}
