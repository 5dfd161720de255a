//! # Storage Backend Trait
//!
//! This is the contract between the graph engine and any wide-column store
//! that supports super-columns (§4.1 of the design): rows hold either plain
//! columns or a further level of super-columns, columns are kept in
//! lexicographic byte order within a row, and writes can be grouped into a
//! batch committed atomically at backend granularity.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `InMemoryBackend` | `memory` | Full semantics, for tests and embedding |
//! | `SledBackend` | `durable` | Embedded ordered-keyspace engine (feature `durable`) |

pub mod memory;
#[cfg(feature = "durable")]
pub mod durable;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

pub use memory::InMemoryBackend;
#[cfg(feature = "durable")]
pub use durable::SledBackend;

/// Columns within one row or one super-column: column name -> codec-encoded
/// value. The engine is responsible for encoding/decoding via
/// [`crate::model::Value`]; the backend only ever sees strings.
pub type ColumnMap = HashMap<String, String>;

/// Table creation parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableSpec {
    /// Whether rows in this table have a super-column level (adjacency and
    /// pair-index tables) or are flat row -> column (per-type attribute
    /// tables).
    pub super_column: bool,
}

/// How to select a backend when constructing a [`crate::engine::Graph`].
///
/// The core never loads this from a file or environment itself — building
/// one is the embedding application's job (§6.3); `"memory"` maps to
/// [`BackendConfig::Memory`], any other value names a path for the durable
/// backend.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Memory,
    #[cfg(feature = "durable")]
    Durable { path: std::path::PathBuf },
}

/// The wide-column storage contract (§4.1).
///
/// Every method may block on I/O and is therefore `async`. Implementations
/// must preserve lexicographic byte ordering of columns and super-columns
/// within a row — [`StorageBackend::get_slice`] depends on it (§4.4).
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    async fn table_exists(&self, table: &str) -> Result<bool>;

    /// Create a table if it doesn't already exist. Idempotent.
    async fn create_table(&self, table: &str, spec: TableSpec) -> Result<()>;

    /// Read a flat row's columns.
    async fn get(&self, table: &str, row: &str) -> Result<Option<ColumnMap>>;

    /// Read one super-column's columns out of a super-family row.
    async fn get_super(&self, table: &str, row: &str, super_col: &str) -> Result<Option<ColumnMap>>;

    /// Read all super-columns in `[column_start, column_finish)` out of a
    /// row, in ascending lexicographic order.
    async fn get_slice(
        &self,
        table: &str,
        row: &str,
        column_start: &str,
        column_finish: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, ColumnMap)>>;

    /// Merge `columns` into a flat row.
    async fn insert(&self, table: &str, row: &str, columns: ColumnMap) -> Result<()>;

    /// Merge `columns` into a super-column of a row.
    async fn insert_super(
        &self,
        table: &str,
        row: &str,
        super_col: &str,
        columns: ColumnMap,
    ) -> Result<()>;

    /// Remove an entire row.
    async fn remove_row(&self, table: &str, row: &str) -> Result<()>;

    /// Remove one super-column out of a row.
    async fn remove_super(&self, table: &str, row: &str, super_col: &str) -> Result<()>;

    /// Remove specific columns from a row (or from a super-column of it, if
    /// `super_col` is given).
    async fn remove_columns(
        &self,
        table: &str,
        row: &str,
        super_col: Option<&str>,
        columns: &[String],
    ) -> Result<()>;

    /// Open a scoped batch. Writes issued after this call are queued, not
    /// applied, until [`StorageBackend::commit_batch`]. A `UsageError` if a
    /// batch is already open (§5: batches do not nest).
    async fn begin_batch(&self) -> Result<()>;

    /// Atomically apply every write queued since `begin_batch`. A
    /// `UsageError` if no batch is open.
    async fn commit_batch(&self) -> Result<()>;

    /// Discard every write queued since `begin_batch` without applying any
    /// of them. Used when a batch closure returns `Err` (§5) — the
    /// asynchronous-Rust stand-in for "guaranteed release on scope exit"
    /// since there is no async `Drop`.
    async fn discard_batch(&self) -> Result<()>;
}
