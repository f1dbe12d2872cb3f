//! Store port for the sweep pipeline.
//! Implemented by sevsweep_postgres — core logic depends only on this trait.

use async_trait::async_trait;

use crate::error::Result;
use crate::value::SqlValue;

/// Global row identity in the store. Every object row, whatever its table,
/// is addressable by this id for property reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowId(pub i64);

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The capability set the core needs from the store: schema/data queries,
/// single-property read/write, a writability probe, and a row-count probe.
///
/// The store offers no transaction spanning the sweep, so callers defend
/// against concurrent mutation with a read-compare-write sequence rather
/// than locking.
#[async_trait]
pub trait SeverityStore: Send + Sync {
    /// Run a read-only query, returning rows of cells in select order.
    async fn run_query(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>>;

    /// Read one property of one row. Aggregate-qualified names
    /// ("Pump1.severity") resolve server-side.
    async fn read_property(&self, row: RowId, field: &str) -> Result<SqlValue>;

    /// Write one property of one row.
    async fn write_property(&self, row: RowId, field: &str, value: i64) -> Result<()>;

    /// Whether the property currently accepts a write for this row
    /// (template locks and overrides say no).
    async fn is_writable(&self, row: RowId, field: &str) -> Result<bool>;

    /// Row count for a table, template-derived rows included.
    async fn row_count(&self, table: &str) -> Result<i64>;
}
