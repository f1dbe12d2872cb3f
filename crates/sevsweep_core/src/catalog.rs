//! Schema catalog reader — which tables and fields carry severity values.
//!
//! Discovery is driven entirely by the store's own metadata catalog, so a
//! schema reconfiguration (new point classes, new severity fields) needs no
//! change here.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::ports::SeverityStore;

/// How a table keys its rows.
///
/// `Identity` tables address each row by a single name; `Aggregate` tables
/// bundle named sub-instances into one physical row, each sub-instance
/// exposing its own severity fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableShape {
    Identity,
    Aggregate,
}

impl TableShape {
    /// The identity column selected alongside the severity fields.
    pub fn identity_column(&self) -> &'static str {
        match self {
            Self::Identity => "full_name",
            Self::Aggregate => "aggr_name",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Aggregate => "aggregate",
        }
    }

    fn from_marker(marker: &str) -> Self {
        if marker == "aggr_name" {
            Self::Aggregate
        } else {
            Self::Identity
        }
    }
}

impl std::fmt::Display for TableShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const TABLES_SQL: &str = "SELECT DISTINCT table_name, field_name \
     FROM scada.field_catalog \
     WHERE field_name IN ('full_name', 'aggr_name')";

// Severity-named fields, plus the alarm-reprioritisation target which is
// severity-typed despite its name. Only integer, single-valued, writable,
// non-computed storage qualifies.
const FIELDS_SQL: &str = "SELECT table_name || '.' || field_name, table_name \
     FROM scada.field_catalog \
     WHERE (field_name LIKE '%severity%' \
            OR table_name || '.' || field_name = 'alarm_action.new_priority') \
       AND storage_kind = 'integer' \
       AND NOT is_array \
       AND is_writable \
       AND NOT is_computed";

/// Enumerate tables that can own severity rows, keyed by name with their
/// row-addressing shape.
pub async fn severity_tables(store: &dyn SeverityStore) -> Result<BTreeMap<String, TableShape>> {
    let mut tables: BTreeMap<String, TableShape> = BTreeMap::new();
    for cells in store.run_query(TABLES_SQL).await? {
        let (Some(table), Some(marker)) = (
            cells.first().and_then(|c| c.as_str()),
            cells.get(1).and_then(|c| c.as_str()),
        ) else {
            continue;
        };
        let shape = TableShape::from_marker(marker);
        // A table exposing both markers is addressed as an aggregate.
        let slot = tables.entry(table.to_string()).or_insert(shape);
        if shape == TableShape::Aggregate {
            *slot = TableShape::Aggregate;
        }
        debug!(table, shape = %shape, "severity table candidate");
    }
    if tables.is_empty() {
        info!("no candidate tables found in the store");
    }
    Ok(tables)
}

/// Enumerate severity-typed fields, qualified name ("table.field") mapped to
/// the owning table.
pub async fn severity_fields(store: &dyn SeverityStore) -> Result<BTreeMap<String, String>> {
    let mut fields = BTreeMap::new();
    for cells in store.run_query(FIELDS_SQL).await? {
        let (Some(qualified), Some(table)) = (
            cells.first().and_then(|c| c.as_str()),
            cells.get(1).and_then(|c| c.as_str()),
        ) else {
            continue;
        };
        fields.insert(qualified.to_string(), table.to_string());
    }
    if fields.is_empty() {
        info!("no severity fields found in the store");
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_column_is_total_over_shape() {
        assert_eq!(TableShape::Identity.identity_column(), "full_name");
        assert_eq!(TableShape::Aggregate.identity_column(), "aggr_name");
    }

    #[test]
    fn marker_selects_shape() {
        assert_eq!(TableShape::from_marker("aggr_name"), TableShape::Aggregate);
        assert_eq!(TableShape::from_marker("full_name"), TableShape::Identity);
    }

    #[test]
    fn shape_display() {
        assert_eq!(TableShape::Identity.to_string(), "identity");
        assert_eq!(TableShape::Aggregate.to_string(), "aggregate");
    }
}
