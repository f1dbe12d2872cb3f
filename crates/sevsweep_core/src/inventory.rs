//! Severity inventory — one read pass over every trimmed table.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::catalog::TableShape;
use crate::error::{Result, SweepError};
use crate::ports::{RowId, SeverityStore};

/// One physical row's severity values, keyed by effective field name.
///
/// Identity rows carry their display name from the projection; aggregate
/// rows resolve it lazily (a live property read) and key each field as
/// `"<subinstance>.<field>"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeverityEntry {
    pub table: String,
    pub row: RowId,
    pub display_name: Option<String>,
    pub fields: BTreeMap<String, i64>,
    pub changed: bool,
}

impl SeverityEntry {
    /// Fork carrying a single field, preserving row and table identity for
    /// later writeback.
    pub fn fork_field(&self, field: &str, value: i64) -> Self {
        Self {
            table: self.table.clone(),
            row: self.row,
            display_name: self.display_name.clone(),
            fields: BTreeMap::from([(field.to_string(), value)]),
            changed: false,
        }
    }
}

/// Bare field names owned by `table`, in select order.
fn table_fields<'a>(table: &str, fields: &'a BTreeMap<String, String>) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|(_, owner)| owner.as_str() == table)
        .filter_map(|(qualified, _)| {
            qualified
                .strip_prefix(table)
                .and_then(|rest| rest.strip_prefix('.'))
        })
        .collect()
}

fn projection_sql(table: &str, shape: TableShape, bare_fields: &[&str]) -> String {
    format!(
        "SELECT id, {}, {} FROM scada.{}",
        shape.identity_column(),
        bare_fields.join(", "),
        table
    )
}

fn effective_field(shape: TableShape, subinstance: &str, field: &str) -> String {
    match shape {
        TableShape::Identity => field.to_string(),
        TableShape::Aggregate => format!("{subinstance}.{field}"),
    }
}

/// Read every severity value in the trimmed tables: one projection query per
/// table, one entry per returned row — a single-pass snapshot. Concurrent
/// external writes after this read are caught by the remap engine's live
/// re-check, not here.
pub async fn build_inventory(
    store: &dyn SeverityStore,
    tables: &BTreeMap<String, TableShape>,
    fields: &BTreeMap<String, String>,
) -> Result<Vec<SeverityEntry>> {
    let mut inventory = Vec::new();

    for (table, &shape) in tables {
        let bare = table_fields(table, fields);
        if bare.is_empty() {
            continue;
        }
        debug!(table = %table, fields = bare.len(), "reading severity values");

        let sql = projection_sql(table, shape, &bare);
        let rows = match store.run_query(&sql).await {
            Ok(rows) => rows,
            Err(e @ SweepError::Connection(_)) => return Err(e),
            Err(e) => {
                warn!(table = %table, error = %e, "table read failed, skipped");
                continue;
            }
        };

        for cells in rows {
            let Some(id) = cells.first().and_then(|c| c.coerce_i64()) else {
                warn!(table = %table, "row without a readable id, skipped");
                continue;
            };
            let Some(identity) = cells.get(1).and_then(|c| c.as_str()) else {
                warn!(table = %table, row = id, "row without an identity value, skipped");
                continue;
            };

            let mut entry = SeverityEntry {
                table: table.clone(),
                row: RowId(id),
                display_name: match shape {
                    TableShape::Identity => Some(identity.to_string()),
                    TableShape::Aggregate => None,
                },
                fields: BTreeMap::new(),
                changed: false,
            };

            for (i, field) in bare.iter().enumerate() {
                match cells.get(i + 2).and_then(|c| c.coerce_i64()) {
                    Some(value) => {
                        entry.fields.insert(effective_field(shape, identity, field), value);
                    }
                    // Data error for this one field, not fatal to the run.
                    None => warn!(table = %table, row = id, field = %field, "non-integer severity cell, field skipped"),
                }
            }

            inventory.push(entry);
        }
    }

    Ok(inventory)
}
