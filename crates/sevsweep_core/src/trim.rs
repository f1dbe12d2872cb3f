//! Trims the catalog to tables that actually hold rows, bounding the
//! inventory read to populated tables.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::catalog::TableShape;
use crate::error::{Result, SweepError};
use crate::ports::SeverityStore;

/// Keep tables that own at least one candidate field and at least one row
/// (template-derived rows count), then keep only fields whose owner
/// survived.
pub async fn trim(
    store: &dyn SeverityStore,
    tables: &BTreeMap<String, TableShape>,
    fields: &BTreeMap<String, String>,
) -> Result<(BTreeMap<String, TableShape>, BTreeMap<String, String>)> {
    let mut kept_tables = BTreeMap::new();
    for (table, shape) in tables {
        if !fields.values().any(|owner| owner == table) {
            continue;
        }
        match store.row_count(table).await {
            Ok(0) => debug!(table = %table, "empty table dropped"),
            Ok(rows) => {
                debug!(table = %table, rows, "table with severity content");
                kept_tables.insert(table.clone(), *shape);
            }
            Err(e @ SweepError::Connection(_)) => return Err(e),
            Err(e) => warn!(table = %table, error = %e, "row-count probe failed, table skipped"),
        }
    }

    let kept_fields: BTreeMap<String, String> = fields
        .iter()
        .filter(|(_, owner)| kept_tables.contains_key(*owner))
        .map(|(qualified, owner)| (qualified.clone(), owner.clone()))
        .collect();
    for qualified in kept_fields.keys() {
        debug!(field = %qualified, "field in table with severity content");
    }

    Ok((kept_tables, kept_fields))
}
