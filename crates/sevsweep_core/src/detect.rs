//! Unmapped severity detection.

use tracing::debug;

use crate::error::Result;
use crate::inventory::SeverityEntry;
use crate::ports::SeverityStore;
use crate::registry::SeverityRegistry;

/// Scan the inventory for values outside the registry snapshot, forking one
/// single-field entry per offending field. The display-name lookup is a live
/// round trip per row, so it is only spent when the debug stream is on.
pub async fn find_unmapped(
    store: &dyn SeverityStore,
    inventory: &[SeverityEntry],
    registry: &SeverityRegistry,
) -> Result<Vec<SeverityEntry>> {
    let mut unmapped = Vec::new();

    for entry in inventory {
        for (field, &value) in &entry.fields {
            if registry.contains(value) {
                continue;
            }
            let mut fork = entry.fork_field(field, value);
            if tracing::enabled!(tracing::Level::DEBUG) {
                if fork.display_name.is_none() {
                    if let Ok(name) = store.read_property(fork.row, "full_name").await {
                        fork.display_name = name.as_str().map(str::to_string);
                    }
                }
                debug!(
                    table = %fork.table,
                    row = %fork.row,
                    name = fork.display_name.as_deref().unwrap_or(""),
                    field = %field,
                    value,
                    "unmapped severity"
                );
            }
            unmapped.push(fork);
        }
    }

    Ok(unmapped)
}
