//! The remap engine — the only component with side effects on the store.
//!
//! Every targeted field goes through the same gauntlet: live re-read,
//! integer coercion, staleness comparison, writability probe, optional
//! delay, then dry-run report or write. The re-read is what collapses N
//! template-dependent rows into a single effective write.

use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::{Result, SweepError};
use crate::inventory::SeverityEntry;
use crate::ports::SeverityStore;
use crate::registry::SeverityRegistry;

/// How to pick the corrected value for a targeted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapPolicy {
    /// Rewrite every field recorded at `from` to `to`. The caller validates
    /// `to` against the registry before the engine runs.
    Explicit { from: i64, to: i64 },
    /// Snap each value down to the nearest valid level below it.
    NextLower,
}

#[derive(Debug, Clone)]
pub struct RemapOptions {
    /// Dry run unless set.
    pub apply: bool,
    /// Pause before each write, to shed load on the store.
    pub delay: Duration,
}

/// Per-field outcome counters for one engine pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemapReport {
    /// Successful writes.
    pub changed: u64,
    /// Writes the run would make, reported in dry-run mode.
    pub planned: u64,
    /// Store-rejected writes and failed property reads.
    pub errors: u64,
    /// Live value diverged from the recorded snapshot — usually a template
    /// a prior iteration already corrected. Not an error.
    pub stale: u64,
    /// Property not writable for this row (override or template lock).
    pub unwritable: u64,
    /// Live value would not coerce to an integer.
    pub type_anomalies: u64,
    /// Automatic policy found no level below the value; left as is.
    pub unresolved: u64,
}

/// Target for one recorded value under `policy`, or `None` when the field is
/// not visited at all.
fn target_for(policy: RemapPolicy, registry: &SeverityRegistry, recorded: i64) -> Option<i64> {
    match policy {
        RemapPolicy::Explicit { from, to } => (recorded == from).then_some(to),
        RemapPolicy::NextLower => registry.next_lower(recorded),
    }
}

/// Run one remap pass over `entries`. Returns the outcome counters; only
/// `changed` reflects store mutations.
pub async fn remap(
    store: &dyn SeverityStore,
    entries: &mut [SeverityEntry],
    registry: &SeverityRegistry,
    policy: RemapPolicy,
    opts: &RemapOptions,
) -> Result<RemapReport> {
    let mut report = RemapReport::default();

    for entry in entries.iter_mut() {
        let recorded_fields: Vec<(String, i64)> = entry
            .fields
            .iter()
            .map(|(field, value)| (field.clone(), *value))
            .collect();

        for (field, recorded) in recorded_fields {
            let target = match target_for(policy, registry, recorded) {
                Some(target) => target,
                None => {
                    if matches!(policy, RemapPolicy::NextLower) {
                        debug!(
                            table = %entry.table,
                            row = %entry.row,
                            field = %field,
                            value = recorded,
                            "no level below value, left as is"
                        );
                        report.unresolved += 1;
                    }
                    continue;
                }
            };
            let label = registry.label(target).unwrap_or("?");

            // The row name shows up in every narrated line; fetch it once
            // per entry, and only when something will be narrated.
            if entry.display_name.is_none()
                && (!opts.apply || tracing::enabled!(tracing::Level::INFO))
            {
                if let Ok(name) = store.read_property(entry.row, "full_name").await {
                    entry.display_name = name.as_str().map(str::to_string);
                }
            }
            let name = entry.display_name.clone().unwrap_or_default();

            // Optimistic re-check: a template edit in a prior iteration may
            // already have corrected this row.
            let live = match store.read_property(entry.row, &field).await {
                Ok(value) => value,
                Err(e @ SweepError::Connection(_)) => return Err(e),
                Err(e) => {
                    warn!(table = %entry.table, row = %entry.row, field = %field, error = %e, "property read failed");
                    report.errors += 1;
                    continue;
                }
            };
            let Some(live) = live.coerce_i64() else {
                warn!(
                    table = %entry.table,
                    row = %entry.row,
                    name = %name,
                    field = %field,
                    live = %live,
                    "live value is not an integer, skipped"
                );
                report.type_anomalies += 1;
                continue;
            };
            if live != recorded {
                debug!(
                    table = %entry.table,
                    row = %entry.row,
                    name = %name,
                    field = %field,
                    recorded,
                    live,
                    "no change needed, live value already moved"
                );
                report.stale += 1;
                continue;
            }

            match store.is_writable(entry.row, &field).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(
                        table = %entry.table,
                        row = %entry.row,
                        name = %name,
                        field = %field,
                        "property not writable, skipped"
                    );
                    report.unwritable += 1;
                    continue;
                }
                Err(e @ SweepError::Connection(_)) => return Err(e),
                Err(e) => {
                    warn!(table = %entry.table, row = %entry.row, field = %field, error = %e, "writability probe failed");
                    report.errors += 1;
                    continue;
                }
            }

            if !opts.delay.is_zero() {
                sleep(opts.delay).await;
            }

            if !opts.apply {
                info!(
                    table = %entry.table,
                    row = %entry.row,
                    name = %name,
                    field = %field,
                    from = recorded,
                    to = target,
                    label,
                    "use --change to apply"
                );
                report.planned += 1;
                continue;
            }

            match store.write_property(entry.row, &field, target).await {
                Ok(()) => {
                    entry.changed = true;
                    report.changed += 1;
                    info!(
                        table = %entry.table,
                        row = %entry.row,
                        name = %name,
                        field = %field,
                        from = recorded,
                        to = target,
                        label,
                        "changed"
                    );
                }
                Err(e) => {
                    warn!(
                        table = %entry.table,
                        row = %entry.row,
                        name = %name,
                        field = %field,
                        error = %e,
                        "property write failed"
                    );
                    report.errors += 1;
                }
            }
        }
    }

    if report.errors > 0 {
        warn!(errors = report.errors, "remap pass completed with errors");
    }
    Ok(report)
}
