//! End-to-end sweep pipeline: registry → catalog → trim → inventory →
//! detect/remap → summary. Strictly sequential; the store connection is the
//! caller's to acquire and release.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::catalog;
use crate::detect;
use crate::error::{Result, SweepError};
use crate::inventory;
use crate::ports::SeverityStore;
use crate::registry::SeverityRegistry;
use crate::remap::{self, RemapOptions, RemapPolicy};
use crate::trim;

/// Caller configuration for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Remap values recorded at this level (requires `remap_to`).
    pub remap_from: Option<i64>,
    /// Remap matched values to this level (requires `remap_from`).
    pub remap_to: Option<i64>,
    /// Make store changes; dry run otherwise.
    pub apply: bool,
    /// Pause between server requests during the write phase.
    pub delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            remap_from: None,
            remap_to: None,
            apply: false,
            delay: Duration::ZERO,
        }
    }
}

impl RunOptions {
    /// Half a remap pair is fatal up front.
    fn policy(&self) -> Result<RemapPolicy> {
        match (self.remap_from, self.remap_to) {
            (Some(from), Some(to)) => Ok(RemapPolicy::Explicit { from, to }),
            (None, None) => Ok(RemapPolicy::NextLower),
            _ => Err(SweepError::InvalidInput(
                "only one of remap-from/remap-to given; both are required to remap".into(),
            )),
        }
    }
}

/// Final tally for one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub tables_scanned: usize,
    pub fields_scanned: usize,
    pub rows_with_severity: usize,
    pub unmapped: usize,
    pub changed: u64,
    pub errors: u64,
    pub elapsed_secs: f64,
}

/// Run the whole pipeline against `store`.
pub async fn run(store: &dyn SeverityStore, opts: &RunOptions) -> Result<RunSummary> {
    let started_at = Utc::now();
    let clock = Instant::now();

    let policy = opts.policy()?;

    info!("reading configured severity levels");
    let registry = SeverityRegistry::load(store).await?;
    for (level, label) in registry.iter() {
        info!(level, label, "severity level");
    }

    if let RemapPolicy::Explicit { to, .. } = policy {
        if !registry.contains(to) {
            return Err(SweepError::InvalidInput(format!(
                "cannot remap to severity {to}: not configured"
            )));
        }
    }

    let tables = catalog::severity_tables(store).await?;
    info!(count = tables.len(), "candidate tables in the store");
    let fields = catalog::severity_fields(store).await?;
    info!(count = fields.len(), "candidate severity fields");

    let (tables, fields) = trim::trim(store, &tables, &fields).await?;
    info!(
        tables = tables.len(),
        fields = fields.len(),
        "after trimming empty tables"
    );

    info!("reading store severity values");
    let mut entries = inventory::build_inventory(store, &tables, &fields).await?;
    let rows_with_severity = entries.len();
    info!(rows = rows_with_severity, "rows with severity values");

    if opts.apply {
        info!("modifying severities");
    } else {
        info!("checking for writable severities (dry run)");
    }

    let remap_opts = RemapOptions {
        apply: opts.apply,
        delay: opts.delay,
    };
    let (unmapped, report) = match policy {
        RemapPolicy::Explicit { from, to } => {
            info!(from, to, "explicit severity remap");
            let report = remap::remap(store, &mut entries, &registry, policy, &remap_opts).await?;
            (0, report)
        }
        RemapPolicy::NextLower => {
            let mut targets = detect::find_unmapped(store, &entries, &registry).await?;
            info!(count = targets.len(), "unmapped severity values");
            let report = remap::remap(store, &mut targets, &registry, policy, &remap_opts).await?;
            (targets.len(), report)
        }
    };
    info!(changed = report.changed, planned = report.planned, "severities modified");

    Ok(RunSummary {
        started_at,
        tables_scanned: tables.len(),
        fields_scanned: fields.len(),
        rows_with_severity,
        unmapped,
        changed: report.changed,
        errors: report.errors,
        elapsed_secs: clock.elapsed().as_secs_f64(),
    })
}
