//! End-to-end pipeline properties against an in-memory store fake.
//!
//! The fake answers the same four query shapes the core issues (levels,
//! tables, fields, per-table projections) and models template inheritance by
//! letting several rows point at one shared value cell — a write through one
//! row is visible to every row sharing the cell, which is what the engine's
//! live re-read is there to absorb.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use sevsweep_core::catalog;
use sevsweep_core::error::{Result, SweepError};
use sevsweep_core::inventory;
use sevsweep_core::pipeline::{run, RunOptions};
use sevsweep_core::ports::{RowId, SeverityStore};
use sevsweep_core::registry::SeverityRegistry;
use sevsweep_core::remap::{remap, RemapOptions, RemapPolicy};
use sevsweep_core::trim;
use sevsweep_core::value::SqlValue;

// ── Fake store ─────────────────────────────────────────────────

struct FakeRow {
    id: i64,
    table: String,
    name: String,
    /// property path -> index into `cells`
    props: Vec<(String, usize)>,
}

#[derive(Default)]
struct FakeInner {
    levels: Vec<(i64, String)>,
    /// (table, identity marker: "full_name" | "aggr_name")
    tables: Vec<(String, String)>,
    /// (qualified field, owner table)
    fields: Vec<(String, String)>,
    rows: Vec<FakeRow>,
    /// Shared value cells, stored as text the way the property RPC serves
    /// them.
    cells: Vec<String>,
    /// (row id, property path) pairs refusing writes.
    locked: Vec<(i64, String)>,
    write_log: Vec<(i64, String, i64)>,
    fail_writes: bool,
}

#[derive(Default)]
struct FakeStore {
    inner: Mutex<FakeInner>,
}

impl FakeStore {
    fn new(levels: &[(i64, &str)]) -> Self {
        let store = Self::default();
        store.inner.lock().unwrap().levels =
            levels.iter().map(|(v, l)| (*v, l.to_string())).collect();
        store
    }

    fn add_identity_table(&self, table: &str, fields: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.tables.push((table.to_string(), "full_name".to_string()));
        for field in fields {
            inner
                .fields
                .push((format!("{table}.{field}"), table.to_string()));
        }
    }

    fn add_aggregate_table(&self, table: &str, fields: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        inner.tables.push((table.to_string(), "aggr_name".to_string()));
        for field in fields {
            inner
                .fields
                .push((format!("{table}.{field}"), table.to_string()));
        }
    }

    /// New value cell, returning its index for sharing between rows.
    fn add_cell(&self, value: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.cells.push(value.to_string());
        inner.cells.len() - 1
    }

    fn add_row(&self, table: &str, id: i64, name: &str, props: &[(&str, usize)]) {
        self.inner.lock().unwrap().rows.push(FakeRow {
            id,
            table: table.to_string(),
            name: name.to_string(),
            props: props
                .iter()
                .map(|(path, cell)| (path.to_string(), *cell))
                .collect(),
        });
    }

    /// Row with its own single-value cell; returns the cell index.
    fn add_simple_row(&self, table: &str, id: i64, name: &str, field: &str, value: i64) -> usize {
        let cell = self.add_cell(&value.to_string());
        self.add_row(table, id, name, &[(field, cell)]);
        cell
    }

    fn lock_property(&self, id: i64, path: &str) {
        self.inner
            .lock()
            .unwrap()
            .locked
            .push((id, path.to_string()));
    }

    fn fail_writes(&self) {
        self.inner.lock().unwrap().fail_writes = true;
    }

    fn set_cell(&self, cell: usize, value: &str) {
        self.inner.lock().unwrap().cells[cell] = value.to_string();
    }

    fn cell(&self, cell: usize) -> String {
        self.inner.lock().unwrap().cells[cell].clone()
    }

    fn writes(&self) -> Vec<(i64, String, i64)> {
        self.inner.lock().unwrap().write_log.clone()
    }

    fn projection(&self, sql: &str) -> Vec<Vec<SqlValue>> {
        let inner = self.inner.lock().unwrap();
        let body = sql.strip_prefix("SELECT id, ").expect("projection shape");
        let (columns, table) = body.split_once(" FROM scada.").expect("projection shape");
        let columns: Vec<&str> = columns.split(", ").collect();
        let bare_fields = &columns[1..];
        let aggregate = inner
            .tables
            .iter()
            .any(|(t, marker)| t == table && marker == "aggr_name");

        inner
            .rows
            .iter()
            .filter(|row| row.table == table)
            .map(|row| {
                let mut cells = vec![SqlValue::Int(row.id), SqlValue::Text(row.name.clone())];
                for field in bare_fields {
                    let path = if aggregate {
                        format!("{}.{}", row.name, field)
                    } else {
                        field.to_string()
                    };
                    let value = row
                        .props
                        .iter()
                        .find(|(p, _)| *p == path)
                        .map(|(_, cell)| inner.cells[*cell].clone());
                    cells.push(match value {
                        Some(text) => match text.parse::<i64>() {
                            Ok(v) => SqlValue::Int(v),
                            Err(_) => SqlValue::Text(text),
                        },
                        None => SqlValue::Null,
                    });
                }
                cells
            })
            .collect()
    }
}

#[async_trait]
impl SeverityStore for FakeStore {
    async fn run_query(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>> {
        if sql.contains("severity_level") {
            let inner = self.inner.lock().unwrap();
            return Ok(inner
                .levels
                .iter()
                .map(|(v, l)| vec![SqlValue::Int(*v), SqlValue::Text(l.clone())])
                .collect());
        }
        if sql.contains("field_catalog") && sql.contains("'full_name'") {
            let inner = self.inner.lock().unwrap();
            return Ok(inner
                .tables
                .iter()
                .map(|(t, marker)| vec![SqlValue::Text(t.clone()), SqlValue::Text(marker.clone())])
                .collect());
        }
        if sql.contains("field_catalog") {
            let inner = self.inner.lock().unwrap();
            return Ok(inner
                .fields
                .iter()
                .map(|(q, t)| vec![SqlValue::Text(q.clone()), SqlValue::Text(t.clone())])
                .collect());
        }
        Ok(self.projection(sql))
    }

    async fn read_property(&self, row: RowId, field: &str) -> Result<SqlValue> {
        let inner = self.inner.lock().unwrap();
        let Some(fake_row) = inner.rows.iter().find(|r| r.id == row.0) else {
            return Err(SweepError::Internal(anyhow::anyhow!("no row {row}")));
        };
        if field == "full_name" {
            return Ok(SqlValue::Text(fake_row.name.clone()));
        }
        match fake_row.props.iter().find(|(p, _)| p == field) {
            Some((_, cell)) => Ok(SqlValue::Text(inner.cells[*cell].clone())),
            None => Ok(SqlValue::Null),
        }
    }

    async fn write_property(&self, row: RowId, field: &str, value: i64) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.fail_writes {
            return Err(SweepError::Internal(anyhow::anyhow!("write refused")));
        }
        let Some(fake_row) = inner.rows.iter().find(|r| r.id == row.0) else {
            return Err(SweepError::Internal(anyhow::anyhow!("no row {row}")));
        };
        let Some((_, cell)) = fake_row.props.iter().find(|(p, _)| p == field) else {
            return Err(SweepError::Internal(anyhow::anyhow!("no property {field}")));
        };
        let cell = *cell;
        inner.cells[cell] = value.to_string();
        inner.write_log.push((row.0, field.to_string(), value));
        Ok(())
    }

    async fn is_writable(&self, row: RowId, field: &str) -> Result<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(!inner
            .locked
            .iter()
            .any(|(id, path)| *id == row.0 && path == field))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.rows.iter().filter(|r| r.table == table).count() as i64)
    }
}

fn dry_run() -> RunOptions {
    RunOptions::default()
}

fn apply() -> RunOptions {
    RunOptions {
        apply: true,
        ..Default::default()
    }
}

// ── Automatic policy ───────────────────────────────────────────

#[tokio::test]
async fn automatic_pass_snaps_unmapped_down() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium"), (4, "High")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", 3);
    let valid = store.add_simple_row("points", 2, "Site/B", "severity", 1);

    let summary = run(&store, &apply()).await.unwrap();

    assert_eq!(summary.tables_scanned, 1);
    assert_eq!(summary.fields_scanned, 1);
    assert_eq!(summary.rows_with_severity, 2);
    assert_eq!(summary.unmapped, 1);
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(store.writes(), vec![(1, "severity".to_string(), 2)]);
    // The valid row is never touched.
    assert_eq!(store.cell(valid), "1");
}

#[tokio::test]
async fn automatic_targets_zero_when_it_is_the_only_level_below() {
    let store = FakeStore::new(&[(2, "Medium"), (4, "High")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", 1);

    let summary = run(&store, &apply()).await.unwrap();

    assert_eq!(summary.changed, 1);
    assert_eq!(store.writes(), vec![(1, "severity".to_string(), 0)]);
}

#[tokio::test]
async fn automatic_leaves_values_with_nothing_below_unresolved() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", -5);

    let summary = run(&store, &apply()).await.unwrap();

    assert_eq!(summary.unmapped, 1);
    assert_eq!(summary.changed, 0);
    assert_eq!(summary.errors, 0);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn second_automatic_pass_is_idempotent() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium"), (4, "High")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", 3);
    store.add_simple_row("points", 2, "Site/B", "severity", 7);

    let first = run(&store, &apply()).await.unwrap();
    assert_eq!(first.changed, 2);

    let second = run(&store, &apply()).await.unwrap();
    assert_eq!(second.unmapped, 0);
    assert_eq!(second.changed, 0);
    assert_eq!(store.writes().len(), 2);
}

// ── Dry run ────────────────────────────────────────────────────

#[tokio::test]
async fn dry_run_reports_without_writing() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium"), (4, "High")]);
    store.add_identity_table("points", &["severity"]);
    let cell = store.add_simple_row("points", 1, "Site/A", "severity", 3);

    let summary = run(&store, &dry_run()).await.unwrap();

    assert_eq!(summary.unmapped, 1);
    assert_eq!(summary.changed, 0);
    assert!(store.writes().is_empty());
    assert_eq!(store.cell(cell), "3");
}

// ── Explicit policy ────────────────────────────────────────────

#[tokio::test]
async fn explicit_remap_touches_only_recorded_from() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium"), (4, "High")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", 2);
    let unmapped = store.add_simple_row("points", 2, "Site/B", "severity", 3);
    store.add_simple_row("points", 3, "Site/C", "severity", 2);

    let opts = RunOptions {
        remap_from: Some(2),
        remap_to: Some(4),
        apply: true,
        delay: Duration::ZERO,
    };
    let summary = run(&store, &opts).await.unwrap();

    assert_eq!(summary.changed, 2);
    assert_eq!(
        store.writes(),
        vec![
            (1, "severity".to_string(), 4),
            (3, "severity".to_string(), 4),
        ]
    );
    // The unmapped value is not this pass's business.
    assert_eq!(store.cell(unmapped), "3");
    assert_eq!(summary.unmapped, 0);
}

#[tokio::test]
async fn explicit_remap_to_unconfigured_level_is_fatal() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", 2);

    let opts = RunOptions {
        remap_from: Some(2),
        remap_to: Some(9),
        apply: true,
        delay: Duration::ZERO,
    };
    let err = run(&store, &opts).await.unwrap_err();
    assert!(matches!(err, SweepError::InvalidInput(_)));
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn half_a_remap_pair_is_fatal() {
    let store = FakeStore::new(&[(1, "Low")]);
    let opts = RunOptions {
        remap_from: Some(2),
        ..Default::default()
    };
    let err = run(&store, &opts).await.unwrap_err();
    assert!(matches!(err, SweepError::InvalidInput(_)));
}

// ── Aggregate tables ───────────────────────────────────────────

#[tokio::test]
async fn aggregate_rows_key_fields_by_subinstance() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium"), (4, "High")]);
    store.add_aggregate_table("pump_sets", &["severity"]);
    let cell = store.add_cell("7");
    store.add_row("pump_sets", 10, "Pump1", &[("Pump1.severity", cell)]);

    let tables = catalog::severity_tables(&store).await.unwrap();
    let fields = catalog::severity_fields(&store).await.unwrap();
    let (tables, fields) = trim::trim(&store, &tables, &fields).await.unwrap();
    let entries = inventory::build_inventory(&store, &tables, &fields)
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].row, RowId(10));
    // Aggregate rows defer name resolution.
    assert_eq!(entries[0].display_name, None);
    assert_eq!(entries[0].fields.get("Pump1.severity"), Some(&7));

    let summary = run(&store, &apply()).await.unwrap();
    assert_eq!(summary.changed, 1);
    assert_eq!(store.writes(), vec![(10, "Pump1.severity".to_string(), 4)]);
}

// ── Template sharing / staleness ───────────────────────────────

#[tokio::test]
async fn template_sharing_collapses_to_one_write() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium"), (4, "High")]);
    store.add_identity_table("points", &["severity"]);
    // Two instances governed by the same template value.
    let shared = store.add_cell("7");
    store.add_row("points", 1, "Tmpl/A", &[("severity", shared)]);
    store.add_row("points", 2, "Tmpl/B", &[("severity", shared)]);

    let summary = run(&store, &apply()).await.unwrap();

    assert_eq!(summary.unmapped, 2);
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.errors, 0);
    assert_eq!(store.writes(), vec![(1, "severity".to_string(), 4)]);
    assert_eq!(store.cell(shared), "4");
}

// ── Per-entry recoverables ─────────────────────────────────────

#[tokio::test]
async fn unwritable_property_is_skipped_without_error() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", 5);
    store.lock_property(1, "severity");

    let summary = run(&store, &apply()).await.unwrap();

    assert_eq!(summary.unmapped, 1);
    assert_eq!(summary.changed, 0);
    assert_eq!(summary.errors, 0);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn write_failures_are_counted_and_do_not_abort() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium")]);
    store.add_identity_table("points", &["severity"]);
    store.add_simple_row("points", 1, "Site/A", "severity", 5);
    store.add_simple_row("points", 2, "Site/B", "severity", 6);
    store.fail_writes();

    let summary = run(&store, &apply()).await.unwrap();

    assert_eq!(summary.unmapped, 2);
    assert_eq!(summary.changed, 0);
    assert_eq!(summary.errors, 2);
}

#[tokio::test]
async fn non_integer_live_value_is_a_type_anomaly() {
    let store = FakeStore::new(&[(1, "Low"), (2, "Medium"), (4, "High")]);
    store.add_identity_table("points", &["severity"]);
    let cell = store.add_simple_row("points", 1, "Site/A", "severity", 3);

    let tables = catalog::severity_tables(&store).await.unwrap();
    let fields = catalog::severity_fields(&store).await.unwrap();
    let (tables, fields) = trim::trim(&store, &tables, &fields).await.unwrap();
    let mut entries = inventory::build_inventory(&store, &tables, &fields)
        .await
        .unwrap();

    // The value mutates under us between snapshot and write phase.
    store.set_cell(cell, "fault");

    let registry = SeverityRegistry::from_levels([
        (1, "Low".to_string()),
        (2, "Medium".to_string()),
        (4, "High".to_string()),
    ]);
    let report = remap(
        &store,
        &mut entries,
        &registry,
        RemapPolicy::NextLower,
        &RemapOptions {
            apply: true,
            delay: Duration::ZERO,
        },
    )
    .await
    .unwrap();

    assert_eq!(report.type_anomalies, 1);
    assert_eq!(report.changed, 0);
    assert!(store.writes().is_empty());
}

// ── Empty store ────────────────────────────────────────────────

#[tokio::test]
async fn empty_store_completes_with_zero_tally() {
    let store = FakeStore::new(&[]);
    let summary = run(&store, &dry_run()).await.unwrap();

    assert_eq!(summary.tables_scanned, 0);
    assert_eq!(summary.fields_scanned, 0);
    assert_eq!(summary.rows_with_severity, 0);
    assert_eq!(summary.unmapped, 0);
    assert_eq!(summary.changed, 0);
    assert_eq!(summary.errors, 0);
}
