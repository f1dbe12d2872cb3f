//! PostgreSQL adapter for the sevsweep store port.
//!
//! The supervisory store lives under the `scada` schema: metadata in
//! `scada.severity_level` / `scada.field_catalog`, one relation per object
//! table, and the property RPC surfaced as `scada.prop_read` /
//! `scada.prop_write` / `scada.prop_is_writable` functions.

mod store;

pub use store::{connect, PgConfig, PgSeverityStore};
