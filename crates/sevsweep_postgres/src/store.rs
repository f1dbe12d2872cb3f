//! Postgres implementation of the core store port.
//!
//! A newtype wrapping PgPool. All SQL is runtime-checked (sqlx::query, not
//! sqlx::query!) to avoid a compile-time DB requirement.

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row, TypeInfo};
use tracing::debug;

use sevsweep_core::error::{Result, SweepError};
use sevsweep_core::ports::{RowId, SeverityStore};
use sevsweep_core::value::SqlValue;

/// Connection settings for the store node.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

/// Connect and authenticate. Both failures are fatal to the run, and they
/// are told apart so the operator gets "check your password" rather than a
/// transport dump.
pub async fn connect(config: &PgConfig) -> Result<PgSeverityStore> {
    let options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .database(&config.dbname)
        .username(&config.user)
        .password(&config.password)
        .application_name("sevsweep");

    let pool = PgPoolOptions::new()
        // The pipeline is one logical task; one connection is enough.
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(connect_error)?;

    debug!(host = %config.host, port = config.port, dbname = %config.dbname, "connected to store");
    Ok(PgSeverityStore::new(pool))
}

fn connect_error(e: sqlx::Error) -> SweepError {
    match &e {
        // Class 28 — invalid authorization specification / invalid password.
        sqlx::Error::Database(db)
            if matches!(db.code().as_deref(), Some(code) if code.starts_with("28")) =>
        {
            SweepError::AccessDenied(db.message().to_string())
        }
        _ => SweepError::Connection(e.to_string()),
    }
}

fn query_error(e: sqlx::Error) -> SweepError {
    match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => SweepError::Connection(e.to_string()),
        _ => SweepError::Internal(anyhow!(e.to_string())),
    }
}

/// Postgres-backed severity store.
pub struct PgSeverityStore {
    pool: PgPool,
}

impl PgSeverityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Decode one cell into the port's value type by column type name. The
/// sweep only ever selects integer and text-ish columns; anything else
/// degrades to Null and is handled upstream as a per-field data error.
fn decode_cell(row: &PgRow, idx: usize) -> SqlValue {
    let type_name = row.columns()[idx].type_info().name();
    match type_name {
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(i64::from(v)))
            .unwrap_or(SqlValue::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| SqlValue::Int(i64::from(v)))
            .unwrap_or(SqlValue::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Int)
            .unwrap_or(SqlValue::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(SqlValue::Text)
            .unwrap_or(SqlValue::Null),
    }
}

#[async_trait]
impl SeverityStore for PgSeverityStore {
    async fn run_query(&self, sql: &str) -> Result<Vec<Vec<SqlValue>>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(rows
            .iter()
            .map(|row| (0..row.columns().len()).map(|i| decode_cell(row, i)).collect())
            .collect())
    }

    async fn read_property(&self, row: RowId, field: &str) -> Result<SqlValue> {
        let value: Option<String> = sqlx::query_scalar("SELECT scada.prop_read($1, $2)")
            .bind(row.0)
            .bind(field)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        Ok(value.map(SqlValue::Text).unwrap_or(SqlValue::Null))
    }

    async fn write_property(&self, row: RowId, field: &str, value: i64) -> Result<()> {
        let accepted: bool = sqlx::query_scalar("SELECT scada.prop_write($1, $2, $3)")
            .bind(row.0)
            .bind(field)
            .bind(value)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)?;
        if accepted {
            Ok(())
        } else {
            Err(SweepError::Internal(anyhow!(
                "write rejected for row {row} field {field}"
            )))
        }
    }

    async fn is_writable(&self, row: RowId, field: &str) -> Result<bool> {
        sqlx::query_scalar("SELECT scada.prop_is_writable($1, $2)")
            .bind(row.0)
            .bind(field)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        // Table names come from the store's own catalog, never user input.
        let sql = format!("SELECT count(*) FROM scada.{table}");
        sqlx::query_scalar(&sql)
            .fetch_one(&self.pool)
            .await
            .map_err(query_error)
    }
}
