//! The staging buffer: an ephemeral table holding newly submitted,
//! hypertable-shaped rows until the router drains it. Rows carry a
//! `staged_id` scan key from a dedicated sequence; the router consumes rows
//! by id so each one leaves staging exactly once.

use chrono::Utc;
use duckdb::{params_from_iter, Connection, OptionalExt};
use tc_types::schema::{ColumnType, TableSchema};
use tc_types::value::Value;

use crate::errors::InsertError;

/// Handle to one staging buffer.
#[derive(Clone, Debug)]
pub struct StagingTable {
    pub table: String,
}

/// Who is deleting staged rows. User-issued deletes feed the deletion log —
/// the side effect downstream consumers watch. The router's internal move is
/// not a user delete and must not be observable as one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOrigin {
    UserDelete,
    RouterMove,
}

/// One row of the routing scan: scan key plus the extracted time and key
/// cells, re-read from storage on every drain iteration.
#[derive(Clone, Debug)]
pub struct StagedRow {
    pub staged_id: i64,
    pub time_ns: Option<i64>,
    pub key: Value,
}

pub fn create_staging(
    conn: &Connection,
    schema: &TableSchema,
    table: &str,
) -> Result<StagingTable, InsertError> {
    conn.execute_batch(&format!(
        r#"
        CREATE SEQUENCE IF NOT EXISTS {table}_seq;
        CREATE TABLE IF NOT EXISTS "{table}" (
            staged_id BIGINT PRIMARY KEY DEFAULT nextval('{table}_seq'),
            {body}
        );
        CREATE TABLE IF NOT EXISTS "{table}_deletions" (
            staged_id  BIGINT NOT NULL,
            deleted_at BIGINT NOT NULL
        );
        "#,
        table = table,
        body = schema.ddl_body()
    ))?;
    Ok(StagingTable {
        table: table.to_string(),
    })
}

pub(crate) fn to_duck(v: &Value) -> duckdb::types::Value {
    match v {
        Value::Null => duckdb::types::Value::Null,
        Value::Bigint(v) => duckdb::types::Value::BigInt(*v),
        Value::Double(v) => duckdb::types::Value::Double(*v),
        Value::Text(s) => duckdb::types::Value::Text(s.clone()),
        Value::Timestamp(ns) => duckdb::types::Value::BigInt(*ns),
        Value::Boolean(b) => duckdb::types::Value::Boolean(*b),
    }
}

/// Append dynamically typed rows shaped like `schema`. Cells line up with
/// the schema's column order.
pub fn stage_rows(
    conn: &Connection,
    staging: &StagingTable,
    schema: &TableSchema,
    rows: &[Vec<Value>],
) -> Result<usize, InsertError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let placeholders = vec!["?"; schema.columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO \"{}\" ({}) VALUES ({})",
        staging.table,
        schema.column_list_sql(),
        placeholders
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut appended = 0;
    for row in rows {
        stmt.execute(params_from_iter(row.iter().map(to_duck)))?;
        appended += 1;
    }
    Ok(appended)
}

/// Scan key and time of the first remaining staged row, in scan order.
pub fn head_time(
    conn: &Connection,
    staging: &StagingTable,
    time_column: &str,
) -> Result<Option<(i64, Option<i64>)>, InsertError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT staged_id, \"{time_column}\" FROM \"{table}\" ORDER BY staged_id LIMIT 1",
        time_column = time_column,
        table = staging.table
    ))?;
    let row = stmt
        .query_row([], |r| Ok((r.get::<_, i64>(0)?, r.get::<_, Option<i64>>(1)?)))
        .optional()?;
    Ok(row)
}

pub(crate) fn value_at(row: &duckdb::Row, idx: usize, ty: ColumnType) -> duckdb::Result<Value> {
    Ok(match ty {
        ColumnType::Bigint => row
            .get::<_, Option<i64>>(idx)?
            .map_or(Value::Null, Value::Bigint),
        ColumnType::Timestamp => row
            .get::<_, Option<i64>>(idx)?
            .map_or(Value::Null, Value::Timestamp),
        ColumnType::Double => row
            .get::<_, Option<f64>>(idx)?
            .map_or(Value::Null, Value::Double),
        ColumnType::Text => row
            .get::<_, Option<String>>(idx)?
            .map_or(Value::Null, Value::Text),
        ColumnType::Boolean => row
            .get::<_, Option<bool>>(idx)?
            .map_or(Value::Null, Value::Boolean),
    })
}

/// Full routing scan in `staged_id` order. The key column comes from the
/// resolved epoch, so this runs after epoch resolution, never before.
pub fn scan_keys(
    conn: &Connection,
    staging: &StagingTable,
    time_column: &str,
    key_column: &str,
    key_type: ColumnType,
) -> Result<Vec<StagedRow>, InsertError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT staged_id, \"{time}\", \"{key}\" FROM \"{table}\" ORDER BY staged_id",
        time = time_column,
        key = key_column,
        table = staging.table
    ))?;
    let rows = stmt.query_map([], |r| {
        Ok(StagedRow {
            staged_id: r.get(0)?,
            time_ns: r.get(1)?,
            key: value_at(r, 2, key_type)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Ids of staged rows with no time value, in scan order.
pub fn null_time_ids(
    conn: &Connection,
    staging: &StagingTable,
    time_column: &str,
) -> Result<Vec<i64>, InsertError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT staged_id FROM \"{table}\" WHERE \"{time}\" IS NULL ORDER BY staged_id",
        table = staging.table,
        time = time_column
    ))?;
    let rows = stmt.query_map([], |r| r.get::<_, i64>(0))?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(crate) fn id_list(ids: &[i64]) -> String {
    ids.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Remove staged rows by id. `UserDelete` records tombstones in the deletion
/// log first; `RouterMove` suppresses that, distinguishing router-internal
/// consumption from a user-issued delete.
pub fn delete_staged(
    conn: &Connection,
    staging: &StagingTable,
    ids: &[i64],
    origin: DeleteOrigin,
) -> Result<usize, InsertError> {
    if ids.is_empty() {
        return Ok(0);
    }
    let list = id_list(ids);
    if origin == DeleteOrigin::UserDelete {
        let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
        conn.execute(
            &format!(
                "INSERT INTO \"{table}_deletions\"
                 SELECT staged_id, {now} FROM \"{table}\" WHERE staged_id IN ({list})",
                table = staging.table,
                now = now,
                list = list
            ),
            [],
        )?;
    }
    let removed = conn.execute(
        &format!(
            "DELETE FROM \"{table}\" WHERE staged_id IN ({list})",
            table = staging.table,
            list = list
        ),
        [],
    )?;
    Ok(removed)
}

pub fn staged_count(conn: &Connection, staging: &StagingTable) -> Result<i64, InsertError> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{}\"", staging.table),
        [],
        |r| r.get(0),
    )?)
}

pub fn deletion_log_count(conn: &Connection, staging: &StagingTable) -> Result<i64, InsertError> {
    Ok(conn.query_row(
        &format!("SELECT COUNT(*) FROM \"{}_deletions\"", staging.table),
        [],
        |r| r.get(0),
    )?)
}
