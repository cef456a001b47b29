//! Convenience helpers around the routing catalog: registering hypertables,
//! attaching replica endpoints, and typed lookups used by the write path.
//! All `ensure_*` helpers are insert-if-missing followed by a select-back of
//! the id, so repeated registration is harmless.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection, OptionalExt};
use tc_types::schema::{ColumnDef, ColumnType, TableSchema};
use tracing::info;

use crate::errors::InsertError;
use crate::models::{Chunk, ChunkReplicaNode, Hypertable, Partition, PartitionReplica};

#[inline]
pub fn dt_to_ns(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_nanos_opt().expect("ns fits i64")
}

// Convert ns -> DateTime only when needed; the catalog keeps BIGINT ns.
#[inline]
pub fn ns_to_dt(ns: i64) -> Option<DateTime<Utc>> {
    let secs = ns.div_euclid(1_000_000_000);
    let nanos = (ns.rem_euclid(1_000_000_000)) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos)
}

/// Register a hypertable: catalog row, ordered column registry, and the main
/// table that takes rows with no time value. Returns the hypertable id
/// whether or not it already existed.
pub fn ensure_hypertable(
    conn: &Connection,
    schema: &TableSchema,
    chunk_time_interval: i64,
) -> Result<i64> {
    let time_type = schema.time_type().ok_or_else(|| {
        anyhow!(
            "time column '{}' is not part of the '{}' schema",
            schema.time_column,
            schema.name
        )
    })?;

    conn.execute(
        "INSERT INTO hypertable (hypertable_id, name, time_column, time_type, chunk_time_interval)
         SELECT nextval('tc_hypertable_seq'), ?, ?, ?, ?
          WHERE NOT EXISTS (SELECT 1 FROM hypertable WHERE name = ?)",
        params![
            schema.name,
            schema.time_column,
            time_type.to_string(),
            chunk_time_interval,
            schema.name
        ],
    )?;
    let id: i64 = conn.query_row(
        "SELECT hypertable_id FROM hypertable WHERE name = ?",
        params![schema.name],
        |r| r.get(0),
    )?;

    // Columns and the main table only materialize on first registration.
    let have_columns: i64 = conn.query_row(
        "SELECT COUNT(*) FROM hypertable_column WHERE hypertable_id = ?",
        params![id],
        |r| r.get(0),
    )?;
    if have_columns == 0 {
        for (ordinal, col) in schema.columns.iter().enumerate() {
            conn.execute(
                "INSERT INTO hypertable_column (hypertable_id, ordinal, name, column_type, is_distinct)
                 VALUES (?, ?, ?, ?, ?)",
                params![
                    id,
                    ordinal as i64,
                    col.name,
                    col.column_type.to_string(),
                    col.distinct
                ],
            )?;
        }
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({});",
            schema.name,
            schema.ddl_body()
        ))?;
        info!(hypertable = %schema.name, id, "hypertable registered");
    }
    Ok(id)
}

/// Stand-in for the provisioning collaborator: make a replica endpoint
/// (a schema) usable for a hypertable, including its distinct side table.
pub fn attach_replica_schema(
    conn: &Connection,
    hypertable_name: &str,
    schema_name: &str,
) -> Result<()> {
    conn.execute_batch(&format!(
        r#"
        CREATE SCHEMA IF NOT EXISTS "{schema}";
        CREATE TABLE IF NOT EXISTS "{schema}"."{ht}_distinct" (
            column_name VARCHAR NOT NULL,
            value       VARCHAR NOT NULL,
            PRIMARY KEY (column_name, value)
        );
        "#,
        schema = schema_name,
        ht = hypertable_name
    ))?;
    Ok(())
}

fn corrupt_column(idx: usize, raw: &str) -> duckdb::Error {
    duckdb::Error::FromSqlConversionFailure(
        idx,
        duckdb::types::Type::Text,
        Box::new(std::io::Error::other(format!(
            "unrecognized column type '{raw}'"
        ))),
    )
}

fn read_hypertable(r: &duckdb::Row) -> duckdb::Result<Hypertable> {
    let raw: String = r.get(3)?;
    let time_type = ColumnType::from_catalog(&raw).ok_or_else(|| corrupt_column(3, &raw))?;
    Ok(Hypertable {
        hypertable_id: r.get(0)?,
        name: r.get(1)?,
        time_column: r.get(2)?,
        time_type,
        chunk_time_interval: r.get(4)?,
    })
}

pub fn hypertable_by_name(conn: &Connection, name: &str) -> Result<Hypertable, InsertError> {
    let mut stmt = conn.prepare(
        "SELECT hypertable_id, name, time_column, time_type, chunk_time_interval
           FROM hypertable WHERE name = ?",
    )?;
    let row = stmt.query_row(params![name], read_hypertable).optional()?;
    row.ok_or_else(|| InsertError::UnknownHypertable(name.to_string()))
}

/// Hypertable owning a partition, via its epoch. Used by chunk creation,
/// which starts from nothing but a partition id.
pub fn hypertable_for_partition(
    conn: &Connection,
    partition_id: i64,
) -> Result<Hypertable, InsertError> {
    let mut stmt = conn.prepare(
        r#"
        SELECT h.hypertable_id, h.name, h.time_column, h.time_type, h.chunk_time_interval
          FROM hypertable h
          JOIN partition_epoch e ON e.hypertable_id = h.hypertable_id
          JOIN "partition" p ON p.epoch_id = e.epoch_id
         WHERE p.partition_id = ?
        "#,
    )?;
    Ok(stmt.query_row(params![partition_id], read_hypertable)?)
}

/// Rebuild the runtime schema descriptor from the column registry.
pub fn table_schema(conn: &Connection, ht: &Hypertable) -> Result<TableSchema, InsertError> {
    let mut stmt = conn.prepare(
        "SELECT name, column_type, is_distinct
           FROM hypertable_column
          WHERE hypertable_id = ?
          ORDER BY ordinal",
    )?;
    let rows = stmt.query_map(params![ht.hypertable_id], |r| {
        let raw: String = r.get(1)?;
        let column_type = ColumnType::from_catalog(&raw).ok_or_else(|| corrupt_column(1, &raw))?;
        Ok(ColumnDef {
            name: r.get(0)?,
            column_type,
            distinct: r.get(2)?,
        })
    })?;
    let mut columns = Vec::new();
    for col in rows {
        columns.push(col?);
    }
    Ok(TableSchema {
        name: ht.name.clone(),
        time_column: ht.time_column.clone(),
        columns,
    })
}

pub fn partition_by_id(conn: &Connection, partition_id: i64) -> Result<Partition, InsertError> {
    let mut stmt = conn.prepare(
        "SELECT partition_id, epoch_id, keyspace_start, keyspace_end
           FROM \"partition\" WHERE partition_id = ?",
    )?;
    Ok(stmt.query_row(params![partition_id], |r| {
        Ok(Partition {
            partition_id: r.get(0)?,
            epoch_id: r.get(1)?,
            keyspace_start: r.get(2)?,
            keyspace_end: r.get(3)?,
        })
    })?)
}

pub fn chunk_by_id(conn: &Connection, chunk_id: i64) -> Result<Chunk, InsertError> {
    let mut stmt = conn.prepare(
        "SELECT chunk_id, partition_id, start_time, end_time, closed
           FROM chunk WHERE chunk_id = ?",
    )?;
    Ok(stmt.query_row(params![chunk_id], |r| {
        Ok(Chunk {
            chunk_id: r.get(0)?,
            partition_id: r.get(1)?,
            start_time: r.get(2)?,
            end_time: r.get(3)?,
            closed: r.get(4)?,
        })
    })?)
}

pub fn partition_replicas_for(
    conn: &Connection,
    partition_id: i64,
) -> Result<Vec<PartitionReplica>, InsertError> {
    let mut stmt = conn.prepare(
        "SELECT partition_replica_id, partition_id, replica_id, schema_name
           FROM partition_replica
          WHERE partition_id = ?
          ORDER BY replica_id",
    )?;
    let rows = stmt.query_map(params![partition_id], |r| {
        Ok(PartitionReplica {
            partition_replica_id: r.get(0)?,
            partition_id: r.get(1)?,
            replica_id: r.get(2)?,
            schema_name: r.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub fn replica_nodes_for(
    conn: &Connection,
    chunk_id: i64,
) -> Result<Vec<ChunkReplicaNode>, InsertError> {
    let mut stmt = conn.prepare(
        "SELECT chunk_id, partition_replica_id, schema_name, table_name
           FROM chunk_replica_node
          WHERE chunk_id = ?
          ORDER BY partition_replica_id",
    )?;
    let rows = stmt.query_map(params![chunk_id], |r| {
        Ok(ChunkReplicaNode {
            chunk_id: r.get(0)?,
            partition_replica_id: r.get(1)?,
            schema_name: r.get(2)?,
            table_name: r.get(3)?,
        })
    })?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
