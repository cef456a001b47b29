//! Catalog bootstrap: connection helpers and the idempotent DDL for the
//! routing catalog. All timestamps in the catalog are BIGINT nanoseconds
//! since the Unix epoch, UTC.

use anyhow::Result;
use duckdb::Connection;
use std::path::Path;

/// Create or reuse a DuckDB connection (file-backed or in-memory) with the
/// routing catalog installed.
pub fn open_catalog(db_file: Option<&Path>) -> Result<Connection> {
    let conn = match db_file {
        Some(p) => Connection::open(p)?,
        None => Connection::open_in_memory()?,
    };
    create_catalog_schema(&conn)?;
    Ok(conn)
}

/// Best-effort: load environment variables from .env, then open the catalog
/// at `TC_DB`. Falls back to an in-memory catalog when unset.
pub fn open_catalog_from_env() -> Result<Connection> {
    let _ = dotenvy::from_filename(".env").or_else(|_| dotenvy::from_filename(".env.example"));
    match std::env::var("TC_DB") {
        Ok(path) if !path.is_empty() => open_catalog(Some(Path::new(&path))),
        _ => open_catalog(None),
    }
}

/// Install the catalog tables and id sequences if needed. Safe to call from
/// every entrypoint; all DDL is IF NOT EXISTS to avoid schema drift between
/// callers.
pub fn create_catalog_schema(conn: &Connection) -> duckdb::Result<()> {
    conn.execute_batch(
        r#"
        CREATE SEQUENCE IF NOT EXISTS tc_hypertable_seq;
        CREATE SEQUENCE IF NOT EXISTS tc_epoch_seq;
        CREATE SEQUENCE IF NOT EXISTS tc_partition_seq;
        CREATE SEQUENCE IF NOT EXISTS tc_partition_replica_seq;
        CREATE SEQUENCE IF NOT EXISTS tc_chunk_seq;

        CREATE TABLE IF NOT EXISTS hypertable (
            hypertable_id       BIGINT  PRIMARY KEY,
            name                VARCHAR NOT NULL UNIQUE,
            time_column         VARCHAR NOT NULL,
            time_type           VARCHAR NOT NULL,
            -- chunk length threshold, nanoseconds
            chunk_time_interval BIGINT  NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hypertable_column (
            hypertable_id BIGINT  NOT NULL,
            ordinal       INTEGER NOT NULL,
            name          VARCHAR NOT NULL,
            column_type   VARCHAR NOT NULL,
            is_distinct   BOOLEAN NOT NULL,
            PRIMARY KEY (hypertable_id, ordinal)
        );

        CREATE TABLE IF NOT EXISTS partition_epoch (
            epoch_id            BIGINT  PRIMARY KEY,
            hypertable_id       BIGINT  NOT NULL,
            partitioning_func   VARCHAR NOT NULL,
            partitioning_column VARCHAR NOT NULL,
            partitioning_mod    BIGINT  NOT NULL,
            -- time window bounds; NULL = unbounded
            start_time          BIGINT,
            end_time            BIGINT
        );

        CREATE TABLE IF NOT EXISTS "partition" (
            partition_id   BIGINT PRIMARY KEY,
            epoch_id       BIGINT NOT NULL,
            -- inclusive hashed-keyspace range
            keyspace_start BIGINT NOT NULL,
            keyspace_end   BIGINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS partition_replica (
            partition_replica_id BIGINT   PRIMARY KEY,
            partition_id         BIGINT   NOT NULL,
            replica_id           SMALLINT NOT NULL,
            -- replica endpoint, supplied by provisioning
            schema_name          VARCHAR  NOT NULL
        );

        CREATE TABLE IF NOT EXISTS chunk (
            chunk_id     BIGINT  PRIMARY KEY,
            partition_id BIGINT  NOT NULL,
            start_time   BIGINT  NOT NULL,
            -- NULL = open
            end_time     BIGINT,
            closed       BOOLEAN NOT NULL DEFAULT FALSE
        );

        CREATE TABLE IF NOT EXISTS chunk_replica_node (
            chunk_id             BIGINT  NOT NULL,
            partition_replica_id BIGINT  NOT NULL,
            schema_name          VARCHAR NOT NULL,
            table_name           VARCHAR NOT NULL,
            PRIMARY KEY (chunk_id, partition_replica_id)
        );

        CREATE INDEX IF NOT EXISTS idx_epoch_window
            ON partition_epoch(hypertable_id, start_time, end_time);

        CREATE INDEX IF NOT EXISTS idx_partition_range
            ON "partition"(epoch_id, keyspace_start, keyspace_end);

        CREATE INDEX IF NOT EXISTS idx_chunk_window
            ON chunk(partition_id, start_time, end_time);
        "#,
    )
}
