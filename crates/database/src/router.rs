//! The write-path router: the sole public insert entry point, the
//! transaction-scoped reentrancy guard, and the per-replica fan-out that
//! moves staged rows into every physical target of their resolved chunk.

use duckdb::Connection;
use tc_types::schema::TableSchema;
use tracing::debug;

use crate::catalog;
use crate::chunk::{self, ChunkLocks};
use crate::distinct;
use crate::epoch;
use crate::errors::InsertError;
use crate::models::{Chunk, Hypertable, Partition, PartitionEpoch};
use crate::partition;
use crate::staging::{self, DeleteOrigin, StagedRow, StagingTable};

/// Per-unit-of-work state for the write path. Create one per client
/// transaction and drop it with the transaction. The in-progress marker is
/// what forbids nested inserts inside one transaction: mixing inserts to two
/// hypertables in one transaction is a deliberate limitation until a
/// finer-grained locking scheme exists.
#[derive(Debug, Default)]
pub struct InsertContext {
    insert_in_progress: bool,
}

impl InsertContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_in_progress(&self) -> bool {
        self.insert_in_progress
    }
}

/// Route every staged row of `hypertable_name` to its (epoch, partition,
/// chunk) and move it into all replica targets of that chunk, creating and
/// closing chunks as needed and keeping distinct side indexes current.
/// On success staging is fully drained. Runs entirely inside the caller's
/// transaction; any failure aborts the whole unit of work with no partial
/// fan-out surviving rollback.
pub fn insert(
    conn: &Connection,
    ctx: &mut InsertContext,
    locks: &ChunkLocks,
    hypertable_name: &str,
    staging: &StagingTable,
) -> Result<(), InsertError> {
    if ctx.insert_in_progress {
        return Err(InsertError::ReentrantInsert);
    }
    ctx.insert_in_progress = true;

    let ht = catalog::hypertable_by_name(conn, hypertable_name)?;
    let table_schema = catalog::table_schema(conn, &ht)?;

    // Drain staging one resolved chunk at a time: take the first remaining
    // row in scan order, resolve its triple, move the whole matching subset,
    // then look at staging again. Scan order, not time order.
    loop {
        let Some((_, head_time)) = staging::head_time(conn, staging, &ht.time_column)? else {
            break;
        };
        let Some(time_ns) = head_time else {
            // Rows without a time value bypass epoch/partition/chunk
            // resolution entirely and land in the main table.
            move_unrouted(conn, &ht, &table_schema, staging)?;
            continue;
        };

        // Epoch identity decides which column is the key, so the epoch must
        // resolve before the key scan.
        let epoch = epoch::epoch_for_time(conn, ht.hypertable_id, time_ns)?;
        let key_type = table_schema
            .column_type_of(&epoch.partitioning_column)
            .ok_or_else(|| {
                InsertError::Catalog(duckdb::Error::InvalidColumnName(
                    epoch.partitioning_column.clone(),
                ))
            })?;
        let rows = staging::scan_keys(
            conn,
            staging,
            &ht.time_column,
            &epoch.partitioning_column,
            key_type,
        )?;
        let Some(head) = rows.first() else {
            break;
        };

        let resolved = partition::partition_for_key(conn, &epoch, &head.key)?;

        // Two-phase retrieval: the cheap unlocked probe enables the close
        // check without holding the creation lock, then the locked fetch is
        // authoritative for the write. A chunk may close in between; the
        // locked fetch re-resolves coverage, so the window is benign.
        let probe = chunk::get_or_create(conn, locks, resolved.partition_id, time_ns, false)?;
        chunk::close_if_needed(conn, locks, &probe, time_ns)?;
        let target = chunk::get_or_create(conn, locks, resolved.partition_id, time_ns, true)?;

        fan_out(conn, &ht, &table_schema, &epoch, &resolved, &target, staging, &rows)?;
    }
    Ok(())
}

/// Move every staged row matching the chunk's routing predicate into each of
/// the chunk's replica targets, updating each replica's distinct index
/// first, then consume the moved rows from staging exactly once.
#[allow(clippy::too_many_arguments)]
fn fan_out(
    conn: &Connection,
    ht: &Hypertable,
    table_schema: &TableSchema,
    epoch: &PartitionEpoch,
    resolved: &Partition,
    target: &Chunk,
    staging: &StagingTable,
    rows: &[StagedRow],
) -> Result<(), InsertError> {
    let nodes = catalog::replica_nodes_for(conn, target.chunk_id)?;
    if nodes.is_empty() {
        return Err(InsertError::NoReplicaTargets {
            chunk_id: target.chunk_id,
        });
    }

    let columns = table_schema.column_list_sql();
    let mut moved: Vec<i64> = Vec::new();

    for node in &nodes {
        // Routing metadata may have moved between staging and fan-out;
        // recompute the predicate per replica from fresh catalog rows rather
        // than trusting an earlier match set.
        let part = catalog::partition_by_id(conn, resolved.partition_id)?;
        let chk = catalog::chunk_by_id(conn, target.chunk_id)?;
        let matched = matching_ids(epoch, &part, &chk, ht.chunk_time_interval, rows);
        if matched.is_empty() {
            continue;
        }

        for column in table_schema.distinct_columns() {
            distinct::upsert_batch_values(
                conn,
                &node.schema_name,
                &ht.name,
                &column.name,
                staging,
                &matched,
            )?;
        }

        conn.execute(
            &format!(
                "INSERT INTO \"{schema}\".\"{table}\" ({columns})
                 SELECT {columns} FROM \"{staging}\" WHERE staged_id IN ({list})",
                schema = node.schema_name,
                table = node.table_name,
                columns = columns,
                staging = staging.table,
                list = staging::id_list(&matched)
            ),
            [],
        )?;

        for id in matched {
            if !moved.contains(&id) {
                moved.push(id);
            }
        }
    }

    if moved.is_empty() {
        // Not even the head row matched a freshly recomputed predicate; the
        // drain loop cannot make progress. Same fatal class as a missing
        // partition.
        return Err(InsertError::NoReplicaTargets {
            chunk_id: target.chunk_id,
        });
    }
    moved.sort_unstable();
    staging::delete_staged(conn, staging, &moved, DeleteOrigin::RouterMove)?;
    debug!(
        chunk_id = target.chunk_id,
        replicas = nodes.len(),
        rows = moved.len(),
        "fan-out complete"
    );
    Ok(())
}

/// Rows matching the chunk's routing window, the epoch's time window, and
/// the partition's keyspace range. An open chunk only accepts rows within
/// one configured interval of its start; the row past that boundary is the
/// one that closes it. The epoch bound matters when an epoch boundary falls
/// inside a chunk's interval: rows past it belong to the next epoch's
/// partitions and must wait for their own drain iteration.
fn matching_ids(
    epoch: &PartitionEpoch,
    part: &Partition,
    chk: &Chunk,
    interval_ns: i64,
    rows: &[StagedRow],
) -> Vec<i64> {
    let window_end = chk.routing_window_end(interval_ns);
    rows.iter()
        .filter(|row| match row.time_ns {
            Some(t) => {
                t >= chk.start_time
                    && t < window_end
                    && epoch.covers(t)
                    && part.contains(
                        epoch
                            .partitioning_func
                            .reduce(&row.key, epoch.partitioning_mod),
                    )
            }
            None => false,
        })
        .map(|row| row.staged_id)
        .collect()
}

/// Persist rows with no time value straight into the hypertable's main
/// table. Router-internal consumption, so the staging deletion log stays
/// untouched.
fn move_unrouted(
    conn: &Connection,
    ht: &Hypertable,
    table_schema: &TableSchema,
    staging: &StagingTable,
) -> Result<(), InsertError> {
    let ids = staging::null_time_ids(conn, staging, &ht.time_column)?;
    if ids.is_empty() {
        return Ok(());
    }
    let columns = table_schema.column_list_sql();
    conn.execute(
        &format!(
            "INSERT INTO \"{main}\" ({columns})
             SELECT {columns} FROM \"{staging}\" WHERE staged_id IN ({list})",
            main = ht.name,
            columns = columns,
            staging = staging.table,
            list = staging::id_list(&ids)
        ),
        [],
    )?;
    staging::delete_staged(conn, staging, &ids, DeleteOrigin::RouterMove)?;
    debug!(
        hypertable = %ht.name,
        rows = ids.len(),
        "rows without time persisted to main table"
    );
    Ok(())
}
