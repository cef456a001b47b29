//! Chunk lifecycle: lazy creation of time-bounded segments under a keyed
//! per-partition lock, and the close-and-roll policy that retires a chunk
//! once its time span is exhausted.

use std::sync::Arc;

use dashmap::DashMap;
use duckdb::{params, Connection, OptionalExt};
use parking_lot::Mutex;
use tracing::debug;

use crate::catalog;
use crate::errors::InsertError;
use crate::models::Chunk;

/// Keyed lock arena: one creation lock per partition id, shared by every
/// router invocation in the process. A lock is held only across the
/// chunk-creation step, never across a full insert, so a transaction that
/// later touches a different partition cannot invert lock order.
#[derive(Default)]
pub struct ChunkLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl ChunkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn for_partition(&self, partition_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(partition_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Floor `time_ns` to the chunk grid for the given interval.
pub fn align_to_interval(time_ns: i64, interval_ns: i64) -> i64 {
    time_ns - time_ns.rem_euclid(interval_ns)
}

fn covering_chunk(
    conn: &Connection,
    partition_id: i64,
    time_ns: i64,
) -> Result<Option<Chunk>, duckdb::Error> {
    let mut stmt = conn.prepare(
        "SELECT chunk_id, partition_id, start_time, end_time, closed
           FROM chunk
          WHERE partition_id = ? AND start_time <= ? AND (end_time IS NULL OR ? < end_time)",
    )?;
    stmt.query_row(params![partition_id, time_ns, time_ns], |r| {
        Ok(Chunk {
            chunk_id: r.get(0)?,
            partition_id: r.get(1)?,
            start_time: r.get(2)?,
            end_time: r.get(3)?,
            closed: r.get(4)?,
        })
    })
    .optional()
}

/// Resolve the chunk covering `time_ns` in `partition_id`, creating it if
/// absent. `locked = false` is the cheap existence probe used before the
/// close check; `locked = true` runs the authoritative fetch under the
/// partition's creation lock and is what the actual write must use. Both
/// paths re-check existence after acquiring the lock: another writer may
/// have created the chunk first.
pub fn get_or_create(
    conn: &Connection,
    locks: &ChunkLocks,
    partition_id: i64,
    time_ns: i64,
    locked: bool,
) -> Result<Chunk, InsertError> {
    if !locked {
        if let Some(chunk) = covering_chunk(conn, partition_id, time_ns)? {
            return Ok(chunk);
        }
    }

    let lock = locks.for_partition(partition_id);
    let _guard = lock.lock();
    if let Some(chunk) = covering_chunk(conn, partition_id, time_ns)? {
        return Ok(chunk);
    }
    create_chunk(conn, partition_id, time_ns)
}

/// Close `chunk` when its time span is exhausted as of `as_of_ns`, then open
/// the successor chunk for the partition. Idempotent: the guarded UPDATE
/// keeps OPEN -> CLOSED terminal under redundant and concurrent calls.
/// Returns the chunk that should take writes at `as_of_ns` (the successor
/// after a close, otherwise the input chunk unchanged).
pub fn close_if_needed(
    conn: &Connection,
    locks: &ChunkLocks,
    chunk: &Chunk,
    as_of_ns: i64,
) -> Result<Chunk, InsertError> {
    let ht = catalog::hypertable_for_partition(conn, chunk.partition_id)?;
    let boundary = chunk.start_time + ht.chunk_time_interval;

    match chunk.end_time {
        None if as_of_ns >= boundary => {
            conn.execute(
                "UPDATE chunk SET end_time = ?, closed = TRUE
                  WHERE chunk_id = ? AND closed = FALSE",
                params![boundary, chunk.chunk_id],
            )?;
            debug!(chunk_id = chunk.chunk_id, end_time = boundary, "chunk closed");
            get_or_create(conn, locks, chunk.partition_id, as_of_ns, true)
        }
        Some(end) if as_of_ns >= end => {
            // Bounded at birth and its window has passed; finish the state
            // transition and hand back the chunk that covers `as_of_ns`.
            conn.execute(
                "UPDATE chunk SET closed = TRUE WHERE chunk_id = ? AND closed = FALSE",
                params![chunk.chunk_id],
            )?;
            get_or_create(conn, locks, chunk.partition_id, as_of_ns, true)
        }
        _ => Ok(chunk.clone()),
    }
}

// Runs with the partition's creation lock held.
fn create_chunk(conn: &Connection, partition_id: i64, time_ns: i64) -> Result<Chunk, InsertError> {
    let ht = catalog::hypertable_for_partition(conn, partition_id)?;
    let table_schema = catalog::table_schema(conn, &ht)?;
    let start = align_to_interval(time_ns, ht.chunk_time_interval);

    // Clamp against the next chunk so ranges on one partition never overlap
    // and a backfilled chunk never spans more than one interval.
    let next_start: Option<i64> = conn.query_row(
        "SELECT MIN(start_time) FROM chunk WHERE partition_id = ? AND start_time > ?",
        params![partition_id, time_ns],
        |r| r.get(0),
    )?;
    let end_time = next_start.map(|next| next.min(start + ht.chunk_time_interval));

    let chunk_id: i64 = conn.query_row("SELECT nextval('tc_chunk_seq')", [], |r| r.get(0))?;
    conn.execute(
        "INSERT INTO chunk (chunk_id, partition_id, start_time, end_time, closed)
         VALUES (?, ?, ?, ?, FALSE)",
        params![chunk_id, partition_id, start, end_time],
    )?;

    // One replica node per partition replica, created together with the
    // chunk row: the physical table plus its catalog entry.
    let replicas = catalog::partition_replicas_for(conn, partition_id)?;
    for replica in &replicas {
        let table_name = format!("{}_{}", ht.name, chunk_id);
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{schema}\".\"{table}\" ({body});",
            schema = replica.schema_name,
            table = table_name,
            body = table_schema.ddl_body()
        ))?;
        conn.execute(
            "INSERT INTO chunk_replica_node (chunk_id, partition_replica_id, schema_name, table_name)
             VALUES (?, ?, ?, ?)",
            params![
                chunk_id,
                replica.partition_replica_id,
                replica.schema_name,
                table_name
            ],
        )?;
    }

    debug!(chunk_id, partition_id, start, "chunk created");
    Ok(Chunk {
        chunk_id,
        partition_id,
        start_time: start,
        end_time,
        closed: false,
    })
}
