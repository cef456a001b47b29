//! Epoch resolution and repartitioning: the point lookup from a row's time
//! to the partitioning scheme active at that instant, and the helper the
//! external repartitioning action uses to install a new scheme.

use std::str::FromStr;

use duckdb::{params, Connection, OptionalExt};
use tracing::{error, info};

use crate::errors::InsertError;
use crate::models::PartitionEpoch;
use crate::partition::PartitionFunction;

/// The unique epoch whose [start_time, end_time) window contains `time_ns`
/// (missing bound = unbounded). Pure function of (hypertable, time); epoch
/// windows for one hypertable never overlap, so the point lookup is total or
/// empty. Empty means catalog corruption and is fatal.
pub fn epoch_for_time(
    conn: &Connection,
    hypertable_id: i64,
    time_ns: i64,
) -> Result<PartitionEpoch, InsertError> {
    let mut stmt = conn.prepare(
        "SELECT epoch_id, hypertable_id, partitioning_func, partitioning_column,
                partitioning_mod, start_time, end_time
           FROM partition_epoch
          WHERE hypertable_id = ?
            AND (start_time IS NULL OR start_time <= ?)
            AND (end_time IS NULL OR ? < end_time)",
    )?;
    let raw = stmt
        .query_row(params![hypertable_id, time_ns, time_ns], |r| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, i64>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
                r.get::<_, i64>(4)?,
                r.get::<_, Option<i64>>(5)?,
                r.get::<_, Option<i64>>(6)?,
            ))
        })
        .optional()?;

    let Some((epoch_id, hypertable_id, func, column, modulus, start_time, end_time)) = raw else {
        error!(hypertable_id, time_ns, "no epoch covers row time");
        return Err(InsertError::EpochNotFound {
            hypertable_id,
            time_ns,
        });
    };
    Ok(PartitionEpoch {
        epoch_id,
        hypertable_id,
        partitioning_func: PartitionFunction::from_str(&func)?,
        partitioning_column: column,
        partitioning_mod: modulus,
        start_time,
        end_time,
    })
}

/// Shape of a new epoch, minus the identity the catalog assigns.
#[derive(Clone, Debug)]
pub struct EpochSpec {
    pub partitioning_func: PartitionFunction,
    pub partitioning_column: String,
    pub partitioning_mod: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

/// Install a new partitioning epoch: close the currently open epoch at the
/// new start, insert the epoch row, its partitions, and one replica row per
/// (replica_id, endpoint) for every partition. `ranges` must tile the
/// keyspace; use [`crate::partition::split_keyspace`] for even tiling.
pub fn create_epoch(
    conn: &Connection,
    hypertable_id: i64,
    spec: &EpochSpec,
    ranges: &[(i64, i64)],
    replicas: &[(i16, &str)],
) -> Result<i64, InsertError> {
    if let Some(new_start) = spec.start_time {
        // The previously open epoch ends where the new one begins; windows
        // stay non-overlapping and totally ordered.
        conn.execute(
            "UPDATE partition_epoch SET end_time = ?
              WHERE hypertable_id = ? AND end_time IS NULL",
            params![new_start, hypertable_id],
        )?;
    }

    let epoch_id: i64 = conn.query_row("SELECT nextval('tc_epoch_seq')", [], |r| r.get(0))?;
    conn.execute(
        "INSERT INTO partition_epoch
             (epoch_id, hypertable_id, partitioning_func, partitioning_column,
              partitioning_mod, start_time, end_time)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
        params![
            epoch_id,
            hypertable_id,
            spec.partitioning_func.to_string(),
            spec.partitioning_column,
            spec.partitioning_mod,
            spec.start_time,
            spec.end_time
        ],
    )?;

    for &(keyspace_start, keyspace_end) in ranges {
        let partition_id: i64 =
            conn.query_row("SELECT nextval('tc_partition_seq')", [], |r| r.get(0))?;
        conn.execute(
            "INSERT INTO \"partition\" (partition_id, epoch_id, keyspace_start, keyspace_end)
             VALUES (?, ?, ?, ?)",
            params![partition_id, epoch_id, keyspace_start, keyspace_end],
        )?;
        for &(replica_id, schema_name) in replicas {
            let partition_replica_id: i64 =
                conn.query_row("SELECT nextval('tc_partition_replica_seq')", [], |r| r.get(0))?;
            conn.execute(
                "INSERT INTO partition_replica
                     (partition_replica_id, partition_id, replica_id, schema_name)
                 VALUES (?, ?, ?, ?)",
                params![partition_replica_id, partition_id, replica_id, schema_name],
            )?;
        }
    }

    info!(
        epoch_id,
        hypertable_id,
        partitions = ranges.len(),
        "partition epoch installed"
    );
    Ok(epoch_id)
}
