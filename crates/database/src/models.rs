//! Catalog entities. Field names mirror the catalog columns one to one so
//! reads stay mechanical.

use serde::{Deserialize, Serialize};
use tc_types::schema::ColumnType;

use crate::partition::PartitionFunction;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hypertable {
    pub hypertable_id: i64,
    pub name: String,
    pub time_column: String,
    pub time_type: ColumnType,
    /// Chunk length threshold in nanoseconds.
    pub chunk_time_interval: i64,
}

/// A time-bounded partitioning scheme for one hypertable. At most one epoch
/// per hypertable is open (NULL `end_time`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionEpoch {
    pub epoch_id: i64,
    pub hypertable_id: i64,
    pub partitioning_func: PartitionFunction,
    pub partitioning_column: String,
    pub partitioning_mod: i64,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl PartitionEpoch {
    /// Whether `time_ns` falls inside this epoch's [start, end) window;
    /// a missing bound is unbounded.
    pub fn covers(&self, time_ns: i64) -> bool {
        self.start_time.map_or(true, |s| s <= time_ns)
            && self.end_time.map_or(true, |e| time_ns < e)
    }
}

/// A keyspace-range shard of one epoch; the ranges of an epoch tile
/// [0, partitioning_mod) exactly.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub partition_id: i64,
    pub epoch_id: i64,
    pub keyspace_start: i64,
    pub keyspace_end: i64,
}

impl Partition {
    pub fn contains(&self, keyspace_value: i64) -> bool {
        self.keyspace_start <= keyspace_value && keyspace_value <= self.keyspace_end
    }
}

/// One physical copy set of a partition, pinned to a replica endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PartitionReplica {
    pub partition_replica_id: i64,
    pub partition_id: i64,
    pub replica_id: i16,
    pub schema_name: String,
}

/// A time-bounded storage segment within one partition. `end_time` NULL =
/// open; `closed` is terminal and never reverts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: i64,
    pub partition_id: i64,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub closed: bool,
}

impl Chunk {
    /// Plain range containment, open end = unbounded.
    pub fn covers(&self, time_ns: i64) -> bool {
        time_ns >= self.start_time && self.end_time.map_or(true, |end| time_ns < end)
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Routing window end: an open chunk accepts rows only up to one
    /// configured interval past its start; the first row beyond that is the
    /// one that closes it.
    pub fn routing_window_end(&self, interval_ns: i64) -> i64 {
        self.end_time.unwrap_or(self.start_time + interval_ns)
    }
}

/// Physical target of one chunk on one partition replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChunkReplicaNode {
    pub chunk_id: i64,
    pub partition_replica_id: i64,
    pub schema_name: String,
    pub table_name: String,
}
