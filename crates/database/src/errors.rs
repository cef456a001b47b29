use thiserror::Error;

/// Failure taxonomy of the write path.
///
/// `EpochNotFound` and `PartitionNotFound` signal catalog inconsistency:
/// under a consistent catalog every timed row resolves to exactly one
/// (epoch, partition, chunk) triple, so hitting either aborts the whole unit
/// of work. `ReentrantInsert` is a guard violation visible to the user.
/// Nothing here is retried; propagation rolls back the caller's transaction
/// in full.
#[derive(Debug, Error)]
pub enum InsertError {
    #[error("insert already in progress in this transaction")]
    ReentrantInsert,

    #[error("no epoch covers time {time_ns} for hypertable {hypertable_id}")]
    EpochNotFound { hypertable_id: i64, time_ns: i64 },

    #[error("no partition covers keyspace value {keyspace_value} in epoch {epoch_id}")]
    PartitionNotFound { epoch_id: i64, keyspace_value: i64 },

    #[error("chunk {chunk_id} has no replica target accepting rows")]
    NoReplicaTargets { chunk_id: i64 },

    #[error("unknown hypertable '{0}'")]
    UnknownHypertable(String),

    #[error("unknown partitioning function '{0}'")]
    UnknownPartitionFunction(String),

    #[error("catalog: {0}")]
    Catalog(#[from] duckdb::Error),
}

impl InsertError {
    /// Stable machine-readable code. Part of the public contract: callers
    /// separate "should never happen" catalog corruption from ordinary user
    /// error by code, never by message text.
    pub fn code(&self) -> &'static str {
        match self {
            InsertError::ReentrantInsert => "TC_REENTRANT_INSERT",
            InsertError::EpochNotFound { .. } => "TC_EPOCH_NOT_FOUND",
            InsertError::PartitionNotFound { .. } => "TC_PARTITION_NOT_FOUND",
            InsertError::NoReplicaTargets { .. } => "TC_NO_REPLICA_TARGETS",
            InsertError::UnknownHypertable(_) => "TC_UNKNOWN_HYPERTABLE",
            InsertError::UnknownPartitionFunction(_) => "TC_UNKNOWN_PARTITION_FUNC",
            InsertError::Catalog(_) => "TC_CATALOG",
        }
    }
}
